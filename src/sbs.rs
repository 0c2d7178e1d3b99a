//! SBS-1 (BaseStation) line parsing
//!
//!  dump1090 serves comma separated BaseStation messages on port 30003. Only
//!  airborne position messages (`MSG,3`) carry everything the registry needs.
//!
//!  Replayed captures prefix each line with the capture time in seconds:
//!  `1700000000.25 MSG,3,...`. The prefix becomes the report timestamp.

use thiserror::Error;

/// Transmission type of an airborne position message
const MSG_AIRBORNE_POSITION: &str = "3";

const FIELD_HEX_IDENT: usize = 4;
const FIELD_ALTITUDE: usize = 11;
const FIELD_LATITUDE: usize = 14;
const FIELD_LONGITUDE: usize = 15;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SbsError {
    #[error("missing {0} field")]
    MissingField(&'static str),
    #[error("invalid {field} '{value}'")]
    InvalidNumber { field: &'static str, value: String },
    #[error("invalid replay timestamp '{0}'")]
    InvalidTimestamp(String),
}

/// One normalized position report
#[derive(Debug, Clone, PartialEq)]
pub struct PositionReport {
    pub id: String,
    /// Altitude in feet
    pub altitude: i32,
    pub latitude: f64,
    pub longitude: f64,
    /// Capture time for replayed lines; `None` means "now"
    pub timestamp: Option<f64>,
}

/// Parse one line from the feed.
///
/// Returns `Ok(None)` for blank lines and messages that are not airborne
/// positions.
pub fn parse_line(line: &str) -> Result<Option<PositionReport>, SbsError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (timestamp, message) = split_replay_prefix(line)?;

    let parts: Vec<&str> = message.split(',').map(str::trim).collect();
    if parts.first() != Some(&"MSG") || parts.get(1) != Some(&MSG_AIRBORNE_POSITION) {
        return Ok(None);
    }

    let id = field(&parts, FIELD_HEX_IDENT, "hex ident")?;
    let altitude = number(&parts, FIELD_ALTITUDE, "altitude")?;
    let latitude = number(&parts, FIELD_LATITUDE, "latitude")?;
    let longitude = number(&parts, FIELD_LONGITUDE, "longitude")?;

    Ok(Some(PositionReport {
        id: id.to_string(),
        altitude,
        latitude,
        longitude,
        timestamp,
    }))
}

/// Split `"<seconds> <message>"` into its parts. Lines without a prefix pass through.
fn split_replay_prefix(line: &str) -> Result<(Option<f64>, &str), SbsError> {
    match line.split_once(char::is_whitespace) {
        Some((prefix, rest)) if prefix.starts_with(|c: char| c.is_ascii_digit() || c == '.') => {
            let timestamp: f64 = prefix
                .parse()
                .map_err(|_| SbsError::InvalidTimestamp(prefix.to_string()))?;
            if !timestamp.is_finite() {
                return Err(SbsError::InvalidTimestamp(prefix.to_string()));
            }
            Ok((Some(timestamp), rest.trim_start()))
        }
        _ => Ok((None, line)),
    }
}

fn field<'a>(parts: &[&'a str], index: usize, name: &'static str) -> Result<&'a str, SbsError> {
    match parts.get(index).copied() {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(SbsError::MissingField(name)),
    }
}

fn number<T: std::str::FromStr>(
    parts: &[&str],
    index: usize,
    name: &'static str,
) -> Result<T, SbsError> {
    let value = field(parts, index, name)?;
    value.parse().map_err(|_| SbsError::InvalidNumber {
        field: name,
        value: value.to_string(),
    })
}
