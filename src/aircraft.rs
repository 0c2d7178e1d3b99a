//! Tracked aircraft state
//!
//!  One `Aircraft` per transponder id, holding the last accepted position
//!  report plus bookkeeping timestamps.

use std::fmt;

use serde::Serialize;

use crate::geo;

/// Transponder id was empty or blank
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("aircraft id must not be empty")]
pub struct InvalidId;

/// Opaque transponder identifier (usually the 24-bit ICAO address in hex)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct AircraftId(String);

impl AircraftId {
    pub fn new(id: impl Into<String>) -> Result<Self, InvalidId> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(InvalidId);
        }
        if trimmed.len() == id.len() {
            Ok(Self(id))
        } else {
            Ok(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AircraftId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

/// Tracked aircraft data
#[derive(Debug, Clone, Serialize)]
pub struct Aircraft {
    /// Transponder id
    #[serde(rename = "hex")]
    id: AircraftId,
    /// Altitude in feet
    altitude: i32,
    /// Latitude in degrees
    #[serde(rename = "lat")]
    latitude: f64,
    /// Longitude in degrees
    #[serde(rename = "lon")]
    longitude: f64,
    /// Time of the last accepted report (seconds)
    last_update: f64,
    /// Time of the first sighting (seconds)
    created_at: f64,
}

impl Aircraft {
    /// Fresh aircraft at the sentinel position, not yet updated.
    pub fn new(id: AircraftId, now: f64) -> Self {
        Self {
            id,
            altitude: 0,
            latitude: 0.0,
            longitude: 0.0,
            last_update: now,
            created_at: now,
        }
    }

    pub fn id(&self) -> &AircraftId {
        &self.id
    }

    pub fn altitude(&self) -> i32 {
        self.altitude
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn last_update(&self) -> f64 {
        self.last_update
    }

    pub fn created_at(&self) -> f64 {
        self.created_at
    }

    /// Seconds since the last accepted report
    pub fn age(&self, now: f64) -> f64 {
        (now - self.last_update).max(0.0)
    }

    /// Store a new report. Returns true if altitude or position changed.
    ///
    /// The update timestamp is refreshed either way.
    pub fn update(&mut self, altitude: i32, latitude: f64, longitude: f64, now: f64) -> bool {
        let changed = self.altitude != altitude
            || self.latitude != latitude
            || self.longitude != longitude;

        self.altitude = altitude;
        self.latitude = latitude;
        self.longitude = longitude;
        self.last_update = now;

        changed
    }

    /// Ground distance in meters from the given point to this aircraft
    pub fn distance_to(&self, lat: f64, lon: f64) -> f64 {
        geo::distance(lat, lon, self.latitude, self.longitude)
    }

    /// Bearing in degrees of this aircraft as seen from the given point
    pub fn bearing_from(&self, lat: f64, lon: f64) -> f64 {
        geo::bearing(lat, lon, self.latitude, self.longitude)
    }
}

impl fmt::Display for Aircraft {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: alt {} lat {:.4} lon {:.4}",
            self.id, self.altitude, self.latitude, self.longitude
        )
    }
}
