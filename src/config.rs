//! Configuration and command-line argument parsing

use std::env;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("purge age must be positive, got {0}")]
    PurgeAge(f64),
    #[error("purge interval must not be negative, got {0}")]
    PurgeInterval(f64),
    #[error("minimum altitude {min} is above maximum altitude {max}")]
    AltitudeRange { min: i32, max: i32 },
    #[error("observer position {lat},{lon} is not a valid coordinate")]
    Observer { lat: f64, lon: f64 },
    #[error("maximum distance must be positive, got {0}")]
    MaxDistance(f64),
    #[error("time factor must not be negative, got {0}")]
    TimeFactor(f64),
    #[error("missing value for {0}")]
    MissingValue(String),
    #[error("invalid value '{value}' for {option}")]
    InvalidValue { option: String, value: String },
    #[error("unknown option: {0}")]
    UnknownOption(String),
    #[error("--lat and --lon are required")]
    MissingObserver,
}

/// Registry settings, fixed once the registry is built
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryConfig {
    /// Observer latitude in degrees
    pub observer_lat: f64,
    /// Observer longitude in degrees
    pub observer_lon: f64,
    /// Forget aircraft not heard from in this many seconds
    pub purge_age: f64,
    /// Minimum seconds between two purge scans
    pub purge_interval: f64,
    /// Decimal places kept for latitude/longitude
    pub position_precision: i32,
    /// Decimal places kept for altitude (-2 rounds to the nearest 100)
    pub altitude_precision: i32,
    /// Ignore reports below this altitude (feet)
    pub min_altitude: i32,
    /// Ignore reports above this altitude (feet)
    pub max_altitude: i32,
    /// Ignore reports farther than this many meters from the observer
    pub max_distance: Option<f64>,
    /// Drop a tracked aircraft when it reports an out-of-bounds position
    pub evict_out_of_bounds: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            observer_lat: 0.0,
            observer_lon: 0.0,
            purge_age: 120.0,
            purge_interval: 1.0,
            position_precision: 2,
            altitude_precision: -2,
            min_altitude: 0,
            max_altitude: 50_000,
            max_distance: None,
            evict_out_of_bounds: false,
        }
    }
}

impl RegistryConfig {
    pub fn at(observer_lat: f64, observer_lon: f64) -> Self {
        Self {
            observer_lat,
            observer_lon,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.purge_age > 0.0) || !self.purge_age.is_finite() {
            return Err(ConfigError::PurgeAge(self.purge_age));
        }
        if !(self.purge_interval >= 0.0) || !self.purge_interval.is_finite() {
            return Err(ConfigError::PurgeInterval(self.purge_interval));
        }
        if self.min_altitude > self.max_altitude {
            return Err(ConfigError::AltitudeRange {
                min: self.min_altitude,
                max: self.max_altitude,
            });
        }
        if !(-90.0..=90.0).contains(&self.observer_lat)
            || !(-180.0..=180.0).contains(&self.observer_lon)
        {
            return Err(ConfigError::Observer {
                lat: self.observer_lat,
                lon: self.observer_lon,
            });
        }
        if let Some(max) = self.max_distance {
            if !(max > 0.0) {
                return Err(ConfigError::MaxDistance(max));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    // Input
    pub host: String,
    pub port: u16,
    pub filename: Option<String>,
    /// Replay speed relative to the recorded timestamps (0 = unpaced)
    pub time_factor: f64,

    // Registry
    pub registry: RegistryConfig,

    // Output
    pub metric: bool,
    pub json: bool,
    pub interactive: bool,
    pub interactive_rows: usize,

    // Networking
    pub net: bool,
    pub net_http_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 30003,
            filename: None,
            time_factor: 1.0,
            registry: RegistryConfig::default(),
            metric: true,
            json: false,
            interactive: false,
            interactive_rows: 15,
            net: false,
            net_http_port: 8080,
        }
    }
}

impl Config {
    pub fn from_args() -> Self {
        match Self::parse(env::args().skip(1)) {
            Ok(Some(config)) => config,
            Ok(None) => {
                print_help();
                std::process::exit(0);
            }
            Err(e) => {
                eprintln!("{}", e);
                print_help();
                std::process::exit(1);
            }
        }
    }

    /// Parse arguments (without the program name). `Ok(None)` means help was requested.
    pub fn parse<I>(args: I) -> Result<Option<Self>, ConfigError>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        let mut config = Config::default();
        let mut lat = None;
        let mut lon = None;

        let mut i = 0;
        while i < args.len() {
            let option = args[i].as_str();
            match option {
                "--host" => config.host = value(&args, &mut i)?.to_string(),
                "--port" => config.port = parse_value(&args, &mut i)?,
                "--ifile" => config.filename = Some(value(&args, &mut i)?.to_string()),
                "--time-factor" => config.time_factor = parse_value(&args, &mut i)?,
                "--lat" => lat = Some(parse_value(&args, &mut i)?),
                "--lon" => lon = Some(parse_value(&args, &mut i)?),
                "--purge-age" => config.registry.purge_age = parse_value(&args, &mut i)?,
                "--purge-interval" => {
                    config.registry.purge_interval = parse_value(&args, &mut i)?
                }
                "--position-precision" => {
                    config.registry.position_precision = parse_value(&args, &mut i)?
                }
                "--altitude-precision" => {
                    config.registry.altitude_precision = parse_value(&args, &mut i)?
                }
                "--min-altitude" => config.registry.min_altitude = parse_value(&args, &mut i)?,
                "--max-altitude" => config.registry.max_altitude = parse_value(&args, &mut i)?,
                "--max-distance" => {
                    config.registry.max_distance = Some(parse_value(&args, &mut i)?)
                }
                "--evict-out-of-bounds" => config.registry.evict_out_of_bounds = true,
                "--interactive" => config.interactive = true,
                "--interactive-rows" => config.interactive_rows = parse_value(&args, &mut i)?,
                "--json" => config.json = true,
                "--net" => config.net = true,
                "--net-http-port" => config.net_http_port = parse_value(&args, &mut i)?,
                "--metric" => config.metric = true,
                "--imperial" => config.metric = false,
                "--help" => return Ok(None),
                other => return Err(ConfigError::UnknownOption(other.to_string())),
            }
            i += 1;
        }

        match (lat, lon) {
            (Some(lat), Some(lon)) => {
                config.registry.observer_lat = lat;
                config.registry.observer_lon = lon;
            }
            _ => return Err(ConfigError::MissingObserver),
        }
        if !(config.time_factor >= 0.0) || !config.time_factor.is_finite() {
            return Err(ConfigError::TimeFactor(config.time_factor));
        }
        config.registry.validate()?;

        Ok(Some(config))
    }
}

/// Advance past an option and return its value
fn value<'a>(args: &'a [String], i: &mut usize) -> Result<&'a str, ConfigError> {
    let option = &args[*i];
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| ConfigError::MissingValue(option.clone()))
}

fn parse_value<T: std::str::FromStr>(args: &[String], i: &mut usize) -> Result<T, ConfigError> {
    let option = args[*i].clone();
    let raw = value(args, i)?;
    raw.parse().map_err(|_| ConfigError::InvalidValue {
        option,
        value: raw.to_string(),
    })
}

fn print_help() {
    println!(
        r#"adsb-theremin - track the aircraft nearest to you from a dump1090 SBS feed

Usage: adsb-theremin --lat <degrees> --lon <degrees> [OPTIONS]

Options:
  --host <host>              dump1090 host (default: 127.0.0.1)
  --port <port>              dump1090 SBS port (default: 30003)
  --ifile <filename>         Replay SBS lines from a file instead of the network
  --time-factor <f>          Replay speed, 2 is twice real time, 0 unpaced (default: 1)
  --lat <degrees>            Observer latitude (required)
  --lon <degrees>            Observer longitude (required)
  --purge-age <s>            Forget aircraft idle for <s> seconds (default: 120)
  --purge-interval <s>       Seconds between purge scans (default: 1)
  --position-precision <n>   Decimal places kept for lat/lon (default: 2)
  --altitude-precision <n>   Decimal places kept for altitude (default: -2)
  --min-altitude <ft>        Ignore aircraft below this altitude (default: 0)
  --max-altitude <ft>        Ignore aircraft above this altitude (default: 50000)
  --max-distance <m>         Ignore aircraft farther than this (default: none)
  --evict-out-of-bounds      Drop tracked aircraft that leave the bounds
  --interactive              Interactive mode refreshing data on screen
  --interactive-rows <N>     Max rows in interactive mode (default: 15)
  --json                     Print aircraft events as JSON lines
  --net                      Enable the HTTP JSON endpoint
  --net-http-port <port>     HTTP server port (default: 8080)
  --metric                   Use metric units
  --imperial                 Use imperial units
  --help                     Show this help
"#
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_config_is_valid() {
        assert_eq!(RegistryConfig::default().validate(), Ok(()));
        assert_eq!(RegistryConfig::at(37.6, -122.4).validate(), Ok(()));
    }

    #[test]
    fn test_registry_config_rejects_bad_values() {
        let mut cfg = RegistryConfig::default();
        cfg.purge_age = 0.0;
        assert_eq!(cfg.validate(), Err(ConfigError::PurgeAge(0.0)));

        let mut cfg = RegistryConfig::default();
        cfg.purge_interval = -1.0;
        assert_eq!(cfg.validate(), Err(ConfigError::PurgeInterval(-1.0)));

        let mut cfg = RegistryConfig::default();
        cfg.min_altitude = 10_000;
        cfg.max_altitude = 5_000;
        assert!(matches!(cfg.validate(), Err(ConfigError::AltitudeRange { .. })));

        let cfg = RegistryConfig::at(91.0, 0.0);
        assert!(matches!(cfg.validate(), Err(ConfigError::Observer { .. })));

        let mut cfg = RegistryConfig::default();
        cfg.max_distance = Some(0.0);
        assert_eq!(cfg.validate(), Err(ConfigError::MaxDistance(0.0)));
    }

    #[test]
    fn test_parse_args() {
        let config = Config::parse([
            "--lat",
            "37.6",
            "--lon",
            "-122.4",
            "--port",
            "30005",
            "--max-altitude",
            "40000",
            "--max-distance",
            "70000",
            "--evict-out-of-bounds",
            "--interactive",
            "--imperial",
            "--time-factor",
            "4",
        ])
        .unwrap()
        .unwrap();

        assert_eq!(config.port, 30005);
        assert_eq!(config.registry.observer_lat, 37.6);
        assert_eq!(config.registry.observer_lon, -122.4);
        assert_eq!(config.registry.max_altitude, 40_000);
        assert_eq!(config.registry.max_distance, Some(70_000.0));
        assert!(config.registry.evict_out_of_bounds);
        assert!(config.interactive);
        assert!(!config.metric);
        assert_eq!(config.time_factor, 4.0);
    }

    #[test]
    fn test_parse_args_errors() {
        assert_eq!(
            Config::parse(["--lat", "1.0"]).unwrap_err(),
            ConfigError::MissingObserver
        );
        assert_eq!(
            Config::parse(["--lat"]).unwrap_err(),
            ConfigError::MissingValue("--lat".to_string())
        );
        assert!(matches!(
            Config::parse(["--lat", "north", "--lon", "0"]),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert_eq!(
            Config::parse(["--bogus"]).unwrap_err(),
            ConfigError::UnknownOption("--bogus".to_string())
        );
        assert!(matches!(
            Config::parse(["--lat", "0", "--lon", "0", "--purge-age", "0"]),
            Err(ConfigError::PurgeAge(_))
        ));
        assert_eq!(
            Config::parse(["--lat", "0", "--lon", "0", "--time-factor", "-1"]).unwrap_err(),
            ConfigError::TimeFactor(-1.0)
        );
    }

    #[test]
    fn test_parse_help() {
        assert!(Config::parse(["--help"]).unwrap().is_none());
    }
}
