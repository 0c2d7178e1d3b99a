//! Registry of aircraft currently visible from a fixed observer
//!
//!  Accepts normalized position reports, drops reports outside the configured
//!  altitude/distance bounds, forgets aircraft that go quiet, and answers
//!  nearest/farthest queries relative to the observer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use crate::aircraft::{Aircraft, AircraftId, InvalidId};
use crate::config::{ConfigError, RegistryConfig};
use crate::geo;
use crate::notify::{AircraftObserver, Subscribers};

/// Registry shared between the feed processor and the renderers
pub type SharedRegistry = Arc<Mutex<AircraftRegistry>>;

/// Wall clock in seconds since the Unix epoch
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Report could not be applied because it is not a well-formed position
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IngestError {
    #[error(transparent)]
    InvalidId(#[from] InvalidId),
    #[error("latitude {0} is not a valid coordinate")]
    Latitude(f64),
    #[error("longitude {0} is not a valid coordinate")]
    Longitude(f64),
    #[error("timestamp {0} is not finite")]
    Timestamp(f64),
}

/// Result of feeding one report to the registry
#[derive(Debug)]
pub enum IngestOutcome<'a> {
    /// Report fell outside the altitude/distance bounds
    Ignored,
    /// Report was applied to a tracked aircraft
    Tracked {
        aircraft: &'a Aircraft,
        /// Altitude or position actually changed
        changed: bool,
        /// This report created the aircraft
        is_new: bool,
    },
}

impl<'a> IngestOutcome<'a> {
    pub fn changed(&self) -> bool {
        matches!(self, IngestOutcome::Tracked { changed: true, .. })
    }

    pub fn is_new(&self) -> bool {
        matches!(self, IngestOutcome::Tracked { is_new: true, .. })
    }

    pub fn aircraft(&self) -> Option<&'a Aircraft> {
        match self {
            IngestOutcome::Tracked { aircraft, .. } => Some(*aircraft),
            IngestOutcome::Ignored => None,
        }
    }
}

/// Store for tracking aircraft around the observer
pub struct AircraftRegistry {
    aircraft: HashMap<AircraftId, Aircraft>,
    config: RegistryConfig,
    last_purge: Option<f64>,
    subscribers: Subscribers,
}

impl AircraftRegistry {
    pub fn new(config: RegistryConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            aircraft: HashMap::new(),
            config,
            last_purge: None,
            subscribers: Subscribers::new(),
        })
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Observer latitude and longitude
    pub fn observer(&self) -> (f64, f64) {
        (self.config.observer_lat, self.config.observer_lon)
    }

    /// Register an observer. Re-using a subscriber id replaces the old handle.
    pub fn subscribe(
        &mut self,
        subscriber_id: impl Into<String>,
        observer: Box<dyn AircraftObserver>,
    ) {
        self.subscribers.insert(subscriber_id, observer);
        debug!("{} subscribers", self.subscribers.len());
    }

    pub fn unsubscribe(&mut self, subscriber_id: &str) -> bool {
        self.subscribers.remove(subscriber_id)
    }

    /// Apply one position report.
    ///
    /// Purges stale aircraft first, then rounds the report and runs it through
    /// the altitude/distance filter before touching any aircraft.
    pub fn ingest(
        &mut self,
        id: &str,
        altitude: i32,
        latitude: f64,
        longitude: f64,
        now: f64,
    ) -> Result<IngestOutcome<'_>, IngestError> {
        if !now.is_finite() {
            return Err(IngestError::Timestamp(now));
        }
        // Runs for rejected reports too
        self.purge(now);

        let id = AircraftId::new(id)?;
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(IngestError::Latitude(latitude));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(IngestError::Longitude(longitude));
        }

        let altitude = geo::round_altitude(altitude, self.config.altitude_precision);
        let latitude = geo::round_to(latitude, self.config.position_precision);
        let longitude = geo::round_to(longitude, self.config.position_precision);

        if !self.in_bounds(altitude, latitude, longitude) {
            if self.config.evict_out_of_bounds {
                if let Some(aircraft) = self.aircraft.remove(&id) {
                    debug!("Evicting {} after out-of-bounds report", id);
                    self.subscribers.aircraft_removed(&aircraft);
                }
            }
            return Ok(IngestOutcome::Ignored);
        }

        let is_new = !self.aircraft.contains_key(&id);
        let aircraft = self
            .aircraft
            .entry(id)
            .or_insert_with_key(|id| Aircraft::new(id.clone(), now));
        if is_new {
            debug!("New aircraft {}", aircraft.id());
        }

        let changed = aircraft.update(altitude, latitude, longitude, now);
        if changed {
            if is_new {
                self.subscribers.new_aircraft(aircraft);
            } else {
                self.subscribers.aircraft_updated(aircraft);
            }
        }

        Ok(IngestOutcome::Tracked {
            aircraft,
            changed,
            is_new,
        })
    }

    fn in_bounds(&self, altitude: i32, latitude: f64, longitude: f64) -> bool {
        if altitude < self.config.min_altitude || altitude > self.config.max_altitude {
            return false;
        }
        match self.config.max_distance {
            Some(max) => {
                let (lat, lon) = self.observer();
                geo::distance(lat, lon, latitude, longitude) <= max
            }
            None => true,
        }
    }

    /// Remove aircraft not heard from within the purge age.
    ///
    /// Runs at most once per purge interval; returns how many were removed.
    pub fn purge(&mut self, now: f64) -> usize {
        if let Some(last) = self.last_purge {
            if now - last < self.config.purge_interval {
                return 0;
            }
        }
        self.last_purge = Some(now);

        let cutoff = now - self.config.purge_age;
        let mut stale: Vec<AircraftId> = self
            .aircraft
            .values()
            .filter(|a| a.last_update() < cutoff)
            .map(|a| a.id().clone())
            .collect();
        stale.sort();

        for id in &stale {
            if let Some(aircraft) = self.aircraft.remove(id) {
                debug!(
                    "Purged aircraft {} after {:.0}s in view",
                    id,
                    aircraft.last_update() - aircraft.created_at()
                );
                self.subscribers.aircraft_removed(&aircraft);
            }
        }

        stale.len()
    }

    /// Up to `count` aircraft within the altitude band, closest first.
    ///
    /// Equal distances are ordered by id.
    pub fn nearest(&self, count: usize, min_altitude: i32, max_altitude: i32) -> Vec<&Aircraft> {
        let mut by_distance = self.by_distance();
        by_distance.retain(|(_, a)| (min_altitude..=max_altitude).contains(&a.altitude()));
        by_distance.truncate(count);
        by_distance.into_iter().map(|(_, a)| a).collect()
    }

    /// The aircraft farthest from the observer
    pub fn farthest(&self) -> Option<&Aircraft> {
        self.by_distance().pop().map(|(_, a)| a)
    }

    fn by_distance(&self) -> Vec<(f64, &Aircraft)> {
        let (lat, lon) = self.observer();
        let mut by_distance: Vec<(f64, &Aircraft)> = self
            .aircraft
            .values()
            .map(|a| (a.distance_to(lat, lon), a))
            .collect();
        by_distance.sort_by(|(da, a), (db, b)| {
            da.total_cmp(db).then_with(|| a.id().cmp(b.id()))
        });
        by_distance
    }

    pub fn get(&self, id: &str) -> Option<&Aircraft> {
        let id = AircraftId::new(id).ok()?;
        self.aircraft.get(&id)
    }

    /// Number of tracked aircraft
    pub fn count(&self) -> usize {
        self.aircraft.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Aircraft> {
        self.aircraft.values()
    }
}
