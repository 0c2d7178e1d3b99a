//! Aircraft change notifications
//!
//!  Observers register with the registry and are called synchronously, in
//!  registration order, whenever an aircraft appears, moves, or is purged.
//!  `ChannelObserver` hands events to a bounded queue so slow consumers never
//!  stall ingestion.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Sender, TrySendError};
use serde::Serialize;
use tracing::warn;

use crate::aircraft::Aircraft;

/// Receives registry change notifications.
///
/// Callbacks run inline with ingestion and must not block.
pub trait AircraftObserver: Send {
    /// A previously unknown aircraft reported a position
    fn on_new_aircraft(&mut self, aircraft: &Aircraft);

    /// A tracked aircraft changed altitude or position
    fn on_aircraft_updated(&mut self, aircraft: &Aircraft);

    /// A tracked aircraft is about to be dropped
    fn on_aircraft_removed(&mut self, aircraft: &Aircraft);
}

/// Observers keyed by subscriber id, kept in registration order
#[derive(Default)]
pub struct Subscribers {
    entries: Vec<(String, Box<dyn AircraftObserver>)>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an observer. An existing subscriber with the same id is replaced in place.
    pub fn insert(&mut self, id: impl Into<String>, observer: Box<dyn AircraftObserver>) {
        let id = id.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == id) {
            Some(entry) => entry.1 = observer,
            None => self.entries.push((id, observer)),
        }
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(existing, _)| existing != id);
        self.entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn new_aircraft(&mut self, aircraft: &Aircraft) {
        for (_, observer) in &mut self.entries {
            observer.on_new_aircraft(aircraft);
        }
    }

    pub fn aircraft_updated(&mut self, aircraft: &Aircraft) {
        for (_, observer) in &mut self.entries {
            observer.on_aircraft_updated(aircraft);
        }
    }

    pub fn aircraft_removed(&mut self, aircraft: &Aircraft) {
        for (_, observer) in &mut self.entries {
            observer.on_aircraft_removed(aircraft);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    New,
    Updated,
    Removed,
}

/// Snapshot of an aircraft at the moment it changed
#[derive(Debug, Clone, Serialize)]
pub struct AircraftEvent {
    pub kind: EventKind,
    pub aircraft: Aircraft,
    /// Distance from the observer in meters
    pub distance: f64,
    /// Bearing from the observer in degrees
    pub bearing: f64,
}

/// Forwards every notification to a bounded channel without blocking
pub struct ChannelObserver {
    tx: Sender<AircraftEvent>,
    observer_lat: f64,
    observer_lon: f64,
    dropped: Arc<AtomicU64>,
}

impl ChannelObserver {
    pub fn new(tx: Sender<AircraftEvent>, observer_lat: f64, observer_lon: f64) -> Self {
        Self {
            tx,
            observer_lat,
            observer_lon,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Shared counter of events dropped because the queue was full
    pub fn dropped(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.dropped)
    }

    fn send(&self, kind: EventKind, aircraft: &Aircraft) {
        let event = AircraftEvent {
            kind,
            aircraft: aircraft.clone(),
            distance: aircraft.distance_to(self.observer_lat, self.observer_lon),
            bearing: aircraft.bearing_from(self.observer_lat, self.observer_lon),
        };

        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    "Event queue full, dropped {:?} event for {} ({} dropped so far)",
                    event.kind,
                    event.aircraft.id(),
                    total
                );
            }
            // Nobody is listening anymore
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

impl AircraftObserver for ChannelObserver {
    fn on_new_aircraft(&mut self, aircraft: &Aircraft) {
        self.send(EventKind::New, aircraft);
    }

    fn on_aircraft_updated(&mut self, aircraft: &Aircraft) {
        self.send(EventKind::Updated, aircraft);
    }

    fn on_aircraft_removed(&mut self, aircraft: &Aircraft) {
        self.send(EventKind::Removed, aircraft);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aircraft::AircraftId;
    use crossbeam_channel::bounded;
    use std::sync::Mutex;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl AircraftObserver for Recorder {
        fn on_new_aircraft(&mut self, aircraft: &Aircraft) {
            self.log.lock().unwrap().push(format!("{} new {}", self.name, aircraft.id()));
        }

        fn on_aircraft_updated(&mut self, aircraft: &Aircraft) {
            self.log.lock().unwrap().push(format!("{} update {}", self.name, aircraft.id()));
        }

        fn on_aircraft_removed(&mut self, aircraft: &Aircraft) {
            self.log.lock().unwrap().push(format!("{} remove {}", self.name, aircraft.id()));
        }
    }

    fn aircraft(id: &str) -> Aircraft {
        let mut ac = Aircraft::new(AircraftId::new(id).unwrap(), 0.0);
        ac.update(10_000, 0.0, 1.0, 0.0);
        ac
    }

    #[test]
    fn test_subscribers_called_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut subs = Subscribers::new();
        subs.insert("b", Box::new(Recorder { name: "b", log: Arc::clone(&log) }));
        subs.insert("a", Box::new(Recorder { name: "a", log: Arc::clone(&log) }));

        subs.new_aircraft(&aircraft("X"));
        subs.aircraft_removed(&aircraft("X"));

        assert_eq!(
            *log.lock().unwrap(),
            vec!["b new X", "a new X", "b remove X", "a remove X"]
        );
    }

    #[test]
    fn test_subscriber_replaced_in_place() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut subs = Subscribers::new();
        subs.insert("first", Box::new(Recorder { name: "one", log: Arc::clone(&log) }));
        subs.insert("second", Box::new(Recorder { name: "two", log: Arc::clone(&log) }));
        subs.insert("first", Box::new(Recorder { name: "three", log: Arc::clone(&log) }));
        assert_eq!(subs.len(), 2);

        subs.aircraft_updated(&aircraft("X"));
        assert_eq!(*log.lock().unwrap(), vec!["three update X", "two update X"]);

        assert!(subs.remove("first"));
        assert!(!subs.remove("first"));
        assert_eq!(subs.len(), 1);
    }

    #[test]
    fn test_channel_observer_forwards_events() {
        let (tx, rx) = bounded(4);
        let mut observer = ChannelObserver::new(tx, 0.0, 0.0);

        observer.on_new_aircraft(&aircraft("A1"));
        observer.on_aircraft_removed(&aircraft("A1"));

        let event = rx.try_recv().unwrap();
        assert_eq!(event.kind, EventKind::New);
        assert_eq!(event.aircraft.id().as_str(), "A1");
        assert!((event.distance - 111_195.0).abs() < 1.0);
        assert!((event.bearing - 90.0).abs() < 1e-9);
        assert_eq!(rx.try_recv().unwrap().kind, EventKind::Removed);
    }

    #[test]
    fn test_channel_observer_drops_when_full() {
        let (tx, rx) = bounded(1);
        let mut observer = ChannelObserver::new(tx, 0.0, 0.0);
        let dropped = observer.dropped();

        observer.on_new_aircraft(&aircraft("A1"));
        observer.on_aircraft_updated(&aircraft("A1"));
        observer.on_aircraft_updated(&aircraft("A1"));

        assert_eq!(dropped.load(Ordering::Relaxed), 2);
        assert_eq!(rx.len(), 1);
    }

    #[test]
    fn test_event_serializes_to_json() {
        let event = AircraftEvent {
            kind: EventKind::Updated,
            aircraft: aircraft("4840D6"),
            distance: 1.0,
            bearing: 2.0,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "updated");
        assert_eq!(json["aircraft"]["hex"], "4840D6");
        assert_eq!(json["aircraft"]["altitude"], 10_000);
    }
}
