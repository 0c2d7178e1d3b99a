//! Console renderers
//!
//!  `interactive_display` polls the registry and redraws a table of the
//!  nearest aircraft. `print_events` drains the notification queue and prints
//!  one line per change.

use std::io::{self, Write};
use std::time::Duration;

use crossbeam_channel::Receiver;
use tracing::error;

use crate::notify::{AircraftEvent, EventKind};
use crate::registry::{SharedRegistry, unix_now};

const FEET_PER_METER: f64 = 3.2808;
const NM_PER_KM: f64 = 0.539957;

// ANSI color codes
const GREEN: &str = "\x1B[92m";
const YELLOW: &str = "\x1B[93m";
const BOLD: &str = "\x1B[1m";
const RESET: &str = "\x1B[0m";

fn format_altitude(feet: i32, metric: bool) -> String {
    if metric {
        format!("{}m", (feet as f64 / FEET_PER_METER).round() as i32)
    } else {
        format!("{}ft", feet)
    }
}

fn format_distance(meters: f64, metric: bool) -> String {
    let km = meters / 1000.0;
    if metric {
        format!("{:.1}km", km)
    } else {
        format!("{:.1}nm", km * NM_PER_KM)
    }
}

/// Redraw the nearest aircraft table until the task is aborted.
///
/// With `live` unset (file replay) ages are measured against the newest report
/// instead of the wall clock.
pub async fn interactive_display(registry: SharedRegistry, max_rows: usize, metric: bool, live: bool) {
    let refresh_interval = Duration::from_millis(250);

    loop {
        tokio::time::sleep(refresh_interval).await;

        let mut out = String::new();
        // Clear screen and move cursor to top
        out.push_str("\x1B[2J\x1B[H");
        out.push_str(&format!(
            "{BOLD}{:<8} {:>8} {:>9} {:>5} {:>9} {:>10} {:>4}{RESET}\n",
            "Hex", "Alt", "Dist", "Brg", "Lat", "Lon", "Age"
        ));
        out.push_str(&"-".repeat(60));
        out.push('\n');

        {
            let registry = registry.lock();
            let config = registry.config();
            let (lat, lon) = registry.observer();
            let now = if live {
                unix_now()
            } else {
                registry
                    .iter()
                    .map(|a| a.last_update())
                    .fold(f64::NEG_INFINITY, f64::max)
            };

            for ac in registry.nearest(max_rows, config.min_altitude, config.max_altitude) {
                let age = ac.age(now);
                // Fresh reports in green, aircraft about to be purged in yellow
                let color = if age < 5.0 {
                    GREEN
                } else if age > config.purge_age * 0.75 {
                    YELLOW
                } else {
                    ""
                };
                out.push_str(&format!(
                    "{color}{:<8}{RESET} {:>8} {:>9} {:>4.0}° {:>9.4} {:>10.4} {:>3.0}s\n",
                    ac.id(),
                    format_altitude(ac.altitude(), metric),
                    format_distance(ac.distance_to(lat, lon), metric),
                    ac.bearing_from(lat, lon),
                    ac.latitude(),
                    ac.longitude(),
                    age
                ));
            }

            out.push_str(&"-".repeat(60));
            out.push('\n');
            let farthest = registry
                .farthest()
                .map(|ac| {
                    format!(
                        " | Farthest: {} {}",
                        ac.id(),
                        format_distance(ac.distance_to(lat, lon), metric)
                    )
                })
                .unwrap_or_default();
            out.push_str(&format!(
                "Aircraft: {}{} | Pos: {:.4},{:.4} | {} mode | Ctrl+C to exit\n",
                registry.count(),
                farthest,
                lat,
                lon,
                if metric { "Metric" } else { "Imperial" },
            ));
        }

        let mut stdout = io::stdout().lock();
        if stdout.write_all(out.as_bytes()).and_then(|_| stdout.flush()).is_err() {
            return;
        }
    }
}

/// One human readable line for an event
pub fn format_event(event: &AircraftEvent, metric: bool) -> String {
    let verb = match event.kind {
        EventKind::New => "New",
        EventKind::Updated => "Update",
        EventKind::Removed => "Removed",
    };
    format!(
        "{:<7} {:<8} alt {:>7} dist {:>8} brg {:>3.0}°",
        verb,
        event.aircraft.id(),
        format_altitude(event.aircraft.altitude(), metric),
        format_distance(event.distance, metric),
        event.bearing
    )
}

/// Print events until every sender is gone. Blocks the calling thread.
pub fn print_events(rx: Receiver<AircraftEvent>, json: bool, metric: bool) {
    let stdout = io::stdout();
    while let Ok(event) = rx.recv() {
        let line = if json {
            match serde_json::to_string(&event) {
                Ok(line) => line,
                Err(e) => {
                    error!("Failed to encode event: {}", e);
                    continue;
                }
            }
        } else {
            format_event(&event, metric)
        };

        if writeln!(stdout.lock(), "{}", line).is_err() {
            return;
        }
    }
}
