//!   adsb-theremin:   track the aircraft nearest to a fixed observer
//!
//!  Reads SBS position reports from dump1090 (or a replay file), keeps a
//!  registry of the aircraft in view, and renders them on the console.
//!

mod aircraft;
mod config;
mod display;
mod geo;
mod network;
mod notify;
mod registry;
mod sbs;

use std::io;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::Config;
use crate::notify::{AircraftEvent, ChannelObserver};
use crate::registry::{AircraftRegistry, SharedRegistry, unix_now};
use crate::sbs::PositionReport;

const REPORT_QUEUE_CAPACITY: usize = 1024;
const EVENT_QUEUE_CAPACITY: usize = 1024;
const CONSOLE_SUBSCRIBER: &str = "console";

type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn main() -> Result<(), BoxError> {
    let config = Config::from_args();

    // Initialize logging only if not in interactive mode
    if !config.interactive {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .finish();
        tracing::subscriber::set_global_default(subscriber).ok();
        info!("adsb-theremin starting...");
        info!("Configuration: {:?}", config);
    }

    let mut registry = AircraftRegistry::new(config.registry.clone())?;

    // The event printer only runs when the table is not on screen
    let mut dropped_events = None;
    let event_rx = if config.interactive {
        None
    } else {
        let (event_tx, event_rx) = bounded::<AircraftEvent>(EVENT_QUEUE_CAPACITY);
        let (lat, lon) = registry.observer();
        let observer = ChannelObserver::new(event_tx, lat, lon);
        dropped_events = Some(observer.dropped());
        registry.subscribe(CONSOLE_SUBSCRIBER, Box::new(observer));
        Some(event_rx)
    };

    let registry: SharedRegistry = Arc::new(Mutex::new(registry));

    // Channel for parsed position reports
    let (report_tx, report_rx): (Sender<PositionReport>, Receiver<PositionReport>) =
        bounded(REPORT_QUEUE_CAPACITY);

    // Replays carry their own clock, so only a live feed gets the purge ticker
    let live = config.filename.is_none();

    let rt = tokio::runtime::Runtime::new()?;

    let result = rt.block_on(async {
        let net_handle = if config.net {
            let registry = Arc::clone(&registry);
            let port = config.net_http_port;
            let rows = config.interactive_rows;
            Some(tokio::spawn(async move {
                if let Err(e) = network::run_http_server(port, registry, rows).await {
                    error!("HTTP server error: {}", e);
                }
            }))
        } else {
            None
        };

        let processor_handle = {
            let registry = Arc::clone(&registry);
            tokio::task::spawn_blocking(move || process_reports(report_rx, registry))
        };

        let printer_handle = event_rx.map(|rx| {
            let json = config.json;
            let metric = config.metric;
            tokio::task::spawn_blocking(move || display::print_events(rx, json, metric))
        });

        let interactive_handle = if config.interactive {
            let registry = Arc::clone(&registry);
            let rows = config.interactive_rows;
            let metric = config.metric;
            Some(tokio::spawn(async move {
                display::interactive_display(registry, rows, metric, live).await;
            }))
        } else {
            None
        };

        // Stale aircraft removal while the feed is quiet
        let cleanup_handle = if live {
            let registry = Arc::clone(&registry);
            Some(tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(1));
                loop {
                    interval.tick().await;
                    let removed = registry.lock().purge(unix_now());
                    if removed > 0 {
                        debug!("Purged {} stale aircraft", removed);
                    }
                }
            }))
        } else {
            None
        };

        let feed = match config.filename {
            Some(ref filename) => {
                network::replay_file(filename, config.time_factor, report_tx).await
            }
            None => network::run_sbs_client(&config.host, config.port, report_tx).await,
        };
        match &feed {
            Ok(stats) => info!(
                "Feed finished: {} lines, {} position reports, {} skipped",
                stats.lines, stats.reports, stats.skipped
            ),
            Err(e) => error!("Feed error: {}", e),
        }

        // The report sender is gone once the feed returns, so this drains and ends
        match processor_handle.await {
            Ok(applied) => info!(
                "Applied {} reports, {} aircraft tracked",
                applied,
                registry.lock().count()
            ),
            Err(e) => error!("Report processor failed: {}", e),
        }

        // After the feed ends, keep showing or serving the final state
        if config.interactive || config.net {
            if !config.interactive {
                info!("Feed ended, press Ctrl+C to exit");
            }
            tokio::signal::ctrl_c().await.ok();
        }

        // Cleanup
        if let Some(h) = cleanup_handle {
            h.abort();
        }
        if let Some(h) = net_handle {
            h.abort();
        }
        if let Some(h) = interactive_handle {
            h.abort();
        }

        // Dropping the console observer closes the event queue
        registry.lock().unsubscribe(CONSOLE_SUBSCRIBER);
        if let Some(h) = printer_handle {
            h.await.ok();
        }

        feed.map(|_| ())
    });

    if let Some(dropped) = dropped_events {
        let dropped = dropped.load(Ordering::Relaxed);
        if dropped > 0 {
            warn!("{} events were dropped because the console could not keep up", dropped);
        }
    }

    result
}

/// Apply reports to the registry until every sender is gone.
///
/// Returns the number of reports that changed an aircraft.
fn process_reports(rx: Receiver<PositionReport>, registry: SharedRegistry) -> u64 {
    let mut applied = 0;

    while let Ok(report) = rx.recv() {
        let now = report.timestamp.unwrap_or_else(unix_now);
        let mut registry = registry.lock();

        match registry.ingest(
            &report.id,
            report.altitude,
            report.latitude,
            report.longitude,
            now,
        ) {
            Ok(outcome) => {
                if let Some(aircraft) = outcome.aircraft().filter(|_| outcome.changed()) {
                    applied += 1;
                    let verb = if outcome.is_new() { "New" } else { "Changed" };
                    debug!("{}: {}", verb, aircraft);
                }
            }
            Err(e) => warn!("Rejected report for '{}': {}", report.id, e),
        }
    }

    applied
}
