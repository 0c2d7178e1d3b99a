//! Feed sources and the HTTP snapshot server
//!
//!  Reads SBS lines from a dump1090 TCP port or a replay file, forwards parsed
//!  reports to the processor, and serves the nearest aircraft as JSON.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::registry::{AircraftRegistry, SharedRegistry, unix_now};
use crate::sbs::{self, PositionReport};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Line counters for one feed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedStats {
    pub lines: u64,
    pub reports: u64,
    pub skipped: u64,
}

/// Connect to a dump1090 SBS port and forward reports until the feed ends.
pub async fn run_sbs_client(
    host: &str,
    port: u16,
    tx: Sender<PositionReport>,
) -> Result<FeedStats, BoxError> {
    info!("Connecting to {}:{}", host, port);
    let socket = TcpStream::connect((host, port)).await?;
    info!("Connected to {}:{}", host, port);

    let stats = forward_lines(BufReader::new(socket), &tx, ReplayClock::unpaced()).await?;
    info!("Feed from {}:{} closed", host, port);
    Ok(stats)
}

/// Forward every report in a capture file.
///
/// Timestamped lines are released at their recorded spacing divided by
/// `time_factor`; a factor of 0 replays as fast as the file can be read.
pub async fn replay_file(
    path: impl AsRef<Path>,
    time_factor: f64,
    tx: Sender<PositionReport>,
) -> Result<FeedStats, BoxError> {
    let path = path.as_ref();
    info!("Reading from file: {} (time factor {})", path.display(), time_factor);
    let file = tokio::fs::File::open(path).await?;
    Ok(forward_lines(BufReader::new(file), &tx, ReplayClock::new(time_factor)).await?)
}

/// Maps recorded timestamps onto the wall clock, anchored at the first one
struct ReplayClock {
    time_factor: f64,
    origin: Option<(f64, Instant)>,
}

impl ReplayClock {
    fn new(time_factor: f64) -> Self {
        Self {
            time_factor,
            origin: None,
        }
    }

    fn unpaced() -> Self {
        Self::new(0.0)
    }

    /// Sleep until the recorded `timestamp` is due.
    async fn wait_for(&mut self, timestamp: f64) {
        if !(self.time_factor > 0.0) {
            return;
        }
        let Some((first, start)) = self.origin else {
            self.origin = Some((timestamp, Instant::now()));
            return;
        };

        // Out of order or absurd gaps are sent right away
        let offset = (timestamp - first) / self.time_factor;
        let Ok(offset) = Duration::try_from_secs_f64(offset) else {
            return;
        };
        if let Some(deadline) = start.checked_add(offset) {
            tokio::time::sleep_until(deadline).await;
        }
    }
}

async fn forward_lines<R>(
    reader: R,
    tx: &Sender<PositionReport>,
    mut clock: ReplayClock,
) -> std::io::Result<FeedStats>
where
    R: AsyncBufRead + Unpin,
{
    let mut stats = FeedStats::default();
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        stats.lines += 1;
        match sbs::parse_line(&line) {
            Ok(Some(report)) => {
                stats.reports += 1;
                if let Some(timestamp) = report.timestamp {
                    clock.wait_for(timestamp).await;
                }
                if tx.send(report).is_err() {
                    debug!("Report channel closed, stopping feed");
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => {
                stats.skipped += 1;
                debug!("Skipping line ({}): {}", e, line.trim());
            }
        }
    }

    Ok(stats)
}

pub async fn run_http_server(port: u16, registry: SharedRegistry, rows: usize) -> Result<(), BoxError> {
    let listener = TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    info!("HTTP server listening on port {}", port);

    loop {
        let (socket, addr) = listener.accept().await?;
        debug!("HTTP client connected: {}", addr);

        let registry = Arc::clone(&registry);

        tokio::spawn(async move {
            if let Err(e) = handle_http_request(socket, registry, rows).await {
                debug!("HTTP error: {}", e);
            }
        });
    }
}

async fn handle_http_request(
    mut socket: TcpStream,
    registry: SharedRegistry,
    rows: usize,
) -> Result<(), BoxError> {
    let mut buffer = vec![0u8; 8192];
    let n = socket.read(&mut buffer).await?;

    if n == 0 {
        return Ok(());
    }

    let request = String::from_utf8_lossy(&buffer[..n]);
    let first_line = request.lines().next().unwrap_or("");
    let parts: Vec<&str> = first_line.split_whitespace().collect();

    if parts.len() < 2 {
        return Ok(());
    }

    let (status, content) = route(parts[1], &registry, rows)?;

    let header = format!(
        "HTTP/1.1 {}\r\n\
         Server: adsb-theremin\r\n\
         Content-Type: application/json;charset=utf-8\r\n\
         Connection: close\r\n\
         Content-Length: {}\r\n\
         Access-Control-Allow-Origin: *\r\n\
         \r\n",
        status,
        content.len()
    );

    socket.write_all(header.as_bytes()).await?;
    socket.write_all(content.as_bytes()).await?;

    Ok(())
}

const NOT_FOUND: &str = "{\"error\":\"not found\"}";

/// Status line and JSON body for a request path
fn route(path: &str, registry: &SharedRegistry, rows: usize) -> serde_json::Result<(&'static str, String)> {
    let registry = registry.lock();
    if path.starts_with("/data.json") {
        return Ok(("200 OK", snapshot_json(&registry, rows, unix_now())?));
    }
    if let Some(hex) = path.strip_prefix("/aircraft/") {
        if let Some(aircraft) = registry.get(hex) {
            return Ok(("200 OK", serde_json::to_string_pretty(aircraft)?));
        }
    }
    Ok(("404 Not Found", NOT_FOUND.to_string()))
}

/// One aircraft as seen from the observer
#[derive(Debug, Serialize)]
struct AircraftRow<'a> {
    hex: &'a str,
    altitude: i32,
    lat: f64,
    lon: f64,
    /// Meters from the observer
    distance: f64,
    /// Degrees from the observer
    bearing: f64,
    /// Seconds since the last report
    seen: f64,
}

/// Nearest aircraft in every altitude, closest first
fn snapshot_json(registry: &AircraftRegistry, rows: usize, now: f64) -> serde_json::Result<String> {
    let (lat, lon) = registry.observer();
    let rows: Vec<AircraftRow<'_>> = registry
        .nearest(rows, i32::MIN, i32::MAX)
        .into_iter()
        .map(|ac| AircraftRow {
            hex: ac.id().as_str(),
            altitude: ac.altitude(),
            lat: ac.latitude(),
            lon: ac.longitude(),
            distance: ac.distance_to(lat, lon),
            bearing: ac.bearing_from(lat, lon),
            seen: ac.age(now),
        })
        .collect();
    serde_json::to_string_pretty(&rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegistryConfig;
    use crossbeam_channel::unbounded;

    const A1: &str = "MSG,3,1,1,A1B2C3,1,2023/06/01,12:00:00.000,2023/06/01,12:00:00.000,,10000,,,0.00,1.00,,,0,0,0,0";
    const NO_POS: &str = "MSG,3,1,1,A1B2C3,1,2023/06/01,12:00:00.000,2023/06/01,12:00:00.000,,10000,,,,,,,0,0,0,0";
    const IDENT: &str = "MSG,1,1,1,A1B2C3,1,2023/06/01,12:00:00.000,2023/06/01,12:00:00.000,KLM1023,,,,,,,,0,0,0,0";

    #[tokio::test]
    async fn test_forward_lines_counts_and_sends() {
        let input = format!("{}\n{}\n{}\n\n", A1, NO_POS, IDENT);
        let (tx, rx) = unbounded();

        let stats = forward_lines(input.as_bytes(), &tx, ReplayClock::unpaced())
            .await
            .unwrap();

        assert_eq!(
            stats,
            FeedStats {
                lines: 4,
                reports: 1,
                skipped: 1
            }
        );
        let report = rx.try_recv().unwrap();
        assert_eq!(report.id, "A1B2C3");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_keeps_recorded_spacing() {
        let input = format!("1000.0 {A1}\n1005.0 {A1}\n{A1}\n1010.0 {A1}\n");
        let (tx, rx) = unbounded();
        let start = Instant::now();

        let stats = forward_lines(input.as_bytes(), &tx, ReplayClock::new(2.0))
            .await
            .unwrap();

        assert_eq!(stats.reports, 4);
        assert_eq!(rx.len(), 4);
        // 10 recorded seconds at twice real time
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(5), "{:?}", elapsed);
        assert!(elapsed < Duration::from_millis(5_100), "{:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_unpaced_with_zero_factor() {
        let input = format!("1000.0 {A1}\n1500.0 {A1}\n");
        let (tx, _rx) = unbounded();
        let start = Instant::now();

        let stats = forward_lines(input.as_bytes(), &tx, ReplayClock::new(0.0))
            .await
            .unwrap();

        assert_eq!(stats.reports, 2);
        assert!(start.elapsed() < Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_sends_out_of_order_lines_at_once() {
        let input = format!("1000.0 {A1}\n990.0 {A1}\n1001.0 {A1}\n");
        let (tx, rx) = unbounded();
        let start = Instant::now();

        forward_lines(input.as_bytes(), &tx, ReplayClock::new(1.0))
            .await
            .unwrap();

        assert_eq!(rx.len(), 3);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(1), "{:?}", elapsed);
        assert!(elapsed < Duration::from_millis(1_100), "{:?}", elapsed);
    }

    #[tokio::test]
    async fn test_sbs_client_reads_until_eof() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(format!("{}\r\n{}\r\n", A1, A1).as_bytes()).await.unwrap();
        });

        let (tx, rx) = unbounded();
        let stats = run_sbs_client("127.0.0.1", port, tx).await.unwrap();
        server.await.unwrap();

        assert_eq!(stats.reports, 2);
        assert_eq!(rx.len(), 2);
    }

    #[test]
    fn test_route() {
        let mut registry = AircraftRegistry::new(RegistryConfig::at(0.0, 0.0)).unwrap();
        registry.ingest("4840D6", 10_000, 0.0, 0.1, 10.0).unwrap();
        let registry: SharedRegistry = Arc::new(parking_lot::Mutex::new(registry));

        let (status, body) = route("/aircraft/4840D6", &registry, 10).unwrap();
        assert_eq!(status, "200 OK");
        let aircraft: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(aircraft["hex"], "4840D6");
        assert_eq!(aircraft["altitude"], 10_000);
        assert_eq!(aircraft["created_at"], 10.0);

        let (status, _) = route("/data.json", &registry, 10).unwrap();
        assert_eq!(status, "200 OK");
        let (status, body) = route("/aircraft/FFFFFF", &registry, 10).unwrap();
        assert_eq!(status, "404 Not Found");
        assert_eq!(body, NOT_FOUND);
        assert_eq!(route("/", &registry, 10).unwrap().0, "404 Not Found");
    }

    #[test]
    fn test_snapshot_json() {
        let mut registry = AircraftRegistry::new(RegistryConfig::at(0.0, 0.0)).unwrap();
        registry.ingest("FAR", 20_000, 0.0, 0.5, 10.0).unwrap();
        registry.ingest("NEAR", 10_000, 0.0, 0.1, 12.0).unwrap();

        let json = snapshot_json(&registry, 10, 15.0).unwrap();
        let rows: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(rows.as_array().unwrap().len(), 2);
        assert_eq!(rows[0]["hex"], "NEAR");
        assert_eq!(rows[0]["seen"], 3.0);
        assert_eq!(rows[1]["hex"], "FAR");
        assert_eq!(rows[1]["altitude"], 20_000);
        assert!((rows[1]["bearing"].as_f64().unwrap() - 90.0).abs() < 1e-9);
    }
}
