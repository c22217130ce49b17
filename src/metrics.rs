//! Prometheus-compatible metrics endpoint
//!
//! Counters are always collected. The HTTP endpoint serves
//! `/metrics` (Prometheus text), `/metrics/json` and `/health`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};

/// Rolling window used for tick percentiles
const TICK_HISTORY: usize = 1000;

/// Metrics registry for the pond server
#[derive(Debug)]
pub struct Metrics {
    // Session population
    pub players: AtomicU64,
    pub confirmed_players: AtomicU64,
    pub sessions_started: AtomicU64,
    pub fish_deaths: AtomicU64,

    // Entity counts
    pub bubble_count: AtomicU64,
    pub bubbles_fired: AtomicU64,
    pub bubbles_popped: AtomicU64,

    // Tick timing (microseconds)
    pub tick_time_us: AtomicU64,
    pub tick_time_p95_us: AtomicU64,
    pub tick_time_p99_us: AtomicU64,
    pub tick_time_max_us: AtomicU64,
    pub tick_count: AtomicU64,

    // Network stats
    pub connections_active: AtomicU64,
    pub connections_total: AtomicU64,
    pub messages_sent: AtomicU64,
    pub messages_received: AtomicU64,
    pub malformed_messages: AtomicU64,
    /// Outbound records discarded because a client's queue was full
    pub messages_dropped: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub bytes_received: AtomicU64,

    start_time: Instant,
    tick_history: RwLock<VecDeque<u64>>,
}

/// Point-in-time copy of every metric, used for the JSON view
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub session: SessionStats,
    pub performance: PerformanceStats,
    pub network: NetworkStats,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub players: u64,
    pub confirmed_players: u64,
    pub sessions_started: u64,
    pub fish_deaths: u64,
    pub bubbles: u64,
    pub bubbles_fired: u64,
    pub bubbles_popped: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceStats {
    pub tick_time_us: u64,
    pub tick_time_p95_us: u64,
    pub tick_time_p99_us: u64,
    pub tick_time_max_us: u64,
    pub tick_count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct NetworkStats {
    pub connections: u64,
    pub connections_total: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub malformed_messages: u64,
    pub messages_dropped: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            players: AtomicU64::new(0),
            confirmed_players: AtomicU64::new(0),
            sessions_started: AtomicU64::new(0),
            fish_deaths: AtomicU64::new(0),
            bubble_count: AtomicU64::new(0),
            bubbles_fired: AtomicU64::new(0),
            bubbles_popped: AtomicU64::new(0),
            tick_time_us: AtomicU64::new(0),
            tick_time_p95_us: AtomicU64::new(0),
            tick_time_p99_us: AtomicU64::new(0),
            tick_time_max_us: AtomicU64::new(0),
            tick_count: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            connections_total: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            malformed_messages: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            start_time: Instant::now(),
            tick_history: RwLock::new(VecDeque::with_capacity(TICK_HISTORY)),
        }
    }

    /// Record a tick time and update percentiles
    pub fn record_tick_time(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.tick_time_us.store(us, Ordering::Relaxed);
        self.tick_count.fetch_add(1, Ordering::Relaxed);

        let mut history = self.tick_history.write();
        history.push_back(us);
        while history.len() > TICK_HISTORY {
            history.pop_front();
        }

        if history.len() >= 10 {
            let mut sorted: Vec<u64> = history.iter().copied().collect();
            sorted.sort_unstable();

            let p95_idx = (sorted.len() as f32 * 0.95) as usize;
            let p99_idx = (sorted.len() as f32 * 0.99) as usize;

            self.tick_time_p95_us
                .store(sorted[p95_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_p99_us
                .store(sorted[p99_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_max_us
                .store(sorted.last().copied().unwrap_or(0), Ordering::Relaxed);
        }
    }

    /// One outbound record of `len` bytes
    pub fn record_sent(&self, len: usize) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(len as u64, Ordering::Relaxed);
    }

    /// One outbound record discarded on a full queue
    pub fn record_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// One inbound record of `len` bytes
    pub fn record_received(&self, len: usize) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(len as u64, Ordering::Relaxed);
    }

    pub fn connection_opened(&self) {
        self.connections_active.fetch_add(1, Ordering::Relaxed);
        self.connections_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        // Never wraps below zero
        let _ = self
            .connections_active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        MetricsSnapshot {
            session: SessionStats {
                players: load(&self.players),
                confirmed_players: load(&self.confirmed_players),
                sessions_started: load(&self.sessions_started),
                fish_deaths: load(&self.fish_deaths),
                bubbles: load(&self.bubble_count),
                bubbles_fired: load(&self.bubbles_fired),
                bubbles_popped: load(&self.bubbles_popped),
            },
            performance: PerformanceStats {
                tick_time_us: load(&self.tick_time_us),
                tick_time_p95_us: load(&self.tick_time_p95_us),
                tick_time_p99_us: load(&self.tick_time_p99_us),
                tick_time_max_us: load(&self.tick_time_max_us),
                tick_count: load(&self.tick_count),
            },
            network: NetworkStats {
                connections: load(&self.connections_active),
                connections_total: load(&self.connections_total),
                messages_sent: load(&self.messages_sent),
                messages_received: load(&self.messages_received),
                malformed_messages: load(&self.malformed_messages),
                messages_dropped: load(&self.messages_dropped),
                bytes_sent: load(&self.bytes_sent),
                bytes_received: load(&self.bytes_received),
            },
            uptime_seconds: self.uptime_seconds(),
        }
    }

    /// Generate Prometheus-format metrics output
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(4096);
        let snap = self.snapshot();

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        metric!("pond_players", "Occupied player slots", "gauge", snap.session.players);
        metric!("pond_players_confirmed", "Players receiving updates", "gauge",
            snap.session.confirmed_players);
        metric!("pond_sessions_started_total", "Sessions bootstrapped", "counter",
            snap.session.sessions_started);
        metric!("pond_fish_deaths_total", "Fish removed at zero health", "counter",
            snap.session.fish_deaths);

        metric!("pond_bubbles", "Live bubbles", "gauge", snap.session.bubbles);
        metric!("pond_bubbles_fired_total", "Bubbles fired", "counter", snap.session.bubbles_fired);
        metric!("pond_bubbles_popped_total", "Bubbles popped on contact", "counter",
            snap.session.bubbles_popped);

        metric!("pond_tick_time_microseconds", "Current tick time in microseconds", "gauge",
            snap.performance.tick_time_us);
        metric!("pond_tick_time_p95_microseconds", "95th percentile tick time", "gauge",
            snap.performance.tick_time_p95_us);
        metric!("pond_tick_time_p99_microseconds", "99th percentile tick time", "gauge",
            snap.performance.tick_time_p99_us);
        metric!("pond_tick_time_max_microseconds", "Maximum tick time", "gauge",
            snap.performance.tick_time_max_us);
        metric!("pond_tick_count", "Total ticks processed", "counter", snap.performance.tick_count);

        metric!("pond_connections_active", "Active WebTransport connections", "gauge",
            snap.network.connections);
        metric!("pond_connections_total", "Accepted WebTransport connections", "counter",
            snap.network.connections_total);
        metric!("pond_messages_sent_total", "Total records sent", "counter",
            snap.network.messages_sent);
        metric!("pond_messages_received_total", "Total records received", "counter",
            snap.network.messages_received);
        metric!("pond_messages_malformed_total", "Records dropped as malformed", "counter",
            snap.network.malformed_messages);
        metric!("pond_messages_dropped_total", "Outbound records dropped on a full queue", "counter",
            snap.network.messages_dropped);
        metric!("pond_bytes_sent_total", "Total bytes sent", "counter", snap.network.bytes_sent);
        metric!("pond_bytes_received_total", "Total bytes received", "counter",
            snap.network.bytes_received);

        metric!("pond_uptime_seconds", "Server uptime in seconds", "counter", snap.uptime_seconds);

        output
    }

    /// JSON view of the same metrics
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(&self.snapshot()).unwrap_or_else(|_| "{}".to_string())
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn http_response(content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        content_type,
        body.len(),
        body
    )
}

/// Response for one raw HTTP request
fn route(metrics: &Metrics, request: &str) -> String {
    if request.starts_with("GET /metrics/json") {
        http_response("application/json", &metrics.to_json())
    } else if request.starts_with("GET /metrics") {
        http_response("text/plain; version=0.0.4", &metrics.to_prometheus())
    } else if request.starts_with("GET /health") {
        http_response("text/plain", "OK")
    } else {
        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
    }
}

/// Start the metrics HTTP server
pub async fn start_metrics_server(metrics: Arc<Metrics>, address: &str, port: u16) -> anyhow::Result<()> {
    let addr = format!("{}:{}", address, port);
    let listener = TcpListener::bind(&addr).await?;

    info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        let (mut socket, peer) = listener.accept().await?;
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];

            match socket.read(&mut buffer).await {
                Ok(n) if n > 0 => {
                    let request = String::from_utf8_lossy(&buffer[..n]);
                    let response = route(&metrics, &request);
                    if let Err(e) = socket.write_all(response.as_bytes()).await {
                        debug!("Failed to write metrics response to {}: {}", peer, e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Failed to read from metrics socket {}: {}", peer, e);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.players.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.tick_count.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_record_tick_time() {
        let metrics = Metrics::new();
        for i in 0..100 {
            metrics.record_tick_time(Duration::from_micros(100 + i * 10));
        }

        assert_eq!(metrics.tick_count.load(Ordering::Relaxed), 100);
        assert!(metrics.tick_time_p95_us.load(Ordering::Relaxed) >= 1000);
        assert_eq!(metrics.tick_time_max_us.load(Ordering::Relaxed), 1090);
    }

    #[test]
    fn test_tick_history_is_bounded() {
        let metrics = Metrics::new();
        for _ in 0..(TICK_HISTORY + 50) {
            metrics.record_tick_time(Duration::from_micros(5));
        }
        assert_eq!(metrics.tick_history.read().len(), TICK_HISTORY);
    }

    #[test]
    fn test_connection_gauge_never_underflows() {
        let metrics = Metrics::new();
        metrics.connection_closed();
        assert_eq!(metrics.connections_active.load(Ordering::Relaxed), 0);

        metrics.connection_opened();
        metrics.connection_opened();
        metrics.connection_closed();
        assert_eq!(metrics.connections_active.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.connections_total.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.players.store(3, Ordering::Relaxed);
        metrics.record_sent(12);
        metrics.record_dropped();

        let output = metrics.to_prometheus();
        assert!(output.contains("pond_players 3"));
        assert!(output.contains("pond_messages_dropped_total 1"));
        assert!(output.contains("# TYPE pond_messages_sent_total counter"));
        assert!(output.contains("pond_bytes_sent_total 12"));
    }

    #[test]
    fn test_json_format() {
        let metrics = Metrics::new();
        metrics.bubble_count.store(7, Ordering::Relaxed);
        metrics.record_received(40);

        let value: serde_json::Value = serde_json::from_str(&metrics.to_json()).unwrap();
        assert_eq!(value["session"]["bubbles"], 7);
        assert_eq!(value["network"]["bytes_received"], 40);
    }

    #[test]
    fn test_routes() {
        let metrics = Metrics::new();
        assert!(route(&metrics, "GET /metrics/json HTTP/1.1").contains("application/json"));
        assert!(route(&metrics, "GET /metrics HTTP/1.1").contains("pond_tick_count"));
        assert!(route(&metrics, "GET /health HTTP/1.1").ends_with("OK"));
        assert!(route(&metrics, "GET /nope HTTP/1.1").starts_with("HTTP/1.1 404"));
    }
}
