/// Scheduler metrics and the optional status HTTP endpoint
/// Exposes /health, /state, /allowed and /metrics for the daemon

use serde_json::json;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::scheduler::NotificationScheduler;

/// Timeout for reading HTTP request (prevents slow-loris attacks)
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Point-in-time copy of [`SchedulerMetrics`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub scheduled: u64,
    pub delayed: u64,
    pub blocked: u64,
    pub suppressed: u64,
    pub failed: u64,
    pub delivered: u64,
    /// Unix epoch seconds of the last scheduling attempt
    pub last_attempt_time: u64,
    pub last_attempt_ok: bool,
}

/// Counters updated by the scheduler on every attempt
#[derive(Debug)]
pub struct SchedulerMetrics {
    scheduled: AtomicU64,
    delayed: AtomicU64,
    blocked: AtomicU64,
    suppressed: AtomicU64,
    failed: AtomicU64,
    delivered: AtomicU64,
    last_attempt_time: AtomicU64,
    last_attempt_ok: AtomicBool,
}

impl Default for SchedulerMetrics {
    fn default() -> Self {
        Self {
            scheduled: AtomicU64::new(0),
            delayed: AtomicU64::new(0),
            blocked: AtomicU64::new(0),
            suppressed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            last_attempt_time: AtomicU64::new(0),
            last_attempt_ok: AtomicBool::new(true), // Nothing has failed yet
        }
    }
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

impl SchedulerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn attempt(&self, counter: &AtomicU64, ok: bool) {
        counter.fetch_add(1, Ordering::Relaxed);
        self.last_attempt_time.store(unix_now(), Ordering::Relaxed);
        self.last_attempt_ok.store(ok, Ordering::Relaxed);
    }

    pub fn record_scheduled(&self) {
        self.attempt(&self.scheduled, true);
    }

    pub fn record_delayed(&self) {
        self.attempt(&self.delayed, true);
    }

    /// A candidate fell into quiet hours. Not a failure.
    pub fn record_blocked(&self) {
        self.attempt(&self.blocked, true);
    }

    pub fn record_suppressed(&self) {
        self.attempt(&self.suppressed, true);
    }

    pub fn record_failure(&self) {
        self.attempt(&self.failed, false);
    }

    pub fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            scheduled: self.scheduled.load(Ordering::Relaxed),
            delayed: self.delayed.load(Ordering::Relaxed),
            blocked: self.blocked.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            last_attempt_time: self.last_attempt_time.load(Ordering::Relaxed),
            last_attempt_ok: self.last_attempt_ok.load(Ordering::Relaxed),
        }
    }
}

/// Run the status HTTP server until cancelled
pub async fn run_status_server(
    port: u16,
    scheduler: Arc<NotificationScheduler>,
    cancel_token: CancellationToken,
) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind status server on port {}: {}", port, e);
            return;
        }
    };

    info!("Status server listening on http://0.0.0.0:{}/health", port);

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((mut socket, peer_addr)) => {
                        let scheduler = scheduler.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_request(&mut socket, &scheduler).await {
                                debug!("Error handling request from {}: {}", peer_addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        warn!("Failed to accept connection: {}", e);
                    }
                }
            }
            _ = cancel_token.cancelled() => {
                info!("Status server shutting down");
                break;
            }
        }
    }
}

async fn handle_request(
    socket: &mut tokio::net::TcpStream,
    scheduler: &NotificationScheduler,
) -> std::io::Result<()> {
    let mut buf = [0u8; 1024];

    let n = match timeout(REQUEST_TIMEOUT, socket.read(&mut buf)).await {
        Ok(result) => result?,
        Err(_) => {
            debug!("Request timeout after {:?}", REQUEST_TIMEOUT);
            return Ok(());
        }
    };

    if n == 0 {
        return Ok(());
    }

    let request = String::from_utf8_lossy(&buf[..n]);

    // Request line: METHOD PATH VERSION
    let path = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/");

    let response = match path {
        "/health" | "/healthz" | "/health/" => build_health_response(&scheduler.metrics().snapshot()),
        "/state" | "/state/" => {
            let state = scheduler.state().await;
            let body = json!({
                "scheduledId": state.scheduled_id,
                "nextFireTime": state.next_fire_time,
                "status": state.status,
            });
            build_json_response(200, "OK", &body.to_string())
        }
        "/allowed" | "/allowed/" => {
            let now = scheduler.now();
            let body = json!({
                "at": now,
                "allowed": scheduler.is_allowed_at(now),
            });
            build_json_response(200, "OK", &body.to_string())
        }
        "/metrics" => build_metrics_response(&scheduler.metrics().snapshot()),
        _ => build_json_response(404, "Not Found", r#"{"error":"Not Found"}"#),
    };

    socket.write_all(response.as_bytes()).await?;
    socket.flush().await?;

    Ok(())
}

fn build_json_response(code: u16, reason: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        code,
        reason,
        body.len(),
        body
    )
}

fn build_health_response(snapshot: &MetricsSnapshot) -> String {
    let body = json!({
        "status": "healthy",
        "last_attempt_time": snapshot.last_attempt_time,
        "last_attempt_ok": snapshot.last_attempt_ok,
    });
    build_json_response(200, "OK", &body.to_string())
}

fn build_metrics_response(snapshot: &MetricsSnapshot) -> String {
    // Prometheus text exposition format
    let body = format!(
        "# HELP novelty_schedule_attempts_total Scheduling attempts by outcome\n\
         # TYPE novelty_schedule_attempts_total counter\n\
         novelty_schedule_attempts_total{{outcome=\"scheduled\"}} {}\n\
         novelty_schedule_attempts_total{{outcome=\"delayed\"}} {}\n\
         novelty_schedule_attempts_total{{outcome=\"blocked\"}} {}\n\
         novelty_schedule_attempts_total{{outcome=\"suppressed\"}} {}\n\
         novelty_schedule_attempts_total{{outcome=\"failed\"}} {}\n\
         # HELP novelty_deliveries_total Notifications delivered\n\
         # TYPE novelty_deliveries_total counter\n\
         novelty_deliveries_total {}\n\
         # HELP novelty_last_attempt_timestamp Unix timestamp of last scheduling attempt\n\
         # TYPE novelty_last_attempt_timestamp gauge\n\
         novelty_last_attempt_timestamp {}\n\
         # HELP novelty_last_attempt_ok Whether the last attempt succeeded (1) or failed (0)\n\
         # TYPE novelty_last_attempt_ok gauge\n\
         novelty_last_attempt_ok {}\n",
        snapshot.scheduled,
        snapshot.delayed,
        snapshot.blocked,
        snapshot.suppressed,
        snapshot.failed,
        snapshot.delivered,
        snapshot.last_attempt_time,
        if snapshot.last_attempt_ok { 1 } else { 0 }
    );

    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    )
}
