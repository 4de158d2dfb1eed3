//! Diagnostics sender: ships per-frame render metrics to `fjord-telemetry`
//! over UDP.
//!
//! Enabled by the `diagnostics` feature flag. The runner keeps a
//! [`DiagSender`] and hands it a [`RenderStats`] every frame; the sender
//! throttles itself to 10 Hz, serializes a JSON snapshot and sends it to
//! `127.0.0.1:9100`. Sending is fire-and-forget: with no telemetry listening
//! the datagrams are simply dropped.
//!
//! [`init_logger`] installs a logger that keeps `env_logger` output on stderr
//! and also captures records into a ring so they show up in the TUI.

use std::collections::VecDeque;
use std::net::{SocketAddr, UdpSocket};
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::gpu::FrameStats;
use crate::render::master::PassStats;
use crate::time::Time;

/// Where `fjord-telemetry` listens.
pub const TELEMETRY_ADDR: &str = "127.0.0.1:9100";
/// Minimum spacing between two snapshots.
pub const SEND_INTERVAL: Duration = Duration::from_millis(100);
/// Captured log entries kept between sends.
pub const LOG_CAPACITY: usize = 500;
/// Log entries shipped per snapshot.
const LOGS_PER_SNAPSHOT: usize = 50;

// ── RenderStats ──────────────────────────────────────────────────────────

/// Per-frame render statistics: the device counters plus what the
/// compositor had queued.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderStats {
    pub frame: FrameStats,
    pub passes: Vec<PassStats>,
    pub particles: usize,
    pub batches: usize,
    pub texts: usize,
}

impl RenderStats {
    pub fn new(frame: FrameStats) -> Self {
        Self {
            frame,
            ..Default::default()
        }
    }
}

// ── Snapshot types (wire format) ────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct DiagSnapshot {
    pub fps: f32,
    pub delta_ms: f32,
    pub frame_count: u64,
    pub elapsed_secs: f32,
    pub render: RenderStatsSnapshot,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub passes: Vec<PassSnapshot>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub logs: Vec<LogEntrySnapshot>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct RenderStatsSnapshot {
    pub draw_calls: u32,
    pub instanced_draws: u32,
    pub vertices: u32,
    pub mesh_binds: u32,
    pub texture_binds: u32,
    pub program_binds: u32,
    pub passes: usize,
    pub particles: usize,
    pub batches: usize,
    pub texts: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct PassSnapshot {
    pub name: String,
    pub draw_calls: u32,
    pub instances: u32,
    pub vertices: u32,
    pub texture_binds: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct LogEntrySnapshot {
    pub level: String,
    pub target: String,
    pub message: String,
    pub timestamp_secs: f32,
}

impl DiagSnapshot {
    fn new(time: &Time, stats: &RenderStats, logs: Vec<LogEntrySnapshot>) -> Self {
        let f = &stats.frame;
        Self {
            fps: time.fps(),
            delta_ms: time.delta_secs() * 1000.0,
            frame_count: time.frame_count(),
            elapsed_secs: time.elapsed_secs(),
            render: RenderStatsSnapshot {
                draw_calls: f.draw_calls,
                instanced_draws: f.instanced_draws,
                vertices: f.vertices,
                mesh_binds: f.mesh_binds,
                texture_binds: f.texture_binds,
                program_binds: f.program_binds,
                passes: stats.passes.len(),
                particles: stats.particles,
                batches: stats.batches,
                texts: stats.texts,
            },
            passes: stats
                .passes
                .iter()
                .map(|p| PassSnapshot {
                    name: p.name.to_string(),
                    draw_calls: p.stats.draw_calls,
                    instances: p.stats.instances,
                    vertices: p.stats.vertices,
                    texture_binds: p.stats.texture_binds,
                })
                .collect(),
            logs,
        }
    }
}

// ── DiagSender ───────────────────────────────────────────────────────────

/// Owns the outbound UDP socket and the throttling state.
pub struct DiagSender {
    socket: UdpSocket,
    last_send: Option<Instant>,
}

impl DiagSender {
    /// Sender aimed at [`TELEMETRY_ADDR`]. `None` when no socket can be bound.
    pub fn new() -> Option<Self> {
        let addr = TELEMETRY_ADDR.parse().ok()?;
        Self::with_address(addr)
    }

    pub fn with_address(addr: SocketAddr) -> Option<Self> {
        let socket = UdpSocket::bind("127.0.0.1:0").ok()?;
        socket.connect(addr).ok()?;
        socket.set_nonblocking(true).ok()?;
        Some(Self {
            socket,
            last_send: None,
        })
    }

    /// Send a snapshot unless one went out less than [`SEND_INTERVAL`] ago.
    /// Returns whether a datagram was sent.
    pub fn send(&mut self, time: &Time, stats: &RenderStats) -> bool {
        let now = Instant::now();
        if !due(self.last_send, now) {
            return false;
        }
        self.last_send = Some(now);

        let logs = drain_captured_logs(LOGS_PER_SNAPSHOT);
        let snapshot = DiagSnapshot::new(time, stats, logs);
        match serde_json::to_vec(&snapshot) {
            Ok(json) => self.socket.send(&json).is_ok(),
            Err(_) => false,
        }
    }
}

fn due(last: Option<Instant>, now: Instant) -> bool {
    match last {
        Some(last) => now.duration_since(last) >= SEND_INTERVAL,
        None => true,
    }
}

// ── Log capture ──────────────────────────────────────────────────────────

struct CapturedLog {
    level: log::Level,
    target: String,
    message: String,
    timestamp_secs: f32,
}

/// Oldest entries fall off once the ring holds `capacity`.
struct LogRing {
    entries: VecDeque<CapturedLog>,
    capacity: usize,
}

impl LogRing {
    fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, entry: CapturedLog) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    fn drain(&mut self, max: usize) -> Vec<CapturedLog> {
        let n = self.entries.len().min(max);
        self.entries.drain(..n).collect()
    }
}

static LOG_RING: Mutex<Option<LogRing>> = Mutex::new(None);
static LOG_START: OnceLock<Instant> = OnceLock::new();

/// Captures records into the ring and delegates to env_logger for stderr.
struct DiagLogger {
    inner: env_logger::Logger,
}

impl log::Log for DiagLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.inner.enabled(metadata) || metadata.level() <= log::Level::Info
    }

    fn log(&self, record: &log::Record) {
        if self.inner.enabled(record.metadata()) {
            self.inner.log(record);
        }
        if record.level() > log::Level::Info && !self.inner.enabled(record.metadata()) {
            return;
        }

        let entry = CapturedLog {
            level: record.level(),
            target: record.target().to_string(),
            message: record.args().to_string(),
            timestamp_secs: LOG_START.get().map(|s| s.elapsed().as_secs_f32()).unwrap_or(0.0),
        };
        if let Ok(mut guard) = LOG_RING.lock()
            && let Some(ring) = guard.as_mut()
        {
            ring.push(entry);
        }
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

static DIAG_LOGGER: OnceLock<DiagLogger> = OnceLock::new();

/// Install the capturing logger. `RUST_LOG` filters stderr as usual; info
/// and above are always captured for the TUI.
///
/// Call before anything logs. A second call, or a logger installed
/// elsewhere, leaves the existing logger in place.
pub fn init_logger() {
    if let Ok(mut ring) = LOG_RING.lock() {
        ring.get_or_insert_with(|| LogRing::new(LOG_CAPACITY));
    }
    LOG_START.get_or_init(Instant::now);

    let inner = env_logger::Builder::new().parse_default_env().build();
    let max_level = inner.filter();
    let logger = DIAG_LOGGER.get_or_init(|| DiagLogger { inner });

    if log::set_logger(logger).is_err() {
        eprintln!("[fjord] a logger is already set, log capture disabled");
        return;
    }
    log::set_max_level(max_level.max(log::LevelFilter::Info));
}

fn drain_captured_logs(max: usize) -> Vec<LogEntrySnapshot> {
    let Ok(mut guard) = LOG_RING.lock() else {
        return Vec::new();
    };
    let Some(ring) = guard.as_mut() else {
        return Vec::new();
    };
    ring.drain(max)
        .into_iter()
        .map(|e| LogEntrySnapshot {
            level: e.level.to_string(),
            target: e.target,
            message: e.message,
            timestamp_secs: e.timestamp_secs,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(message: &str) -> CapturedLog {
        CapturedLog {
            level: log::Level::Info,
            target: "fjord".into(),
            message: message.into(),
            timestamp_secs: 0.0,
        }
    }

    #[test]
    fn log_ring_drops_oldest() {
        let mut ring = LogRing::new(3);
        for i in 0..5 {
            ring.push(entry(&i.to_string()));
        }
        let drained: Vec<String> = ring.drain(10).into_iter().map(|e| e.message).collect();
        assert_eq!(drained, ["2", "3", "4"]);
        assert!(ring.drain(10).is_empty());
    }

    #[test]
    fn log_ring_drains_in_chunks() {
        let mut ring = LogRing::new(LOG_CAPACITY);
        for i in 0..7 {
            ring.push(entry(&i.to_string()));
        }
        assert_eq!(ring.drain(5).len(), 5);
        assert_eq!(ring.drain(5).len(), 2);
    }

    #[test]
    fn sends_are_throttled() {
        let start = Instant::now();
        assert!(due(None, start));
        assert!(!due(Some(start), start + Duration::from_millis(40)));
        assert!(due(Some(start), start + SEND_INTERVAL));
    }

    #[test]
    fn snapshot_carries_pass_breakdown() {
        let mut stats = RenderStats::new(FrameStats {
            draw_calls: 12,
            instanced_draws: 1,
            instances: 40,
            ..Default::default()
        });
        stats.passes.push(PassStats {
            name: "particles",
            stats: FrameStats {
                draw_calls: 1,
                instances: 40,
                vertices: 160,
                ..Default::default()
            },
        });
        stats.particles = 40;

        let snapshot = DiagSnapshot::new(&Time::new(), &stats, Vec::new());
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["render"]["draw_calls"], 12);
        assert_eq!(json["render"]["passes"], 1);
        assert_eq!(json["passes"][0]["name"], "particles");
        assert_eq!(json["passes"][0]["vertices"], 160);
        assert!(json.get("logs").is_none());
    }

    #[test]
    fn snapshot_reaches_a_listener() {
        let listener = UdpSocket::bind("127.0.0.1:0").unwrap();
        listener.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let mut sender = DiagSender::with_address(listener.local_addr().unwrap()).unwrap();

        let stats = RenderStats::new(FrameStats {
            draw_calls: 3,
            ..Default::default()
        });
        assert!(sender.send(&Time::new(), &stats));
        assert!(!sender.send(&Time::new(), &stats));

        let mut buf = [0u8; 65536];
        let n = listener.recv(&mut buf).unwrap();
        let snapshot: DiagSnapshot = serde_json::from_slice(&buf[..n]).unwrap();
        assert_eq!(snapshot.render.draw_calls, 3);
    }
}
