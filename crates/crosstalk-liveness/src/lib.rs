//! Liveness supervision for signaling connections.
//!
//! Every participant gets a probe loop that periodically writes a ping
//! control frame to its connection. The death signal is deliberately
//! transport-level: a peer is considered dead exactly when a write against
//! its stream fails (or exceeds the probe write timeout), not when it is
//! slow to acknowledge. Any inbound traffic, data or control, counts as
//! proof of life.
//!
//! # State machine
//!
//! ```text
//!   Active ──(probe sent)──→ AwaitingAck ──(probe write fails)──→ Dead
//!     ↑                           │
//!     └──────(any traffic)────────┘
//! ```
//!
//! `Dead` is terminal: once a monitor is marked dead, later traffic can't
//! revive it, because teardown for the participant has already begun.
//!
//! # Integration
//!
//! The probe loop is spawned alongside the connection's receive loop:
//!
//! ```ignore
//! tokio::spawn(async move {
//!     let outcome = run_probe_loop(conn.as_ref(), &monitor, &config).await;
//!     // outcome != Superseded means the transport is gone: tear down.
//! });
//! ```

use std::time::{Duration, Instant};

use crosstalk_transport::Connection;
use rand::Rng;
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Timing configuration for liveness supervision.
#[derive(Debug, Clone)]
pub struct LivenessConfig {
    /// How often to write a probe frame. Default: 15 seconds.
    pub probe_interval: Duration,
    /// How long a probe write may take before it counts as a transport
    /// failure. Default: 5 seconds.
    pub probe_timeout: Duration,
    /// How often to refresh the durable presence record ("touch").
    /// Orders of magnitude slower than the probe; it bounds staleness of
    /// the external store without generating write traffic per probe.
    /// Default: 10 minutes.
    pub touch_interval: Duration,
    /// Maximum random delay before the first probe, so connections
    /// accepted in the same instant don't probe in lockstep.
    /// Default: 2 seconds.
    pub initial_jitter: Duration,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(15),
            probe_timeout: Duration::from_secs(5),
            touch_interval: Duration::from_secs(600),
            initial_jitter: Duration::from_secs(2),
        }
    }
}

impl LivenessConfig {
    /// Clamp and fix any out-of-range values so the config is safe to use.
    ///
    /// Rules:
    /// - `probe_interval` must be non-zero (raised to 1 s if zero).
    /// - `probe_timeout` is capped at `probe_interval`.
    /// - `initial_jitter` is capped at `probe_interval`.
    pub fn validated(mut self) -> Self {
        if self.probe_interval.is_zero() {
            warn!("probe_interval of zero is not usable, raising to 1s");
            self.probe_interval = Duration::from_secs(1);
        }
        if self.probe_timeout > self.probe_interval {
            warn!(
                probe_timeout_ms = self.probe_timeout.as_millis() as u64,
                probe_interval_ms = self.probe_interval.as_millis() as u64,
                "probe_timeout exceeds probe_interval, capping"
            );
            self.probe_timeout = self.probe_interval;
        }
        if self.initial_jitter > self.probe_interval {
            self.initial_jitter = self.probe_interval;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// The liveness state of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessState {
    /// Traffic has been seen since the last probe.
    Active,
    /// A probe went out and nothing has come back yet. Not an error
    /// state: the peer may simply be idle.
    AwaitingAck {
        /// When the outstanding probe was sent.
        since: Instant,
    },
    /// The transport failed. Terminal.
    Dead,
}

impl LivenessState {
    /// Returns `true` if this is the terminal state.
    pub fn is_dead(&self) -> bool {
        matches!(self, Self::Dead)
    }
}

impl std::fmt::Display for LivenessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "Active"),
            Self::AwaitingAck { .. } => write!(f, "AwaitingAck"),
            Self::Dead => write!(f, "Dead"),
        }
    }
}

struct MonitorInner {
    state: LivenessState,
    last_activity: Instant,
}

/// Shared liveness record for one connection.
///
/// Written from two places: the receive loop (records traffic) and the
/// probe loop (records probes and deaths). A plain mutex is enough; both
/// writers touch it a few times per second at most.
pub struct LivenessMonitor {
    inner: std::sync::Mutex<MonitorInner>,
}

impl LivenessMonitor {
    /// Creates a monitor in the `Active` state, stamped now.
    pub fn new() -> Self {
        Self {
            inner: std::sync::Mutex::new(MonitorInner {
                state: LivenessState::Active,
                last_activity: Instant::now(),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MonitorInner> {
        // A poisoned lock means a panic mid-update of two plain fields;
        // the data is still coherent, so keep going.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Records inbound traffic: resets `AwaitingAck` back to `Active` and
    /// stamps the last-activity time. A dead monitor stays dead.
    pub fn record_activity(&self) {
        let mut inner = self.lock();
        inner.last_activity = Instant::now();
        if !inner.state.is_dead() {
            if matches!(inner.state, LivenessState::AwaitingAck { .. }) {
                trace!("probe answered, connection active");
            }
            inner.state = LivenessState::Active;
        }
    }

    /// Records that a probe was written. `Active` becomes `AwaitingAck`;
    /// an already-outstanding probe keeps its original timestamp.
    pub fn record_probe(&self) {
        let mut inner = self.lock();
        if matches!(inner.state, LivenessState::Active) {
            inner.state = LivenessState::AwaitingAck {
                since: Instant::now(),
            };
        }
    }

    /// Marks the connection dead. Terminal.
    pub fn mark_dead(&self) {
        let mut inner = self.lock();
        if !inner.state.is_dead() {
            debug!("liveness monitor marked dead");
            inner.state = LivenessState::Dead;
        }
    }

    /// Returns `true` once the connection has been marked dead.
    pub fn is_dead(&self) -> bool {
        self.lock().state.is_dead()
    }

    /// Returns the current state.
    pub fn state(&self) -> LivenessState {
        self.lock().state
    }

    /// Returns how long ago the peer last produced any traffic.
    pub fn idle_for(&self) -> Duration {
        self.lock().last_activity.elapsed()
    }
}

impl Default for LivenessMonitor {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Probe loop
// ---------------------------------------------------------------------------

/// Why a probe loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The probe write was rejected by the transport.
    SendFailed,
    /// The probe write did not complete within `probe_timeout`.
    TimedOut,
    /// Another task already marked the monitor dead; nothing to report.
    Superseded,
}

/// Runs the periodic probe loop for one connection.
///
/// Returns when the connection is dead, either because a probe write
/// failed or because some other task marked the monitor dead first. The
/// monitor is guaranteed to be in the `Dead` state on return. Callers are
/// expected to run this in its own task and trigger participant teardown
/// when it returns.
pub async fn run_probe_loop<C: Connection>(
    conn: &C,
    monitor: &LivenessMonitor,
    config: &LivenessConfig,
) -> ProbeOutcome {
    let jitter_ms = config.initial_jitter.as_millis() as u64;
    if jitter_ms > 0 {
        let delay = rand::rng().random_range(0..=jitter_ms);
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    let mut ticker = tokio::time::interval(config.probe_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick of a tokio interval completes immediately; consume it
    // so the first probe goes out one full interval after connect.
    ticker.tick().await;

    loop {
        ticker.tick().await;

        if monitor.is_dead() {
            return ProbeOutcome::Superseded;
        }

        monitor.record_probe();
        match tokio::time::timeout(config.probe_timeout, conn.ping()).await {
            Ok(Ok(())) => {
                trace!(conn_id = %conn.id(), "liveness probe sent");
            }
            Ok(Err(e)) => {
                warn!(conn_id = %conn.id(), error = %e, "liveness probe write failed");
                monitor.mark_dead();
                return ProbeOutcome::SendFailed;
            }
            Err(_) => {
                warn!(
                    conn_id = %conn.id(),
                    timeout_ms = config.probe_timeout.as_millis() as u64,
                    "liveness probe write timed out"
                );
                monitor.mark_dead();
                return ProbeOutcome::TimedOut;
            }
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
