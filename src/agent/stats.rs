//! Per-agent telemetry counters.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::AgentKind;

/// Error rate below which an agent reports itself healthy.
pub const HEALTHY_ERROR_RATE: f64 = 0.1;
/// Error rate above which the health check fails.
pub const FAILING_ERROR_RATE: f64 = 0.5;

/// Best-effort counters shared across concurrent requests.
#[derive(Debug, Default)]
pub struct AgentStats {
    message_count: AtomicU64,
    error_count: AtomicU64,
    /// Milliseconds since the epoch; zero when never active.
    last_activity_ms: AtomicI64,
}

impl AgentStats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an incoming message.
    pub fn record_message(&self) {
        self.message_count.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    /// Records a failed `handle`.
    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    fn touch(&self) {
        self.last_activity_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    /// Messages seen so far.
    #[must_use]
    pub fn message_count(&self) -> u64 {
        self.message_count.load(Ordering::Relaxed)
    }

    /// Failures seen so far.
    #[must_use]
    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    /// Time of the last recorded event.
    #[must_use]
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        match self.last_activity_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => DateTime::from_timestamp_millis(ms),
        }
    }

    /// `error_count / message_count`, zero before the first message.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn error_rate(&self) -> f64 {
        let messages = self.message_count();
        if messages == 0 {
            return 0.0;
        }
        self.error_count() as f64 / messages as f64
    }

    /// Read-only snapshot.
    #[must_use]
    pub fn snapshot(&self, name: &str, kind: AgentKind) -> AgentStatus {
        let error_rate = self.error_rate();
        AgentStatus {
            name: name.to_string(),
            kind,
            message_count: self.message_count(),
            error_count: self.error_count(),
            error_rate,
            is_healthy: error_rate < HEALTHY_ERROR_RATE,
            last_activity: self.last_activity(),
        }
    }
}

/// Status snapshot of one agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentStatus {
    /// Agent name.
    pub name: String,
    /// Agent kind.
    pub kind: AgentKind,
    /// Messages processed.
    pub message_count: u64,
    /// Failed messages.
    pub error_count: u64,
    /// Failure ratio.
    pub error_rate: f64,
    /// `error_rate < 0.1`.
    pub is_healthy: bool,
    /// Last activity time.
    pub last_activity: Option<DateTime<Utc>>,
}
