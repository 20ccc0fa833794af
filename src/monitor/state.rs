//! Monitor state definitions

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::session::model::SessionRef;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Timing knobs for one monitor
///
/// Only constructible through [`MonitorConfig::new`] and friends, so the poll
/// interval is always positive.
#[derive(Debug, Clone, Copy)]
pub struct MonitorConfig {
    /// Delay between two polls of the session store
    poll_interval: Duration,
    /// Upper bound on a single analyzer call, unbounded when `None`
    callback_timeout: Option<Duration>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            callback_timeout: None,
        }
    }
}

impl MonitorConfig {
    pub fn new(poll_interval: Duration) -> Result<Self, MonitorError> {
        if poll_interval.is_zero() {
            return Err(MonitorError::InvalidInterval(poll_interval));
        }
        Ok(Self {
            poll_interval,
            callback_timeout: None,
        })
    }

    pub fn from_secs_f64(secs: f64) -> Result<Self, MonitorError> {
        let interval =
            Duration::try_from_secs_f64(secs).map_err(|_| MonitorError::InvalidSeconds(secs))?;
        Self::new(interval)
    }

    pub fn with_callback_timeout(mut self, timeout: Duration) -> Self {
        self.callback_timeout = Some(timeout);
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn callback_timeout(&self) -> Option<Duration> {
        self.callback_timeout
    }
}

/// Why a polling loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorExit {
    /// `stop()` was called
    Stopped,
    /// The store no longer knows the session
    SessionGone,
}

/// Point-in-time view of a monitor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSnapshot {
    pub session: SessionRef,
    pub running: bool,
    pub last_observed_event_count: usize,
    pub injected_count: usize,
    pub exit: Option<MonitorExit>,
}

/// Errors returned by monitor and registry operations
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("Monitor already running for session: {0}")]
    AlreadyRunning(String),

    #[error("No monitor registered for session: {0}")]
    NotRegistered(String),

    #[error("Poll interval must be positive, got {0:?}")]
    InvalidInterval(Duration),

    #[error("Poll interval must be a positive number of seconds, got {0}")]
    InvalidSeconds(f64),
}
