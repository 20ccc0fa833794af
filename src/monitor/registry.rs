//! Registry of active monitors keyed by session id

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use super::analyzer::EventAnalyzer;
use super::monitor::SessionMonitor;
use super::state::{MonitorError, MonitorExit, MonitorSnapshot};

/// Caller-owned map of session id -> running monitor
///
/// Monitors leave the map when stopped through it or once their session is
/// gone. Create one per process (see [`crate::core::AppState`]) and hand it
/// to every component that may start monitors.
#[derive(Default)]
pub struct MonitorRegistry {
    monitors: Mutex<HashMap<String, Arc<SessionMonitor>>>,
}

impl MonitorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the map, clearing out monitors whose session has disappeared
    fn monitors(&self) -> MutexGuard<'_, HashMap<String, Arc<SessionMonitor>>> {
        let mut monitors = self.monitors.lock().unwrap_or_else(|e| e.into_inner());
        monitors.retain(|session_id, monitor| {
            let gone = monitor.exit_reason() == Some(MonitorExit::SessionGone);
            if gone {
                debug!("Dropping monitor for vanished session {}", session_id);
            }
            !gone
        });
        monitors
    }

    /// Start a monitor for `session_id` unless one is already running
    ///
    /// The lookup, the start and the insert happen under one lock, so two
    /// concurrent callers can never both start a monitor for the same
    /// session. An entry whose loop has been stopped is replaced. Returns
    /// `true` when a new monitor was started.
    pub fn ensure_started<F>(
        &self,
        session_id: &str,
        create: F,
        analyzer: Arc<dyn EventAnalyzer>,
    ) -> Result<bool, MonitorError>
    where
        F: FnOnce() -> SessionMonitor,
    {
        let mut monitors = self.monitors();

        if let Some(existing) = monitors.get(session_id) {
            if existing.is_running() {
                debug!("Monitor already active for session {}", session_id);
                return Ok(false);
            }
            debug!("Replacing finished monitor for session {}", session_id);
        }

        let monitor = Arc::new(create());
        monitor.start(analyzer)?;
        monitors.insert(session_id.to_string(), monitor);

        info!("Registered monitor for session {}", session_id);
        Ok(true)
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<SessionMonitor>> {
        self.monitors().get(session_id).cloned()
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.monitors().contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.monitors().len()
    }

    pub fn is_empty(&self) -> bool {
        self.monitors().is_empty()
    }

    pub fn snapshots(&self) -> Vec<MonitorSnapshot> {
        self.monitors().values().map(|m| m.snapshot()).collect()
    }

    /// Stop the monitor for `session_id` and drop it from the registry
    pub async fn stop(&self, session_id: &str) -> Result<MonitorSnapshot, MonitorError> {
        let monitor = self
            .monitors()
            .remove(session_id)
            .ok_or_else(|| MonitorError::NotRegistered(session_id.to_string()))?;

        monitor.stop().await;
        Ok(monitor.snapshot())
    }

    /// Stop every registered monitor
    pub async fn stop_all(&self) -> Vec<MonitorSnapshot> {
        let drained: Vec<Arc<SessionMonitor>> =
            self.monitors().drain().map(|(_, m)| m).collect();

        let mut snapshots = Vec::with_capacity(drained.len());
        for monitor in drained {
            monitor.stop().await;
            snapshots.push(monitor.snapshot());
        }
        snapshots
    }
}
