//! Session monitor: polls a session log and injects messages

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::analyzer::EventAnalyzer;
use super::state::{MonitorConfig, MonitorError, MonitorExit, MonitorSnapshot};
use crate::session::model::{Content, SessionRef, AUTHOR_USER};
use crate::session::provider::{MessageSender, SessionStore};

/// Watches one session and injects follow-up messages into it
///
/// The polling loop runs as a background task between `start` and `stop`.
/// Only one monitor should be active per session; [`super::MonitorRegistry`]
/// enforces that for callers that share monitors.
pub struct SessionMonitor {
    session: SessionRef,
    store: Arc<dyn SessionStore>,
    sender: Arc<dyn MessageSender>,
    config: MonitorConfig,
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// State visible to both the handle and the polling task
#[derive(Default)]
struct Shared {
    running: AtomicBool,
    last_observed: AtomicUsize,
    injected: AtomicUsize,
    exit: Mutex<Option<MonitorExit>>,
}

impl Shared {
    fn set_exit(&self, reason: MonitorExit) {
        let mut exit = self.exit.lock().unwrap_or_else(|e| e.into_inner());
        exit.get_or_insert(reason);
    }

    fn exit(&self) -> Option<MonitorExit> {
        *self.exit.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// What a single poll found
enum Tick {
    Idle,
    Analyzed,
    Injected,
    SessionGone,
}

/// Everything the polling task needs, moved into it on start
struct PollLoop {
    session: SessionRef,
    store: Arc<dyn SessionStore>,
    sender: Arc<dyn MessageSender>,
    config: MonitorConfig,
    shared: Arc<Shared>,
    analyzer: Arc<dyn EventAnalyzer>,
}

impl SessionMonitor {
    pub fn new(
        session: SessionRef,
        store: Arc<dyn SessionStore>,
        sender: Arc<dyn MessageSender>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            session,
            store,
            sender,
            config,
            shared: Arc::new(Shared::default()),
            task: Mutex::new(None),
        }
    }

    pub fn session(&self) -> &SessionRef {
        &self.session
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn last_observed_event_count(&self) -> usize {
        self.shared.last_observed.load(Ordering::SeqCst)
    }

    pub fn injected_count(&self) -> usize {
        self.shared.injected.load(Ordering::SeqCst)
    }

    pub fn exit_reason(&self) -> Option<MonitorExit> {
        self.shared.exit()
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        MonitorSnapshot {
            session: self.session.clone(),
            running: self.is_running(),
            last_observed_event_count: self.last_observed_event_count(),
            injected_count: self.injected_count(),
            exit: self.exit_reason(),
        }
    }

    fn task(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Spawn the polling loop and return immediately
    ///
    /// Must be called from within a tokio runtime. A monitor whose loop ended
    /// because the session disappeared can be started again; the observed
    /// event count carries over.
    pub fn start(&self, analyzer: Arc<dyn EventAnalyzer>) -> Result<(), MonitorError> {
        let mut task = self.task();

        if self.shared.running.swap(true, Ordering::SeqCst) {
            return Err(MonitorError::AlreadyRunning(self.session.session_id.clone()));
        }
        *self.shared.exit.lock().unwrap_or_else(|e| e.into_inner()) = None;

        let poll = PollLoop {
            session: self.session.clone(),
            store: Arc::clone(&self.store),
            sender: Arc::clone(&self.sender),
            config: self.config,
            shared: Arc::clone(&self.shared),
            analyzer,
        };

        *task = Some(tokio::spawn(poll.run()));
        Ok(())
    }

    /// Cancel the polling loop and wait until it is gone
    ///
    /// No store reads or injections happen after this returns. Calling it on
    /// a monitor that is not running does nothing.
    pub async fn stop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);

        let Some(handle) = self.task().take() else {
            return;
        };

        handle.abort();
        match handle.await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {
                debug!("Monitor task for {} cancelled", self.session);
            }
            Err(e) => {
                warn!("Monitor task for {} panicked: {}", self.session, e);
            }
        }

        self.shared.set_exit(MonitorExit::Stopped);
        info!("Stopped monitoring session {}", self.session);
    }
}

impl PollLoop {
    async fn run(self) {
        info!(
            "Monitoring session {} every {:?}",
            self.session, self.config.poll_interval()
        );

        while self.shared.running.load(Ordering::SeqCst) {
            match self.tick().await {
                Ok(Tick::SessionGone) => {
                    info!("Session {} no longer exists, monitor exiting", self.session);
                    self.shared.set_exit(MonitorExit::SessionGone);
                    break;
                }
                Ok(Tick::Idle) | Ok(Tick::Analyzed) | Ok(Tick::Injected) => {}
                Err(e) => {
                    error!("Monitor error for session {}: {:#}", self.session, e);
                }
            }

            tokio::time::sleep(self.config.poll_interval()).await;
        }

        self.shared.running.store(false, Ordering::SeqCst);
    }

    async fn tick(&self) -> Result<Tick> {
        let s = &self.session;
        let Some(session) = self
            .store
            .get_session(&s.app_name, &s.user_id, &s.session_id)
            .await?
        else {
            return Ok(Tick::SessionGone);
        };

        let observed = session.events.len();
        let seen = self.shared.last_observed.load(Ordering::SeqCst);
        if observed <= seen {
            if observed < seen {
                debug!(
                    "Store returned {} events for {}, already saw {}",
                    observed, s, seen
                );
            }
            return Ok(Tick::Idle);
        }

        // Advance before analysis so a nested append is never delivered twice.
        self.shared.last_observed.store(observed, Ordering::SeqCst);
        let new_events = &session.events[seen..];
        debug!("{} new events in session {}", new_events.len(), s);

        let analysis = self.analyzer.analyze(new_events, &session);
        let message = match self.config.callback_timeout() {
            Some(limit) => tokio::time::timeout(limit, analysis)
                .await
                .map_err(|_| anyhow::anyhow!("Analyzer timed out after {:?}", limit))??,
            None => analysis.await?,
        };

        match message.filter(|m| !m.is_empty()) {
            Some(message) => {
                self.inject(message).await?;
                Ok(Tick::Injected)
            }
            None => Ok(Tick::Analyzed),
        }
    }

    async fn inject(&self, message: String) -> Result<()> {
        info!("Monitor wants to inject: {}", message);

        let content = Content::text(AUTHOR_USER, message);
        let mut stream = self
            .sender
            .stream_query(&self.session.user_id, &self.session.session_id, content)
            .await?;

        // The injected turn is only recorded once the stream has been drained.
        let mut chunks = 0usize;
        while let Some(chunk) = stream.next().await {
            chunk?;
            chunks += 1;
        }

        self.shared.injected.fetch_add(1, Ordering::SeqCst);
        info!(
            "Monitor injected message into session {} ({} chunks)",
            self.session, chunks
        );
        Ok(())
    }
}
