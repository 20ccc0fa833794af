//! Tools callable by the agent

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{info, warn};

use super::artwork::ArtworkSource;
use crate::core::TaskSupervisor;
use crate::monitor::{EventAnalyzer, MonitorConfig, MonitorRegistry, SessionMonitor};
use crate::session::model::{Event, SessionRef, AUTHOR_MODEL, AUTHOR_TOOL};
use crate::session::provider::{MessageSender, SessionStore};

/// State key written by the artwork lookup
pub const ARTWORK_TITLE_KEY: &str = "artwork_title";
pub const ARTWORK_ERROR_KEY: &str = "artwork_error";

/// Transfers the user to a live agent
pub fn live_agent_transfer() -> String {
    "Live agent transfer".to_string()
}

/// Returns the current date and time in YYYY-MM-DD HH:MM:SS format
pub fn date_time_tool() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Settings for the long-running artwork lookup
#[derive(Debug, Clone, Copy)]
pub struct ArtworkToolSettings {
    pub artwork_id: u64,
    /// Simulated processing time before the lookup
    pub delay: Duration,
    pub monitor: MonitorConfig,
}

impl Default for ArtworkToolSettings {
    fn default() -> Self {
        Self {
            artwork_id: 27992,
            delay: Duration::from_secs(5),
            monitor: MonitorConfig::default(),
        }
    }
}

/// Dispatches tool calls for one agent
pub struct Toolbox {
    store: Arc<dyn SessionStore>,
    sender: Arc<dyn MessageSender>,
    registry: Arc<MonitorRegistry>,
    supervisor: Arc<TaskSupervisor>,
    artworks: Arc<dyn ArtworkSource>,
    analyzer: Arc<dyn EventAnalyzer>,
    settings: ArtworkToolSettings,
}

impl Toolbox {
    pub fn new(
        store: Arc<dyn SessionStore>,
        sender: Arc<dyn MessageSender>,
        registry: Arc<MonitorRegistry>,
        supervisor: Arc<TaskSupervisor>,
        artworks: Arc<dyn ArtworkSource>,
        analyzer: Arc<dyn EventAnalyzer>,
        settings: ArtworkToolSettings,
    ) -> Self {
        Self {
            store,
            sender,
            registry,
            supervisor,
            artworks,
            analyzer,
            settings,
        }
    }

    /// Invoke a tool by name for the given session
    pub fn call(&self, name: &str, session: &SessionRef) -> Result<String> {
        match name {
            "live_agent_transfer" => Ok(live_agent_transfer()),
            "date_time_tool" => Ok(date_time_tool()),
            "fetch_artwork_title" => self.fetch_artwork_title(session),
            _ => anyhow::bail!("Unknown tool: {}", name),
        }
    }

    /// Long-running tool: acknowledge now, post the title to the session later
    ///
    /// Makes sure the session has a monitor so the result is echoed back to
    /// the conversation once it lands.
    pub fn fetch_artwork_title(&self, session: &SessionRef) -> Result<String> {
        let started = self
            .registry
            .ensure_started(
                &session.session_id,
                || {
                    SessionMonitor::new(
                        session.clone(),
                        Arc::clone(&self.store),
                        Arc::clone(&self.sender),
                        self.settings.monitor,
                    )
                },
                Arc::clone(&self.analyzer),
            )
            .context("Failed to start session monitor")?;
        if started {
            info!("Started monitor for session {}", session);
        }

        let artwork_id = self.settings.artwork_id;
        self.supervisor.spawn(
            format!("artwork-{}-{}", artwork_id, session.session_id),
            record_artwork_title(
                Arc::clone(&self.store),
                Arc::clone(&self.artworks),
                session.clone(),
                artwork_id,
                self.settings.delay,
            ),
        );

        Ok(format!(
            "Looking up artwork {}. The title will be posted here shortly.",
            artwork_id
        ))
    }
}

/// The slow half of `fetch_artwork_title`
///
/// A failed lookup is still reported to the session so the user is not left
/// waiting.
pub async fn record_artwork_title(
    store: Arc<dyn SessionStore>,
    artworks: Arc<dyn ArtworkSource>,
    session: SessionRef,
    artwork_id: u64,
    delay: Duration,
) -> Result<()> {
    tokio::time::sleep(delay).await;

    let event = match artworks.artwork_title(artwork_id).await {
        Ok(title) => Event::new(AUTHOR_TOOL)
            .with_text(
                AUTHOR_MODEL,
                format!("Artwork {} is titled \"{}\"", artwork_id, title),
            )
            .with_state_delta(ARTWORK_TITLE_KEY, json!(title)),
        Err(e) => {
            warn!("Artwork lookup {} failed: {:#}", artwork_id, e);
            Event::new(AUTHOR_TOOL)
                .with_text(
                    AUTHOR_MODEL,
                    format!("Could not fetch artwork {}", artwork_id),
                )
                .with_state_delta(ARTWORK_ERROR_KEY, json!(format!("{:#}", e)))
        }
    };

    let current = store
        .get_session(&session.app_name, &session.user_id, &session.session_id)
        .await?
        .with_context(|| format!("Session not found: {}", session))?;

    store.append_event(&current, event).await?;
    info!("Recorded artwork {} result on session {}", artwork_id, session);
    Ok(())
}
