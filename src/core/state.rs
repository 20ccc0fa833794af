//! Application state

use std::sync::Arc;

use anyhow::Result;

use super::supervisor::TaskSupervisor;
use crate::agent::{definition::AGENT_NAME, ArticClient, Toolbox};
use crate::config::Config;
use crate::monitor::{MonitorRegistry, SessionMonitor, ToolEventEcho};
use crate::session::{
    AgentEngineClient, InMemorySessionStore, LocalEngine, MessageSender, SessionRef,
    SessionStore,
};

/// Process-wide wiring: backends, the monitor registry and the task supervisor
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn SessionStore>,
    pub sender: Arc<dyn MessageSender>,
    pub registry: Arc<MonitorRegistry>,
    pub supervisor: Arc<TaskSupervisor>,
    pub toolbox: Toolbox,
}

impl AppState {
    /// State backed by the deployed agent engine
    pub fn remote(config: Config) -> Result<Self> {
        let client: Arc<AgentEngineClient> = Arc::new(config.engine_client()?);
        let store: Arc<dyn SessionStore> = client.clone();
        let sender: Arc<dyn MessageSender> = client;
        Self::with_backends(config, store, sender)
    }

    /// State backed by an in-memory store and local engine
    pub fn local(config: Config) -> Result<Self> {
        let memory = InMemorySessionStore::new();
        let sender: Arc<dyn MessageSender> = Arc::new(LocalEngine::new(
            memory.clone(),
            config.app_name.clone(),
            AGENT_NAME,
        ));
        let store: Arc<dyn SessionStore> = Arc::new(memory);
        Self::with_backends(config, store, sender)
    }

    pub fn with_backends(
        config: Config,
        store: Arc<dyn SessionStore>,
        sender: Arc<dyn MessageSender>,
    ) -> Result<Self> {
        let registry = Arc::new(MonitorRegistry::new());
        let supervisor = Arc::new(TaskSupervisor::new());

        let toolbox = Toolbox::new(
            Arc::clone(&store),
            Arc::clone(&sender),
            Arc::clone(&registry),
            Arc::clone(&supervisor),
            Arc::new(ArticClient::new(config.artwork.base_url.clone())?),
            Arc::new(ToolEventEcho),
            config.artwork_tool_settings()?,
        );

        Ok(Self {
            config,
            store,
            sender,
            registry,
            supervisor,
            toolbox,
        })
    }

    pub fn session_ref(&self, user_id: &str, session_id: &str) -> SessionRef {
        SessionRef::new(&self.config.app_name, user_id, session_id)
    }

    /// Start (or reuse) the echo monitor for a session
    pub fn watch(&self, session: &SessionRef) -> Result<bool> {
        let monitor_config = self.config.monitor.to_monitor_config()?;
        let started = self.registry.ensure_started(
            &session.session_id,
            || {
                SessionMonitor::new(
                    session.clone(),
                    Arc::clone(&self.store),
                    Arc::clone(&self.sender),
                    monitor_config,
                )
            },
            Arc::new(ToolEventEcho),
        )?;
        Ok(started)
    }

    /// Cancel background work and stop all monitors
    pub async fn shutdown(&self) {
        self.supervisor.shutdown().await;
        self.registry.stop_all().await;
    }
}
