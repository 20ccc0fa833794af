//! In-process session store

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::model::{now_epoch_secs, Event, Session, SessionRef};
use super::provider::SessionStore;

/// Session store kept in memory, used for local runs and tests
#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<SessionRef, Session>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append several events in a single write
    ///
    /// Readers see either none or all of them.
    pub async fn append_events(&self, session: &Session, events: Vec<Event>) -> Result<()> {
        let key = session.session_ref();
        let mut sessions = self.sessions.write().await;
        let stored = sessions
            .get_mut(&key)
            .ok_or_else(|| anyhow::anyhow!("Session not found: {}", key))?;

        for event in events {
            for (k, v) in &event.actions.state_delta {
                stored.state.insert(k.clone(), v.clone());
            }
            stored.last_update_time = event.timestamp;
            stored.events.push(event);
        }

        debug!("Session {} now has {} events", key, stored.events.len());
        Ok(())
    }

    /// Number of sessions currently held
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<Option<Session>> {
        let key = SessionRef::new(app_name, user_id, session_id);
        Ok(self.sessions.read().await.get(&key).cloned())
    }

    async fn append_event(&self, session: &Session, event: Event) -> Result<()> {
        self.append_events(session, vec![event]).await
    }

    async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        state: HashMap<String, Value>,
    ) -> Result<Session> {
        let session = Session {
            id: Uuid::new_v4().to_string(),
            app_name: app_name.to_string(),
            user_id: user_id.to_string(),
            state,
            events: Vec::new(),
            last_update_time: now_epoch_secs(),
        };

        self.sessions
            .write()
            .await
            .insert(session.session_ref(), session.clone());

        debug!("Created in-memory session: {}", session.id);
        Ok(session)
    }

    async fn delete_session(&self, app_name: &str, user_id: &str, session_id: &str) -> Result<()> {
        let key = SessionRef::new(app_name, user_id, session_id);
        self.sessions.write().await.remove(&key);
        Ok(())
    }
}
