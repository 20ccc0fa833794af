//! Local stand-in for the hosted agent engine

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;

use super::memory::InMemorySessionStore;
use super::model::{Content, Event, AUTHOR_MODEL, AUTHOR_USER};
use super::provider::{ChunkStream, MessageSender, SessionStore};

/// Streams a message into an [`InMemorySessionStore`]
///
/// Each yielded chunk is an event that was appended while the stream was
/// polled: the incoming user turn first, then a short model acknowledgement.
/// Nothing is recorded until the stream is consumed.
pub struct LocalEngine {
    store: InMemorySessionStore,
    app_name: String,
    agent_name: String,
}

impl LocalEngine {
    pub fn new(
        store: InMemorySessionStore,
        app_name: impl Into<String>,
        agent_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            app_name: app_name.into(),
            agent_name: agent_name.into(),
        }
    }
}

#[async_trait]
impl MessageSender for LocalEngine {
    async fn stream_query(
        &self,
        user_id: &str,
        session_id: &str,
        message: Content,
    ) -> Result<ChunkStream> {
        let session = self
            .store
            .get_session(&self.app_name, user_id, session_id)
            .await?
            .with_context(|| format!("Session not found: {}", session_id))?;

        let text: String = message
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();

        let user_turn = Event::new(AUTHOR_USER).with_content(message);
        let mut reply = Event::new(&self.agent_name)
            .with_text(AUTHOR_MODEL, format!("Acknowledged: {}", text));
        reply.invocation_id = user_turn.invocation_id.clone();

        let store = self.store.clone();
        let steps = vec![user_turn, reply].into_iter();

        let stream = futures::stream::unfold(
            (store, session, steps),
            |(store, session, mut steps)| async move {
                let event = steps.next()?;
                let chunk = match store.append_event(&session, event.clone()).await {
                    Ok(()) => serde_json::to_value(&event).context("Failed to encode event"),
                    Err(e) => Err(e),
                };
                Some((chunk, (store, session, steps)))
            },
        );

        Ok(stream.boxed())
    }
}
