//! Session store and message sender traits

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

use super::model::{Content, Event, Session};

/// Pull-style access to a session log hosted somewhere else
///
/// Implementations may be remote, slow and eventually consistent. Reads must be
/// side-effect free.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch the current materialized session, `None` if it no longer exists
    async fn get_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<Option<Session>>;

    /// Durably record an event on a session
    async fn append_event(&self, session: &Session, event: Event) -> Result<()>;

    /// Create a new session with an initial state
    async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        state: HashMap<String, Value>,
    ) -> Result<Session>;

    /// Delete a session
    async fn delete_session(&self, app_name: &str, user_id: &str, session_id: &str) -> Result<()>;
}

/// A lazy, finite stream of chunks produced by a streamed send
pub type ChunkStream = BoxStream<'static, Result<Value>>;

/// Sends a message into a hosted session as a streamed query
///
/// The returned stream has to be consumed to the end for the message to be
/// recorded and broadcast to live viewers.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn stream_query(
        &self,
        user_id: &str,
        session_id: &str,
        message: Content,
    ) -> Result<ChunkStream>;
}
