//! Event analysis hook

use anyhow::Result;
use async_trait::async_trait;

use crate::session::model::{Event, Session, AUTHOR_TOOL};

/// Decides whether a batch of newly observed events warrants an injection
///
/// Returning `Ok(Some(message))` makes the monitor send `message` into the
/// session. Errors are logged by the monitor and do not stop it.
#[async_trait]
pub trait EventAnalyzer: Send + Sync {
    async fn analyze(&self, new_events: &[Event], session: &Session) -> Result<Option<String>>;
}

#[async_trait]
impl<F> EventAnalyzer for F
where
    F: Fn(&[Event], &Session) -> Result<Option<String>> + Send + Sync,
{
    async fn analyze(&self, new_events: &[Event], session: &Session) -> Result<Option<String>> {
        (self)(new_events, session)
    }
}

/// Echoes the first tool-authored text in a batch back into the conversation
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolEventEcho;

#[async_trait]
impl EventAnalyzer for ToolEventEcho {
    async fn analyze(&self, new_events: &[Event], _session: &Session) -> Result<Option<String>> {
        Ok(new_events
            .iter()
            .filter(|e| e.is_from(AUTHOR_TOOL))
            .find_map(Event::text)
            .map(|text| format!("monitor callback: {}", text)))
    }
}
