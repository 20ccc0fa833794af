// Shared fixtures for integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};

use livedesk::monitor::{EventAnalyzer, MonitorConfig, SessionMonitor};
use livedesk::session::model::{AUTHOR_MODEL, AUTHOR_TOOL};
use livedesk::session::{
    ChunkStream, Content, Event, InMemorySessionStore, MessageSender, Session, SessionStore,
};

pub const APP: &str = "live-cx-agent";
pub const USER: &str = "cx_user";

/// In-memory store that counts reads and can be told to fail
#[derive(Default)]
pub struct CountingStore {
    pub inner: InMemorySessionStore,
    pub reads: AtomicUsize,
    pub fail_next: AtomicUsize,
}

impl CountingStore {
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionStore for CountingStore {
    async fn get_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<Option<Session>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            anyhow::bail!("store unavailable");
        }
        self.inner.get_session(app_name, user_id, session_id).await
    }

    async fn append_event(&self, session: &Session, event: Event) -> Result<()> {
        self.inner.append_event(session, event).await
    }

    async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        state: HashMap<String, Value>,
    ) -> Result<Session> {
        self.inner.create_session(app_name, user_id, state).await
    }

    async fn delete_session(&self, app_name: &str, user_id: &str, session_id: &str) -> Result<()> {
        self.inner.delete_session(app_name, user_id, session_id).await
    }
}

/// Sender that records injected messages and yields three chunks per send
///
/// `fail_sends` and `fail_chunks` make the next sends fail up front or on
/// their second chunk. With `hang` set the stream never ends after its first
/// chunk.
#[derive(Default)]
pub struct RecordingSender {
    pub messages: Mutex<Vec<String>>,
    pub drained: Arc<AtomicUsize>,
    pub fail_sends: AtomicUsize,
    pub fail_chunks: AtomicUsize,
    pub hang: AtomicBool,
}

impl RecordingSender {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn drained(&self) -> usize {
        self.drained.load(Ordering::SeqCst)
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn stream_query(
        &self,
        _user_id: &str,
        _session_id: &str,
        message: Content,
    ) -> Result<ChunkStream> {
        assert_eq!(message.role, "user");
        let text: String = message.parts.iter().filter_map(|p| p.text.clone()).collect();
        self.messages.lock().unwrap().push(text);

        if take_one(&self.fail_sends) {
            anyhow::bail!("engine unavailable");
        }

        let drained = Arc::clone(&self.drained);
        let fail_chunk = take_one(&self.fail_chunks);
        let chunks = futures::stream::iter(0..3).map(move |i| {
            drained.fetch_add(1, Ordering::SeqCst);
            if fail_chunk && i == 1 {
                anyhow::bail!("stream reset");
            }
            Ok::<_, anyhow::Error>(json!({ "chunk": i }))
        });

        if self.hang.load(Ordering::SeqCst) {
            return Ok(chunks.take(1).chain(futures::stream::pending()).boxed());
        }
        Ok(chunks.boxed())
    }
}

pub async fn setup() -> (Arc<CountingStore>, Arc<RecordingSender>, Session) {
    let store = Arc::new(CountingStore::default());
    let sender = Arc::new(RecordingSender::default());
    let session = store
        .create_session(APP, USER, HashMap::new())
        .await
        .unwrap();
    (store, sender, session)
}

pub fn monitor_for(
    store: &Arc<CountingStore>,
    sender: &Arc<RecordingSender>,
    session: &Session,
    config: MonitorConfig,
) -> SessionMonitor {
    SessionMonitor::new(session.session_ref(), store.clone(), sender.clone(), config)
}

pub fn every_second() -> MonitorConfig {
    MonitorConfig::new(Duration::from_secs(1)).unwrap()
}

pub fn tool_event(text: &str) -> Event {
    Event::new(AUTHOR_TOOL).with_text(AUTHOR_MODEL, text)
}

pub fn analyzer<F>(f: F) -> Arc<dyn EventAnalyzer>
where
    F: Fn(&[Event], &Session) -> Result<Option<String>> + Send + Sync + 'static,
{
    Arc::new(f)
}
