// Tests for the session monitor polling loop

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::time::sleep;

use common::*;
use livedesk::monitor::{
    EventAnalyzer, MonitorConfig, MonitorError, MonitorExit, SessionMonitor, ToolEventEcho,
};
use livedesk::session::model::AUTHOR_USER;
use livedesk::session::{Event, InMemorySessionStore, LocalEngine, Session, SessionStore};

#[tokio::test(start_paused = true)]
async fn test_tool_event_is_echoed_into_session() {
    let (store, sender, session) = setup().await;
    let monitor = monitor_for(&store, &sender, &session, every_second());
    monitor.start(Arc::new(ToolEventEcho)).unwrap();

    sleep(Duration::from_millis(1200)).await;
    store.append_event(&session, tool_event("hello")).await.unwrap();
    sleep(Duration::from_secs(3)).await;

    assert_eq!(sender.messages(), vec!["monitor callback: hello".to_string()]);
    assert_eq!(monitor.last_observed_event_count(), 1);
    assert_eq!(monitor.injected_count(), 1);
    // The injection stream was consumed to the end.
    assert_eq!(sender.drained(), 3);

    monitor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_single_write_is_one_batch() {
    let (store, sender, session) = setup().await;
    let batches = Arc::new(Mutex::new(Vec::<Vec<String>>::new()));
    let seen = Arc::clone(&batches);

    let monitor = monitor_for(&store, &sender, &session, every_second());
    monitor
        .start(analyzer(move |events, _session| {
            seen.lock()
                .unwrap()
                .push(events.iter().map(|e| e.id.clone()).collect());
            Ok(None)
        }))
        .unwrap();

    sleep(Duration::from_millis(1500)).await;
    let first = tool_event("one");
    let second = tool_event("two");
    store
        .inner
        .append_events(&session, vec![first.clone(), second.clone()])
        .await
        .unwrap();
    sleep(Duration::from_secs(2)).await;

    assert_eq!(
        *batches.lock().unwrap(),
        vec![vec![first.id.clone(), second.id.clone()]]
    );
    assert_eq!(monitor.last_observed_event_count(), 2);

    monitor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_every_event_delivered_exactly_once() {
    let (store, sender, session) = setup().await;
    let delivered = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = Arc::clone(&delivered);

    let monitor = monitor_for(&store, &sender, &session, every_second());
    monitor
        .start(analyzer(move |events, _session| {
            sink.lock()
                .unwrap()
                .extend(events.iter().map(|e| e.id.clone()));
            Ok(None)
        }))
        .unwrap();

    let mut appended = Vec::new();
    for round in 0..5 {
        let batch: Vec<Event> = (0..=round).map(|i| tool_event(&format!("{}-{}", round, i))).collect();
        appended.extend(batch.iter().map(|e| e.id.clone()));
        store.inner.append_events(&session, batch).await.unwrap();
        sleep(Duration::from_millis(700 * (round as u64 + 1))).await;
    }
    sleep(Duration::from_secs(2)).await;

    assert_eq!(*delivered.lock().unwrap(), appended);
    assert_eq!(monitor.last_observed_event_count(), appended.len());

    monitor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_session_gone_ends_loop_quietly() {
    let (store, sender, session) = setup().await;
    let monitor = monitor_for(&store, &sender, &session, every_second());
    monitor.start(Arc::new(ToolEventEcho)).unwrap();

    sleep(Duration::from_millis(500)).await;
    assert!(monitor.is_running());

    store
        .delete_session(&session.app_name, &session.user_id, &session.id)
        .await
        .unwrap();
    sleep(Duration::from_millis(1100)).await;

    assert!(!monitor.is_running());
    assert_eq!(monitor.exit_reason(), Some(MonitorExit::SessionGone));

    let reads = store.reads();
    sleep(Duration::from_secs(5)).await;
    assert_eq!(store.reads(), reads);

    // Stopping afterwards is harmless and keeps the original reason.
    monitor.stop().await;
    assert_eq!(monitor.exit_reason(), Some(MonitorExit::SessionGone));
}

#[tokio::test(start_paused = true)]
async fn test_unknown_session_exits_on_first_tick() {
    let store = Arc::new(CountingStore::default());
    let sender = Arc::new(RecordingSender::default());
    let monitor = SessionMonitor::new(
        livedesk::session::SessionRef::new(APP, USER, "missing"),
        store.clone(),
        sender.clone(),
        every_second(),
    );

    monitor.start(Arc::new(ToolEventEcho)).unwrap();
    sleep(Duration::from_millis(100)).await;

    assert!(!monitor.is_running());
    assert_eq!(monitor.exit_reason(), Some(MonitorExit::SessionGone));
    assert_eq!(store.reads(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_null_analyzer_never_injects() {
    let (store, sender, session) = setup().await;
    let monitor = monitor_for(&store, &sender, &session, every_second());
    monitor
        .start(analyzer(|_events, _session| Ok(None)))
        .unwrap();

    store.append_event(&session, tool_event("a")).await.unwrap();
    sleep(Duration::from_millis(1500)).await;
    assert_eq!(monitor.last_observed_event_count(), 1);

    store.append_event(&session, tool_event("b")).await.unwrap();
    store.append_event(&session, tool_event("c")).await.unwrap();
    sleep(Duration::from_secs(2)).await;
    assert_eq!(monitor.last_observed_event_count(), 3);

    assert!(sender.messages().is_empty());
    assert_eq!(sender.drained(), 0);
    assert_eq!(monitor.injected_count(), 0);

    monitor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_empty_message_is_not_injected() {
    let (store, sender, session) = setup().await;
    let monitor = monitor_for(&store, &sender, &session, every_second());
    monitor
        .start(analyzer(|_events, _session| Ok(Some(String::new()))))
        .unwrap();

    store.append_event(&session, tool_event("a")).await.unwrap();
    sleep(Duration::from_secs(2)).await;

    assert!(sender.messages().is_empty());
    monitor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_halts_reads_and_injections() {
    let (store, sender, session) = setup().await;
    let monitor = monitor_for(&store, &sender, &session, every_second());
    monitor.start(Arc::new(ToolEventEcho)).unwrap();

    sleep(Duration::from_millis(2500)).await;
    monitor.stop().await;

    assert!(!monitor.is_running());
    assert_eq!(monitor.exit_reason(), Some(MonitorExit::Stopped));

    let reads = store.reads();
    store.append_event(&session, tool_event("late")).await.unwrap();
    sleep(Duration::from_secs(10)).await;

    assert_eq!(store.reads(), reads);
    assert!(sender.messages().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_injection_halts_loop() {
    let (store, sender, session) = setup().await;
    sender.hang.store(true, Ordering::SeqCst);
    store.append_event(&session, tool_event("hello")).await.unwrap();

    let monitor = monitor_for(&store, &sender, &session, every_second());
    monitor.start(Arc::new(ToolEventEcho)).unwrap();
    sleep(Duration::from_secs(2)).await;

    // Stuck draining the injection stream of the first tick.
    assert!(monitor.is_running());
    assert_eq!(sender.messages().len(), 1);
    assert_eq!(sender.drained(), 1);
    let reads = store.reads();

    monitor.stop().await;
    assert!(!monitor.is_running());
    assert_eq!(monitor.exit_reason(), Some(MonitorExit::Stopped));

    store.append_event(&session, tool_event("late")).await.unwrap();
    sleep(Duration::from_secs(10)).await;

    assert_eq!(store.reads(), reads);
    assert_eq!(sender.messages().len(), 1);
    assert_eq!(monitor.injected_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_injection_does_not_stop_monitor() {
    let (store, sender, session) = setup().await;
    sender.fail_sends.store(1, Ordering::SeqCst);
    store.append_event(&session, tool_event("first")).await.unwrap();

    let monitor = monitor_for(&store, &sender, &session, every_second());
    monitor.start(Arc::new(ToolEventEcho)).unwrap();

    sleep(Duration::from_millis(1500)).await;
    assert!(monitor.is_running());
    assert_eq!(sender.messages().len(), 1);
    assert_eq!(monitor.injected_count(), 0);
    assert_eq!(monitor.last_observed_event_count(), 1);

    store.append_event(&session, tool_event("second")).await.unwrap();
    sleep(Duration::from_secs(2)).await;
    assert_eq!(monitor.injected_count(), 1);
    assert_eq!(
        sender.messages(),
        vec![
            "monitor callback: first".to_string(),
            "monitor callback: second".to_string(),
        ]
    );

    // A stream that breaks halfway is a failed injection too.
    sender.fail_chunks.store(1, Ordering::SeqCst);
    store.append_event(&session, tool_event("third")).await.unwrap();
    sleep(Duration::from_secs(1)).await;
    assert!(monitor.is_running());
    assert_eq!(monitor.injected_count(), 1);
    assert_eq!(sender.drained(), 3 + 2);

    store.append_event(&session, tool_event("fourth")).await.unwrap();
    sleep(Duration::from_secs(2)).await;
    assert_eq!(monitor.injected_count(), 2);
    assert_eq!(sender.messages().len(), 4);
    assert_eq!(sender.drained(), 3 + 2 + 3);

    monitor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_is_idempotent() {
    let (store, sender, session) = setup().await;
    let monitor = monitor_for(&store, &sender, &session, every_second());

    // Never started
    monitor.stop().await;
    assert_eq!(monitor.exit_reason(), None);

    monitor.start(Arc::new(ToolEventEcho)).unwrap();
    sleep(Duration::from_millis(1500)).await;

    monitor.stop().await;
    let reads = store.reads();
    monitor.stop().await;

    assert!(!monitor.is_running());
    assert_eq!(monitor.exit_reason(), Some(MonitorExit::Stopped));
    assert_eq!(store.reads(), reads);
}

#[tokio::test(start_paused = true)]
async fn test_start_twice_is_rejected() {
    let (store, sender, session) = setup().await;
    let monitor = monitor_for(&store, &sender, &session, every_second());

    monitor.start(Arc::new(ToolEventEcho)).unwrap();
    let second = monitor.start(Arc::new(ToolEventEcho));
    assert!(matches!(second, Err(MonitorError::AlreadyRunning(_))));

    monitor.stop().await;

    // A stopped monitor can be started again and keeps its position.
    store.append_event(&session, tool_event("x")).await.unwrap();
    monitor.start(Arc::new(ToolEventEcho)).unwrap();
    sleep(Duration::from_millis(100)).await;
    assert_eq!(monitor.last_observed_event_count(), 1);
    monitor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_transient_store_failures_are_retried() {
    let (store, sender, session) = setup().await;
    store.fail_next.store(3, Ordering::SeqCst);
    store.append_event(&session, tool_event("hello")).await.unwrap();

    let monitor = monitor_for(&store, &sender, &session, every_second());
    monitor.start(Arc::new(ToolEventEcho)).unwrap();

    sleep(Duration::from_millis(2500)).await;
    assert!(monitor.is_running());
    assert!(sender.messages().is_empty());

    sleep(Duration::from_secs(2)).await;
    assert_eq!(sender.messages(), vec!["monitor callback: hello".to_string()]);
    assert_eq!(monitor.injected_count(), 1);

    monitor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_analyzer_error_does_not_stop_monitor() {
    let (store, sender, session) = setup().await;
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let monitor = monitor_for(&store, &sender, &session, every_second());
    monitor
        .start(analyzer(move |events, _session| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                anyhow::bail!("analyzer blew up");
            }
            Ok(Some(format!("saw {}", events.len())))
        }))
        .unwrap();

    store.append_event(&session, tool_event("first")).await.unwrap();
    sleep(Duration::from_millis(1500)).await;
    assert!(monitor.is_running());
    assert_eq!(monitor.last_observed_event_count(), 1);

    store.append_event(&session, tool_event("second")).await.unwrap();
    sleep(Duration::from_secs(2)).await;

    // The failed batch is not delivered again.
    assert_eq!(sender.messages(), vec!["saw 1".to_string()]);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    monitor.stop().await;
}

/// Hangs on its first call, answers afterwards
#[derive(Default)]
struct HangsOnce {
    calls: AtomicUsize,
}

#[async_trait]
impl EventAnalyzer for HangsOnce {
    async fn analyze(&self, _new_events: &[Event], _session: &Session) -> Result<Option<String>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            std::future::pending::<()>().await;
        }
        Ok(Some("late".to_string()))
    }
}

#[tokio::test(start_paused = true)]
async fn test_analyzer_timeout_counts_as_failed_tick() {
    let (store, sender, session) = setup().await;
    store.append_event(&session, tool_event("first")).await.unwrap();

    let config = every_second().with_callback_timeout(Duration::from_millis(500));
    let monitor = monitor_for(&store, &sender, &session, config);
    monitor.start(Arc::new(HangsOnce::default())).unwrap();

    sleep(Duration::from_secs(2)).await;
    assert!(monitor.is_running());
    assert!(sender.messages().is_empty());

    store.append_event(&session, tool_event("second")).await.unwrap();
    sleep(Duration::from_secs(2)).await;

    assert_eq!(sender.messages(), vec!["late".to_string()]);
    monitor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_injected_turn_is_observed_but_not_echoed_again() {
    let store = InMemorySessionStore::new();
    let engine = Arc::new(LocalEngine::new(store.clone(), APP, "Reporter"));
    let session = store
        .create_session(APP, USER, Default::default())
        .await
        .unwrap();

    let monitor = SessionMonitor::new(
        session.session_ref(),
        Arc::new(store.clone()),
        engine,
        every_second(),
    );
    monitor.start(Arc::new(ToolEventEcho)).unwrap();

    store.append_event(&session, tool_event("hello")).await.unwrap();
    sleep(Duration::from_secs(4)).await;

    let current = store
        .get_session(APP, USER, &session.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(current.events.len(), 3);
    assert_eq!(current.events[1].author, AUTHOR_USER);
    assert_eq!(
        current.events[1].text().as_deref(),
        Some("monitor callback: hello")
    );
    assert_eq!(monitor.last_observed_event_count(), 3);
    assert_eq!(monitor.injected_count(), 1);

    monitor.stop().await;
}

#[test]
fn test_monitor_config_rejects_bad_intervals() {
    assert!(matches!(
        MonitorConfig::new(Duration::ZERO),
        Err(MonitorError::InvalidInterval(_))
    ));
    assert!(matches!(
        MonitorConfig::from_secs_f64(-1.0),
        Err(MonitorError::InvalidSeconds(_))
    ));
    assert!(matches!(
        MonitorConfig::from_secs_f64(f64::NAN),
        Err(MonitorError::InvalidSeconds(_))
    ));

    let config = MonitorConfig::from_secs_f64(0.25).unwrap();
    assert_eq!(config.poll_interval(), Duration::from_millis(250));
    assert_eq!(MonitorConfig::default().poll_interval(), Duration::from_secs(1));
    assert_eq!(config.callback_timeout(), None);
    assert_eq!(
        config
            .with_callback_timeout(Duration::from_secs(3))
            .callback_timeout(),
        Some(Duration::from_secs(3))
    );
}
