//! Tracking of background tasks that nobody awaits directly

use std::future::Future;
use std::sync::{Mutex, MutexGuard};

use anyhow::Result;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, warn};

/// Owns the handles of fire-and-forget work so it can be awaited or cancelled
#[derive(Default)]
pub struct TaskSupervisor {
    tasks: Mutex<JoinSet<()>>,
}

impl TaskSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    fn tasks(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Schedule `work` without waiting for it; failures are logged
    pub fn spawn<F>(&self, name: impl Into<String>, work: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let name = name.into();
        let mut tasks = self.tasks();

        while let Some(done) = tasks.try_join_next() {
            report(done);
        }

        debug!("Spawning background task {}", name);
        tasks.spawn(async move {
            if let Err(e) = work.await {
                error!("Background task {} failed: {:#}", name, e);
            }
        });
    }

    /// Number of tasks not yet reaped
    pub fn len(&self) -> usize {
        self.tasks().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks().is_empty()
    }

    /// Wait for every task spawned so far to finish
    pub async fn wait_all(&self) {
        let mut tasks = std::mem::take(&mut *self.tasks());
        while let Some(done) = tasks.join_next().await {
            report(done);
        }
    }

    /// Cancel every outstanding task and wait until they are gone
    pub async fn shutdown(&self) {
        let mut tasks = std::mem::take(&mut *self.tasks());
        if !tasks.is_empty() {
            debug!("Cancelling {} background tasks", tasks.len());
        }
        tasks.abort_all();
        while let Some(done) = tasks.join_next().await {
            report(done);
        }
    }
}

fn report(done: std::result::Result<(), JoinError>) {
    match done {
        Ok(()) => {}
        Err(e) if e.is_cancelled() => {}
        Err(e) => warn!("Background task panicked: {}", e),
    }
}
