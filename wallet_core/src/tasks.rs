//! Per-entry tracking of background fetch tasks.

use std::future::Future;
use std::sync::{Mutex, MutexGuard};

use tokio::task::JoinHandle;

use crate::tree::EntryId;

struct Tracked {
    entry: EntryId,
    handle: JoinHandle<()>,
}

/// Spawns fetch tasks on the current runtime and remembers which entry each
/// one works for, so removal can abort them and tests can wait for quiescence.
#[derive(Default)]
pub(crate) struct TaskTracker {
    tasks: Mutex<Vec<Tracked>>,
}

impl TaskTracker {
    fn lock(&self) -> MutexGuard<'_, Vec<Tracked>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn spawn<F>(&self, entry: EntryId, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(fut);
        let mut tasks = self.lock();
        tasks.retain(|t| !t.handle.is_finished());
        tasks.push(Tracked { entry, handle });
    }

    /// Abort every task working for `entry`. Returns how many were running.
    pub fn cancel_entry(&self, entry: EntryId) -> usize {
        let mut tasks = self.lock();
        let mut cancelled = 0;
        tasks.retain(|t| {
            if t.entry != entry {
                return true;
            }
            if !t.handle.is_finished() {
                t.handle.abort();
                cancelled += 1;
            }
            false
        });
        cancelled
    }

    pub fn in_flight(&self, entry: EntryId) -> usize {
        self.lock()
            .iter()
            .filter(|t| t.entry == entry && !t.handle.is_finished())
            .count()
    }

    /// Wait until no tracked task is running, including tasks spawned by
    /// tasks that were awaited.
    pub async fn settle(&self) {
        loop {
            let batch: Vec<Tracked> = self.lock().drain(..).collect();
            if batch.is_empty() {
                return;
            }
            for task in batch {
                if let Err(e) = task.handle.await {
                    if !e.is_cancelled() {
                        tracing::warn!(error = %e, "wallet task panicked");
                    }
                }
            }
        }
    }
}
