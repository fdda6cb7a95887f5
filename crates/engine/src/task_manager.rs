//! Task Manager (spec §4.5) — at most one background task per name, with
//! await/cancel. Grounded on the teacher's `voice_session.rs` use of
//! `tokio::spawn` + a `shutdown_tx` broadcast for task lifecycle, adapted
//! here to a named-handle map instead of a single shutdown signal, since
//! `START` and `COMMIT` are cancelled independently (spec §5
//! "Cancellation").
//!
//! Cancellation is advisory: `tokio::task::JoinHandle::abort` only takes
//! effect at the task's next `.await` point, so a cancelled task may still
//! complete a side effect it had already committed to.

use std::collections::HashMap;
use std::hash::Hash;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

/// A live background task handle, keyed by name.
pub struct TaskHandle {
    join: JoinHandle<()>,
}

impl TaskHandle {
    pub fn abort(&self) {
        self.join.abort();
    }
}

/// Named handle-to-at-most-one-task map (spec §4.5). `K` is the small task
/// name enum (`callbridge_core::TaskName` for the dialog engine).
pub struct TaskManager<K: Eq + Hash + Copy> {
    tasks: Mutex<HashMap<K, TaskHandle>>,
}

impl<K: Eq + Hash + Copy> Default for TaskManager<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Copy> TaskManager<K> {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Spawn `fut` and store it under `name`, overwriting any prior handle
    /// without cancelling it first — the caller is responsible for popping
    /// a live handle before creating a new one under the same name.
    pub fn create<F>(&self, name: K, fut: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let handle = TaskHandle {
            join: tokio::spawn(fut),
        };
        if self.tasks.lock().insert(name, handle).is_some() {
            tracing::warn!("task manager overwrote a live handle without an explicit pop");
        }
    }

    /// If present, remove then await completion. Returns `false` if no task
    /// was registered under `name`.
    pub async fn await_and_delete(&self, name: K) -> bool {
        let handle = self.tasks.lock().remove(&name);
        match handle {
            Some(handle) => {
                let _ = handle.join.await;
                true
            }
            None => false,
        }
    }

    /// If present, remove then request cancellation (does not await it).
    pub fn cancel_and_delete(&self, name: K) -> bool {
        match self.tasks.lock().remove(&name) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, name: K) -> bool {
        self.tasks.lock().contains_key(&name)
    }

    pub fn pop(&self, name: K) -> Option<TaskHandle> {
        self.tasks.lock().remove(&name)
    }

    /// Snapshot, clear, then cancel each — no ordering across names.
    pub fn cancel_all(&self) {
        let snapshot: Vec<TaskHandle> = self.tasks.lock().drain().map(|(_, h)| h).collect();
        for handle in snapshot {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Name {
        Start,
        Commit,
    }

    #[tokio::test]
    async fn await_and_delete_runs_task_to_completion() {
        let manager: TaskManager<Name> = TaskManager::new();
        let ran = Arc::new(AtomicUsize::new(0));
        let ran_clone = ran.clone();
        manager.create(Name::Start, async move {
            ran_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert!(manager.contains(Name::Start));
        assert!(manager.await_and_delete(Name::Start).await);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert!(!manager.contains(Name::Start));
        assert!(!manager.await_and_delete(Name::Start).await);
    }

    #[tokio::test]
    async fn cancel_all_clears_every_name() {
        let manager: TaskManager<Name> = TaskManager::new();
        manager.create(Name::Start, async { tokio::time::sleep(std::time::Duration::from_secs(60)).await });
        manager.create(Name::Commit, async { tokio::time::sleep(std::time::Duration::from_secs(60)).await });
        manager.cancel_all();
        assert!(!manager.contains(Name::Start));
        assert!(!manager.contains(Name::Commit));
    }

    #[tokio::test]
    async fn pop_removes_without_cancelling() {
        let manager: TaskManager<Name> = TaskManager::new();
        let ran = Arc::new(AtomicUsize::new(0));
        let ran_clone = ran.clone();
        manager.create(Name::Commit, async move {
            ran_clone.fetch_add(1, Ordering::SeqCst);
        });
        let handle = manager.pop(Name::Commit).unwrap();
        let _ = handle.join.await;
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }
}
