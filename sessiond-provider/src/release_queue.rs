//! Fire-and-forget lock release (spec.md §4.3, §9): the request-end path
//! must not block on a best-effort cleanup. A bounded queue with
//! drop-oldest semantics backs a single supervising task per backend —
//! never an unbounded detached task per release.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use sessiond_core::LockManager;

/// Maximum number of pending releases held at once. Past this, the oldest
/// pending release is dropped in favor of the new one — it will still
/// self-heal via the lock's own TTL (spec.md §4.3).
const CAPACITY: usize = 256;

pub(crate) struct ReleaseQueue {
    pending: Arc<Mutex<VecDeque<(String, String)>>>,
    notify: Arc<Notify>,
}

impl ReleaseQueue {
    /// Spawn the single background task that drains this queue against
    /// `lock_manager`, and return a handle for enqueuing work onto it.
    pub(crate) fn spawn(lock_manager: Arc<LockManager>) -> Self {
        let pending: Arc<Mutex<VecDeque<(String, String)>>> = Arc::new(Mutex::new(VecDeque::new()));
        let notify = Arc::new(Notify::new());

        tokio::spawn({
            let pending = pending.clone();
            let notify = notify.clone();
            async move {
                loop {
                    notify.notified().await;
                    loop {
                        let next = pending.lock().unwrap().pop_front();
                        match next {
                            Some((session_id, etag)) => lock_manager.release(&session_id, &etag).await,
                            None => break,
                        }
                    }
                }
            }
        });

        Self { pending, notify }
    }

    /// Enqueue a release for the background task to perform. Never blocks
    /// and never fails — consistent with spec.md §4.3's "never fails the
    /// caller".
    pub(crate) fn enqueue(&self, session_id: String, etag: String) {
        let mut guard = self.pending.lock().unwrap();
        if guard.len() >= CAPACITY {
            guard.pop_front();
            tracing::warn!("release queue at capacity, dropping oldest pending release");
        }
        guard.push_back((session_id, etag));
        drop(guard);
        self.notify.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sessiond_core::{Clock, InMemoryDocumentStore, SystemClock};

    #[tokio::test]
    async fn enqueued_release_eventually_runs() {
        let store = Arc::new(InMemoryDocumentStore::new(Arc::new(SystemClock) as Arc<dyn Clock>));
        let lock_manager =
            Arc::new(LockManager::new(store.clone(), Arc::new(SystemClock), 30));

        let acquired = lock_manager.acquire("s1").await.unwrap();
        assert!(acquired.taken);

        let queue = ReleaseQueue::spawn(lock_manager.clone());
        queue.enqueue("s1".to_string(), acquired.etag.clone());

        // Poll for the lock to clear instead of a fixed sleep, keeping this
        // deterministic under load.
        for _ in 0..100 {
            let retry = lock_manager.acquire("s1").await.unwrap();
            if retry.taken {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        panic!("release was never processed by the background task");
    }

    #[tokio::test]
    async fn capacity_overflow_drops_oldest_without_panicking() {
        let store = Arc::new(InMemoryDocumentStore::new(Arc::new(SystemClock) as Arc<dyn Clock>));
        let lock_manager = Arc::new(LockManager::new(store, Arc::new(SystemClock), 30));
        let queue = ReleaseQueue::spawn(lock_manager);

        for i in 0..(CAPACITY + 10) {
            queue.enqueue(format!("s{i}"), "\"whatever\"".to_string());
        }
        // Must not panic or deadlock; give the drainer a moment to run.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
}
