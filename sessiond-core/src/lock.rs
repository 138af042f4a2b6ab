//! Lock protocol (C4, spec.md §4.3): two-phase acquisition, ETag-conditional
//! release, TTL-based self-heal.
//!
//! Phase 1 is an optimistic insert — cheap in the uncontested case. Phase 2
//! only runs when Phase 1 finds the lock already held, and pays for the
//! script round-trip plus up to three randomized retries on the store's
//! retryable statuses. The caller never blocks past that: a fourth attempt
//! runs without further retry and its outcome, win or lose, is returned as
//! final.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use sessiond_common::{lock_id, Result, SessionStoreError, Timestamp, LOCK_SCRIPT_BACKOFF_MAX_MS, LOCK_SCRIPT_BACKOFF_MIN_MS, LOCK_SCRIPT_MAX_RETRIES};

use crate::clock::Clock;
use crate::schema::LockRecord;
use crate::store::DocumentStore;

/// Result of [`LockManager::acquire`]. When `taken` is `false`, `etag` and
/// `lock_date` describe the *existing* holder, per spec.md §4.3 ("returns
/// `taken=false` with the current holder's `_etag` and creation date").
#[derive(Debug, Clone, PartialEq)]
pub struct AcquireResult {
    pub taken: bool,
    pub lock_date: Timestamp,
    pub etag: String,
}

pub struct LockManager {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    lock_ttl_seconds: u64,
}

impl LockManager {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>, lock_ttl_seconds: u64) -> Self {
        Self { store, clock, lock_ttl_seconds }
    }

    /// Never blocks on a contended lock (spec.md §4.3): a contended session
    /// returns `taken=false` immediately rather than waiting.
    pub async fn acquire(&self, session_id: &str) -> Result<AcquireResult> {
        let now = self.clock.now();
        let record = LockRecord::new(session_id, self.lock_ttl_seconds, now);

        match self.store.try_create_lock(record).await {
            Ok(created) => {
                tracing::debug!(session_id, "lock acquired via phase 1 optimistic insert");
                return Ok(AcquireResult {
                    taken: true,
                    lock_date: now,
                    etag: created.etag.unwrap_or_default(),
                });
            }
            Err(SessionStoreError::Conflict(_)) => {
                // Phase 1 found the lock held; fall through to the script.
            }
            Err(other) => return Err(other),
        }

        self.acquire_via_script(session_id).await
    }

    async fn acquire_via_script(&self, session_id: &str) -> Result<AcquireResult> {
        let id = lock_id(session_id);
        let mut attempt = 0u32;

        loop {
            let now = self.clock.now();
            match self.store.execute_lock_script(&id, now, self.lock_ttl_seconds).await {
                Ok(result) => {
                    tracing::debug!(session_id, attempt, locked = result.locked, "phase 2 script completed");
                    return Ok(AcquireResult {
                        taken: result.locked,
                        lock_date: result.created_date,
                        etag: result.etag,
                    });
                }
                Err(SessionStoreError::Conflict(_)) if attempt < LOCK_SCRIPT_MAX_RETRIES => {
                    attempt += 1;
                    tokio::time::sleep(jittered_backoff()).await;
                }
                Err(other) => return Err(other),
            }
        }
    }

    /// Best-effort; never fails the caller (spec.md §4.3). Not-found is
    /// expected when the lock self-healed via TTL; any other error is
    /// logged and swallowed, relying on TTL self-heal.
    pub async fn release(&self, session_id: &str, etag: &str) {
        let id = lock_id(session_id);
        match self.store.delete_lock(&id, etag).await {
            Ok(()) => {}
            Err(SessionStoreError::NotFound(_)) => {
                tracing::warn!(session_id, "release: lock already gone (self-healed via TTL)");
            }
            Err(SessionStoreError::Conflict(_)) => {
                tracing::warn!(session_id, "release: etag mismatch, lock left intact");
            }
            Err(other) => {
                tracing::error!(session_id, error = %other, "release: store error, relying on TTL self-heal");
            }
        }
    }
}

fn jittered_backoff() -> Duration {
    let ms = rand::thread_rng().gen_range(LOCK_SCRIPT_BACKOFF_MIN_MS..=LOCK_SCRIPT_BACKOFF_MAX_MS);
    Duration::from_millis(ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::memory::InMemoryDocumentStore;
    use async_trait::async_trait;
    use sessiond_common::ConsistencyLevel;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn manager() -> (LockManager, Arc<InMemoryDocumentStore>) {
        let store = Arc::new(InMemoryDocumentStore::new(Arc::new(SystemClock)));
        let manager = LockManager::new(store.clone(), Arc::new(SystemClock), 30);
        (manager, store)
    }

    #[tokio::test]
    async fn lock_then_write_scenario() {
        let (manager, _store) = manager();

        let first = manager.acquire("s2").await.unwrap();
        assert!(first.taken);

        let second = manager.acquire("s2").await.unwrap();
        assert!(!second.taken, "concurrent acquire must observe the lock as held");

        manager.release("s2", &first.etag).await;

        let third = manager.acquire("s2").await.unwrap();
        assert!(third.taken);
        assert_ne!(third.etag, first.etag, "re-acquisition must produce a fresh etag");
    }

    #[tokio::test]
    async fn wrong_lock_id_on_release_is_silent() {
        let (manager, _store) = manager();
        let first = manager.acquire("s3").await.unwrap();

        manager.release("s3", "\"bogus\"").await; // must not panic, must not remove the lock

        let second = manager.acquire("s3").await.unwrap();
        assert!(!second.taken, "lock must remain held after a mismatched release");
        assert_eq!(second.etag, first.etag);
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let (manager, _store) = manager();
        let first = manager.acquire("s4").await.unwrap();

        manager.release("s4", &first.etag).await;
        manager.release("s4", &first.etag).await; // second call: silent no-op, never panics

        let reacquired = manager.acquire("s4").await.unwrap();
        assert!(reacquired.taken);
    }

    #[tokio::test]
    async fn n_concurrent_acquirers_exactly_one_succeeds() {
        let (manager, _store) = manager();
        let manager = Arc::new(manager);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let m = manager.clone();
            handles.push(tokio::spawn(async move { m.acquire("shared").await.unwrap().taken }));
        }

        let mut taken_count = 0;
        for h in handles {
            if h.await.unwrap() {
                taken_count += 1;
            }
        }
        assert_eq!(taken_count, 1, "exactly one concurrent acquirer must win");
    }

    /// A store whose `execute_lock_script` fails with a retryable conflict
    /// `fail_times` times before delegating to a real in-memory store.
    struct FlakyScriptStore {
        inner: InMemoryDocumentStore,
        fail_times: AtomicU32,
        attempts_seen: Mutex<u32>,
    }

    #[async_trait]
    impl DocumentStore for FlakyScriptStore {
        async fn try_create_lock(&self, record: LockRecord) -> Result<LockRecord> {
            self.inner.try_create_lock(record).await
        }
        async fn read_lock(&self, id: &str) -> Result<Option<LockRecord>> {
            self.inner.read_lock(id).await
        }
        async fn delete_lock(&self, id: &str, etag: &str) -> Result<()> {
            self.inner.delete_lock(id, etag).await
        }
        async fn execute_lock_script(
            &self,
            lock_id: &str,
            now: Timestamp,
            lock_ttl_seconds: u64,
        ) -> Result<crate::store::LockScriptResult> {
            *self.attempts_seen.lock().unwrap() += 1;
            if self.fail_times.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1)).is_ok() {
                return Err(SessionStoreError::Conflict("simulated retryable conflict".into()));
            }
            self.inner.execute_lock_script(lock_id, now, lock_ttl_seconds).await
        }
        async fn read_content(
            &self,
            id: &str,
            consistency: ConsistencyLevel,
        ) -> Result<Option<crate::schema::ContentRecord>> {
            self.inner.read_content(id, consistency).await
        }
        async fn upsert_content(&self, record: crate::schema::ContentRecord) -> Result<String> {
            self.inner.upsert_content(record).await
        }
        async fn replace_content_if_match(
            &self,
            record: crate::schema::ContentRecord,
            etag: &str,
            consistency: ConsistencyLevel,
        ) -> Result<String> {
            self.inner.replace_content_if_match(record, etag, consistency).await
        }
        async fn delete_content(&self, id: &str) -> Result<()> {
            self.inner.delete_content(id).await
        }
    }

    #[tokio::test]
    async fn phase2_retries_transient_conflicts_within_budget() {
        // Force phase 1 to see the lock already held so we exercise phase 2.
        let inner = InMemoryDocumentStore::new(Arc::new(SystemClock));
        inner.try_create_lock(LockRecord::new("retry-me", 30, chrono::Utc::now())).await.unwrap();
        // Delete it immediately so phase 2's own check-then-insert succeeds
        // once the flakiness budget is exhausted; we're only testing that
        // retries happen, not the phase 1 fallthrough itself.
        let store = Arc::new(FlakyScriptStore {
            inner,
            fail_times: AtomicU32::new(2),
            attempts_seen: Mutex::new(0),
        });
        // Remove the phase-1 seed lock so execute_lock_script (phase 2) sees
        // absence once the simulated conflicts are exhausted.
        let _ = store.inner.delete_lock("retry-me_lock", "nonexistent").await;

        let manager = LockManager::new(store.clone(), Arc::new(SystemClock), 30);
        let result = manager.acquire_via_script("retry-me").await.unwrap();

        assert!(result.taken);
        assert_eq!(*store.attempts_seen.lock().unwrap(), 3, "2 failures + 1 success = 3 attempts");
    }

    #[tokio::test]
    async fn exhausting_all_retries_surfaces_the_final_conflict() {
        let inner = InMemoryDocumentStore::new(Arc::new(SystemClock));
        let store = Arc::new(FlakyScriptStore {
            inner,
            fail_times: AtomicU32::new(100), // always fails
            attempts_seen: Mutex::new(0),
        });

        let manager = LockManager::new(store.clone(), Arc::new(SystemClock), 30);
        let result = manager.acquire_via_script("always-fails").await;

        assert!(matches!(result, Err(SessionStoreError::Conflict(_))));
        // 1 initial attempt + 3 retries = 4 total.
        assert_eq!(*store.attempts_seen.lock().unwrap(), 4);
    }
}
