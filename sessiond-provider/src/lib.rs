//! Provider facade (C6, spec.md §4.5): translates the host web framework's
//! per-request session-state operations into calls against the lock
//! protocol (C4) and session store API (C5) from `sessiond-core`.
//!
//! A facade instance is cheap to construct and clone (it is a name plus an
//! `Arc` to a shared backend); the host framework may build one per
//! request, or keep one around, without caring which — every facade built
//! for the same provider name shares one backend (spec.md §9: "named
//! singleton registry keyed by provider name").

mod registry;
mod release_queue;

use std::sync::Arc;

use sessiond_common::{validate_session_id, Result, StoreConfig, Timestamp};
use sessiond_core::{Clock, DocumentStore, LockManager, SessionApi, SessionValue, StashedResource};

use release_queue::ReleaseQueue;

/// Outcome of requesting shared (non-exclusive) access to a session
/// (spec.md §4.5 "Get (shared)"). `stashed`, when present, must be handed
/// back to [`ProviderFacade::extend_lifetime`] at request end — the facade
/// never stores it itself (spec.md §9: "no hidden map").
#[derive(Debug, Clone)]
pub struct SharedGet {
    pub value: Option<SessionValue>,
    pub is_new: bool,
    pub stashed: Option<StashedResource>,
}

/// Outcome of requesting exclusive access to a session (spec.md §4.5 "Get
/// (exclusive)").
#[derive(Debug, Clone)]
pub enum ExclusiveGet {
    /// The lock was acquired and the session exists. `lock_id` is the
    /// credential that must be passed back to
    /// [`ProviderFacade::release_exclusive`] or
    /// [`ProviderFacade::set_and_release_exclusive`].
    Found { lock_id: String, value: SessionValue, is_new: bool },
    /// The lock was acquired but no content record exists; the lock was
    /// released immediately (spec.md §4.5: "if null, release and return
    /// null") and there is nothing for the caller to hold.
    NotFound,
    /// The session is already held exclusively by another request. Carries
    /// the observed holder's lock date so the caller can report contention
    /// age (spec.md §4.3 "returns `taken=false` with ... creation date").
    Contended { lock_date: Timestamp },
}

/// Translates the host framework's session-state protocol to `sessiond-core`
/// calls for one named provider. Construct via [`ProviderFacade::new`]; all
/// facades built with the same `provider_name` share one backend.
#[derive(Clone)]
pub struct ProviderFacade {
    provider_name: String,
    backend: Arc<ProviderBackend>,
}

struct ProviderBackend {
    session_api: SessionApi,
    lock_manager: Arc<LockManager>,
    release_queue: ReleaseQueue,
}

impl ProviderBackend {
    fn build(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>, config: &StoreConfig) -> Arc<Self> {
        let lock_manager = Arc::new(LockManager::new(store.clone(), clock.clone(), config.x_lock_ttl_seconds));
        let session_api =
            SessionApi::new(store, clock, config.consistency_level, config.compression_enabled);
        let release_queue = ReleaseQueue::spawn(lock_manager.clone());
        Arc::new(Self { session_api, lock_manager, release_queue })
    }
}

impl ProviderFacade {
    /// Build (or attach to) the backend registered under `provider_name`.
    /// `config` is validated on every call, but only the *first* caller for
    /// a given name actually constructs the backend (spec.md §5: "the
    /// backend's constructor is guaranteed to run exactly once per key").
    pub fn new(
        provider_name: impl Into<String>,
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        config: StoreConfig,
    ) -> Result<Self> {
        config.validate()?;
        let provider_name = provider_name.into();
        let backend = registry::backend_for(&provider_name, || ProviderBackend::build(store, clock, &config));
        Ok(Self { provider_name, backend })
    }

    /// The provider name this facade was constructed with.
    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }

    /// Create uninitialized item (spec.md §4.5): a session touched for the
    /// first time but not yet populated by the application.
    pub async fn create_uninitialized(&self, session_id: &str, timeout_minutes: i32) -> Result<()> {
        validate_session_id(session_id)?;
        let value = SessionValue::empty(timeout_minutes);
        self.backend.session_api.write_contents(session_id, &value, true).await.map(|_| ())
    }

    /// Get (shared): no lock is taken. The caller is responsible for
    /// scheduling [`Self::extend_lifetime`] at request end with the
    /// returned `stashed` resource, per the dampening rule (spec.md §4.4).
    pub async fn get_shared(&self, session_id: &str) -> Result<SharedGet> {
        validate_session_id(session_id)?;
        let read = self.backend.session_api.get_session(session_id).await?;
        Ok(SharedGet { value: read.value, is_new: read.is_new, stashed: read.stashed })
    }

    /// Apply the sliding-expiration dampening rule against a resource
    /// previously returned by [`Self::get_shared`]. Safe to call from a
    /// different point in the request lifecycle than the read that produced
    /// `stashed` (spec.md §4.4 "Ownership of the extension work").
    pub async fn extend_lifetime(&self, session_id: &str, stashed: &StashedResource) {
        self.backend.session_api.extend_lifetime(session_id, stashed).await;
    }

    /// Get (exclusive) (spec.md §4.5): acquire the lock; on contention,
    /// return immediately without blocking. A lock acquired over an
    /// otherwise-absent session is released before returning, since there
    /// is nothing for the caller to hold exclusively.
    pub async fn get_exclusive(&self, session_id: &str) -> Result<ExclusiveGet> {
        validate_session_id(session_id)?;

        let acquired = self.backend.lock_manager.acquire(session_id).await?;
        if !acquired.taken {
            return Ok(ExclusiveGet::Contended { lock_date: acquired.lock_date });
        }

        let read = self.backend.session_api.get_session(session_id).await?;
        match read.value {
            Some(value) => Ok(ExclusiveGet::Found { lock_id: acquired.etag, value, is_new: read.is_new }),
            None => {
                self.backend.lock_manager.release(session_id, &acquired.etag).await;
                Ok(ExclusiveGet::NotFound)
            }
        }
    }

    /// Release exclusive (spec.md §4.5): fire-and-forget via the bounded
    /// background queue (spec.md §9) so the request-end path never blocks
    /// on this best-effort cleanup.
    pub fn release_exclusive(&self, session_id: &str, lock_id: &str) {
        self.backend.release_queue.enqueue(session_id.to_string(), lock_id.to_string());
    }

    /// Set and release exclusive (spec.md §4.5): write the session, then
    /// release the lock in a "finally" — the release is scheduled even if
    /// the write fails. `is_new` suppresses the release, mirroring the host
    /// framework's own behavior of never exclusively locking a session it
    /// is creating for the first time.
    pub async fn set_and_release_exclusive(
        &self,
        session_id: &str,
        value: &SessionValue,
        lock_id: &str,
        is_new: bool,
    ) -> Result<()> {
        validate_session_id(session_id)?;
        let write_result = self.backend.session_api.write_contents(session_id, value, false).await;
        if !is_new {
            self.backend.release_queue.enqueue(session_id.to_string(), lock_id.to_string());
        }
        write_result.map(|_| ())
    }

    /// Remove (spec.md §4.5): delete content and lock records. Never fails
    /// the caller; not-found on either record is tolerated by
    /// [`SessionApi::remove`].
    pub async fn remove(&self, session_id: &str) -> Result<()> {
        validate_session_id(session_id)?;
        self.backend.session_api.remove(session_id).await;
        Ok(())
    }

    /// Reset timeout (spec.md §4.5): a no-op. The dampening rule already
    /// extends the session's lifetime on read, so there is nothing
    /// additional to do here.
    pub fn reset_timeout(&self, _session_id: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use sessiond_core::{InMemoryDocumentStore, SystemClock};

    fn facade(provider_name: &str) -> ProviderFacade {
        let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new(Arc::new(SystemClock)));
        ProviderFacade::new(
            provider_name,
            store,
            Arc::new(SystemClock),
            StoreConfig::new("AccountEndpoint=https://x;AccountKey=y", "sessions-db"),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn fresh_session_scenario() {
        let facade = facade("p1");

        let before = facade.get_shared("s1").await.unwrap();
        assert!(before.value.is_none());

        facade.create_uninitialized("s1", 20).await.unwrap();

        let after = facade.get_shared("s1").await.unwrap();
        assert!(after.is_new);
        assert_eq!(after.value.unwrap().timeout_minutes, 20);
    }

    #[tokio::test]
    async fn exclusive_then_contended_then_release_then_reacquire() {
        let facade = facade("p2");
        facade.create_uninitialized("s2", 20).await.unwrap();

        let first = facade.get_exclusive("s2").await.unwrap();
        let lock_id = match first {
            ExclusiveGet::Found { lock_id, .. } => lock_id,
            other => panic!("expected Found, got {other:?}"),
        };

        let second = facade.get_exclusive("s2").await.unwrap();
        assert!(matches!(second, ExclusiveGet::Contended { .. }));

        facade.release_exclusive("s2", &lock_id);
        // The release is fire-and-forget; give the background task a turn.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let third = facade.get_exclusive("s2").await.unwrap();
        assert!(matches!(third, ExclusiveGet::Found { .. }));
    }

    #[tokio::test]
    async fn exclusive_get_on_absent_session_releases_and_returns_not_found() {
        let facade = facade("p3");

        let result = facade.get_exclusive("ghost").await.unwrap();
        assert!(matches!(result, ExclusiveGet::NotFound));

        // The lock must have been released, not left dangling.
        let reacquire = facade.get_exclusive("ghost").await.unwrap();
        assert!(matches!(reacquire, ExclusiveGet::NotFound));
    }

    #[tokio::test]
    async fn set_and_release_exclusive_writes_then_releases() {
        let facade = facade("p4");
        facade.create_uninitialized("s4", 20).await.unwrap();

        let acquired = facade.get_exclusive("s4").await.unwrap();
        let lock_id = match acquired {
            ExclusiveGet::Found { lock_id, .. } => lock_id,
            other => panic!("expected Found, got {other:?}"),
        };

        let mut items = sessiond_core::Dictionary::new();
        items.insert("k", vec![1, 2, 3]);
        let value = SessionValue { timeout_minutes: 20, session_items: Some(items), static_objects: None };

        facade.set_and_release_exclusive("s4", &value, &lock_id, false).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let read = facade.get_shared("s4").await.unwrap();
        assert_eq!(read.value.unwrap().session_items.unwrap().0, vec![("k".to_string(), vec![1, 2, 3])]);

        let reacquired = facade.get_exclusive("s4").await.unwrap();
        assert!(matches!(reacquired, ExclusiveGet::Found { .. }), "lock must have been released");
    }

    #[tokio::test]
    async fn remove_semantics() {
        let facade = facade("p5");
        facade.create_uninitialized("s5", 20).await.unwrap();
        facade.remove("s5").await.unwrap();

        let after = facade.get_shared("s5").await.unwrap();
        assert!(after.value.is_none());

        facade.remove("s5").await.unwrap(); // idempotent
    }

    #[tokio::test]
    async fn session_id_validation_rejects_empty_and_oversized() {
        let facade = facade("p6");
        assert!(facade.get_shared("").await.is_err());

        let oversized = "a".repeat(sessiond_common::MAX_SESSION_ID_LEN + 1);
        assert!(facade.get_shared(&oversized).await.is_err());
    }

    #[tokio::test]
    async fn named_registry_shares_one_backend_per_name() {
        let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new(Arc::new(SystemClock)));
        let config = StoreConfig::new("conn", "db");

        let first =
            ProviderFacade::new("shared-name", store.clone(), Arc::new(SystemClock), config.clone()).unwrap();
        // A second facade for the same name, built against a *different*
        // store, must still observe the first backend's data — proving the
        // registry ignored the second store and returned the cached one.
        let other_store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new(Arc::new(SystemClock)));
        let second = ProviderFacade::new("shared-name", other_store, Arc::new(SystemClock), config).unwrap();

        first.create_uninitialized("s1", 20).await.unwrap();
        let seen_by_second = second.get_shared("s1").await.unwrap();
        assert!(seen_by_second.value.is_some(), "facades sharing a provider name must share one backend");
    }

    #[tokio::test]
    async fn different_provider_names_get_independent_backends() {
        let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new(Arc::new(SystemClock)));
        let config = StoreConfig::new("conn", "db");

        let a = ProviderFacade::new("distinct-a", store.clone(), Arc::new(SystemClock), config.clone()).unwrap();
        let b = ProviderFacade::new("distinct-b", store, Arc::new(SystemClock), config).unwrap();

        a.create_uninitialized("only-in-a", 20).await.unwrap();
        let seen_by_b = b.get_shared("only-in-a").await.unwrap();
        assert!(seen_by_b.value.is_none(), "distinct provider names must not share state");
    }
}
