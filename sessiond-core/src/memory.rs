//! In-memory [`DocumentStore`] used by every test in this workspace, and by
//! callers who want the lock protocol and session store API without a real
//! Cosmos account. Mirrors the teacher's `DbState`/`Entry`/`AppState`
//! structure: one `RwLock`-guarded map per record kind plus a monotonic
//! version counter standing in for the store's `_etag` assignment.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use sessiond_common::{ConsistencyLevel, Result, SessionStoreError, Timestamp};
use tokio::sync::RwLock;
use tokio::time::timeout;

use crate::clock::Clock;
use crate::config::GUARD_TIMEOUT;
use crate::schema::{ContentRecord, LockRecord};
use crate::store::{DocumentStore, LockScriptResult};

fn etag_value(version: u64) -> String {
    format!("\"{version}\"")
}

fn is_expired(created_date: Timestamp, ttl_seconds: i64, now: Timestamp) -> bool {
    now >= created_date + ChronoDuration::seconds(ttl_seconds)
}

fn guard_timeout_error() -> SessionStoreError {
    SessionStoreError::Store { status: 503, message: "lock acquisition timed out".to_string() }
}

struct State {
    content: HashMap<String, ContentRecord>,
    locks: HashMap<String, LockRecord>,
    next_version: u64,
}

/// In-memory stand-in for the document database.
pub struct InMemoryDocumentStore {
    clock: Arc<dyn Clock>,
    state: RwLock<State>,
}

impl InMemoryDocumentStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: RwLock::new(State { content: HashMap::new(), locks: HashMap::new(), next_version: 0 }),
        }
    }

    async fn write_guard(&self) -> Result<tokio::sync::RwLockWriteGuard<'_, State>> {
        timeout(GUARD_TIMEOUT, self.state.write()).await.map_err(|_| guard_timeout_error())
    }

    async fn read_guard(&self) -> Result<tokio::sync::RwLockReadGuard<'_, State>> {
        timeout(GUARD_TIMEOUT, self.state.read()).await.map_err(|_| guard_timeout_error())
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn try_create_lock(&self, record: LockRecord) -> Result<LockRecord> {
        let now = self.clock.now();
        let mut guard = self.write_guard().await?;

        if let Some(existing) = guard.locks.get(&record.id) {
            if !is_expired(existing.created_date, existing.ttl, now) {
                return Err(SessionStoreError::Conflict(format!("lock already held: {}", record.id)));
            }
        }

        guard.next_version += 1;
        let mut stored = record;
        stored.etag = Some(etag_value(guard.next_version));
        guard.locks.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn read_lock(&self, id: &str) -> Result<Option<LockRecord>> {
        let now = self.clock.now();
        let guard = self.read_guard().await?;
        Ok(guard
            .locks
            .get(id)
            .filter(|l| !is_expired(l.created_date, l.ttl, now))
            .cloned())
    }

    async fn delete_lock(&self, id: &str, etag: &str) -> Result<()> {
        let now = self.clock.now();
        let mut guard = self.write_guard().await?;

        match guard.locks.get(id) {
            None => Err(SessionStoreError::NotFound(id.to_string())),
            Some(existing) if is_expired(existing.created_date, existing.ttl, now) => {
                guard.locks.remove(id);
                Err(SessionStoreError::NotFound(id.to_string()))
            }
            Some(existing) if existing.etag.as_deref() != Some(etag) => {
                Err(SessionStoreError::Conflict(format!("etag mismatch releasing lock: {id}")))
            }
            Some(_) => {
                guard.locks.remove(id);
                Ok(())
            }
        }
    }

    async fn execute_lock_script(
        &self,
        lock_id: &str,
        now: Timestamp,
        lock_ttl_seconds: u64,
    ) -> Result<LockScriptResult> {
        // Runs as a single serializable transaction in the partition
        // (spec.md §4.3 phase 2): check absence, then insert, atomically.
        let mut guard = self.write_guard().await?;

        if let Some(existing) = guard.locks.get(lock_id) {
            if !is_expired(existing.created_date, existing.ttl, now) {
                return Ok(LockScriptResult {
                    locked: false,
                    etag: existing.etag.clone().unwrap_or_default(),
                    created_date: existing.created_date,
                });
            }
        }

        guard.next_version += 1;
        let etag = etag_value(guard.next_version);
        let record = LockRecord {
            id: lock_id.to_string(),
            ttl: lock_ttl_seconds as i64,
            etag: Some(etag.clone()),
            created_date: now,
        };
        guard.locks.insert(lock_id.to_string(), record);
        Ok(LockScriptResult { locked: true, etag, created_date: now })
    }

    async fn read_content(&self, id: &str, _consistency: ConsistencyLevel) -> Result<Option<ContentRecord>> {
        let now = self.clock.now();
        let guard = self.read_guard().await?;
        Ok(guard
            .content
            .get(id)
            .filter(|c| !is_expired(c.created_date, c.ttl, now))
            .cloned())
    }

    async fn upsert_content(&self, record: ContentRecord) -> Result<String> {
        let mut guard = self.write_guard().await?;
        guard.next_version += 1;
        let etag = etag_value(guard.next_version);
        let mut stored = record;
        stored.etag = Some(etag.clone());
        guard.content.insert(stored.id.clone(), stored);
        Ok(etag)
    }

    async fn replace_content_if_match(
        &self,
        record: ContentRecord,
        etag: &str,
        _consistency: ConsistencyLevel,
    ) -> Result<String> {
        let now = self.clock.now();
        let mut guard = self.write_guard().await?;

        match guard.content.get(&record.id) {
            None => Err(SessionStoreError::NotFound(record.id.clone())),
            Some(existing) if is_expired(existing.created_date, existing.ttl, now) => {
                guard.content.remove(&record.id);
                Err(SessionStoreError::NotFound(record.id.clone()))
            }
            Some(existing) if existing.etag.as_deref() != Some(etag) => {
                Err(SessionStoreError::Conflict(format!("etag mismatch replacing content: {}", record.id)))
            }
            Some(_) => {
                guard.next_version += 1;
                let new_etag = etag_value(guard.next_version);
                let mut stored = record;
                stored.etag = Some(new_etag.clone());
                guard.content.insert(stored.id.clone(), stored);
                Ok(new_etag)
            }
        }
    }

    async fn delete_content(&self, id: &str) -> Result<()> {
        let mut guard = self.write_guard().await?;
        match guard.content.remove(id) {
            Some(_) => Ok(()),
            None => Err(SessionStoreError::NotFound(id.to_string())),
        }
    }
}
