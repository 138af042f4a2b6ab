//! The abstraction the lock protocol (C4) and session store API (C5) are
//! built against: a document store supporting per-document conditional
//! writes, a single server-side conflict-arbitration script, and TTL
//! expiration — the properties spec.md §1 requires of "Azure Cosmos DB or
//! any comparable NoSQL store".
//!
//! Two implementations ship in this crate: [`crate::memory::InMemoryDocumentStore`]
//! (used by every test in this workspace and by callers who don't need
//! Cosmos specifically) and [`crate::cosmos::CosmosDocumentStore`] (the
//! production backend, feature-gated behind `cosmos`).

use async_trait::async_trait;
use sessiond_common::{ConsistencyLevel, Result, Timestamp};

use crate::schema::{ContentRecord, LockRecord};

/// Outcome of running the `tryLock_<hash>` stored procedure (spec.md §4.3
/// phase 2): the script's own check-then-insert, run as a serializable
/// transaction in the session's partition.
#[derive(Debug, Clone, PartialEq)]
pub struct LockScriptResult {
    pub locked: bool,
    pub etag: String,
    pub created_date: Timestamp,
}

/// Abstraction over the document database. Every method is one network
/// round-trip (spec.md §5: "every call is an independent network
/// round-trip") — implementations must not hide retries that belong to the
/// lock protocol (C4) inside here; only store-level transient errors
/// (rate-limiting, the store client's own retry budget) belong here.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Phase 1 optimistic insert (spec.md §4.3): create the lock record.
    /// Returns [`sessiond_common::SessionStoreError::Conflict`] if a lock
    /// record with this id already exists.
    async fn try_create_lock(&self, record: LockRecord) -> Result<LockRecord>;

    /// Point-read the lock record, or `None` if absent or expired.
    async fn read_lock(&self, id: &str) -> Result<Option<LockRecord>>;

    /// Delete the lock record with `If-Match = etag`. Not-found and
    /// etag-mismatch are reported distinctly so the caller can apply
    /// spec.md §4.3's "logged and ignored" / "leaves the lock intact"
    /// policies without a second round trip.
    async fn delete_lock(&self, id: &str, etag: &str) -> Result<()>;

    /// Phase 2 (spec.md §4.3): execute the conflict-arbitration script in
    /// the session's partition. The script itself never returns a
    /// `Conflict` — retryable statuses are reported as
    /// [`sessiond_common::SessionStoreError::Conflict`] so the lock
    /// protocol's retry loop can distinguish them from a successful,
    /// already-held-by-someone-else outcome (`locked: false`).
    async fn execute_lock_script(
        &self,
        lock_id: &str,
        now: Timestamp,
        lock_ttl_seconds: u64,
    ) -> Result<LockScriptResult>;

    /// Point-read the content record, or `None` if absent or expired.
    async fn read_content(&self, id: &str, consistency: ConsistencyLevel) -> Result<Option<ContentRecord>>;

    /// Upsert the content record (spec.md §4.4 write path).
    /// `EnableContentResponseOnWrite=false` in the real Cosmos client —
    /// this trait mirrors that by returning only the new `_etag`.
    async fn upsert_content(&self, record: ContentRecord) -> Result<String>;

    /// Conditional replace used by the sliding-expiration dampening rule
    /// (spec.md §4.4): fails with `NotFound` or a conflict if `etag` no
    /// longer matches the stored document.
    async fn replace_content_if_match(
        &self,
        record: ContentRecord,
        etag: &str,
        consistency: ConsistencyLevel,
    ) -> Result<String>;

    /// Delete the content record. Not-found is tolerated by the caller.
    async fn delete_content(&self, id: &str) -> Result<()>;
}
