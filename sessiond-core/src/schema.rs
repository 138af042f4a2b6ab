//! Document schema (C2, spec.md §3): the two record kinds sharing the
//! `SessionStore` container, keyed by `id` and partitioned on `/id`.

use sessiond_common::{lock_id, Timestamp};
use serde::{Deserialize, Serialize};

/// A session's persisted blob plus its metadata. `Payload` is `None` for an
/// uninitialized session created but not yet written (`IsNew = "yes"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub id: String,
    pub ttl: i64,
    #[serde(rename = "_etag", skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(rename = "CreatedDate")]
    pub created_date: Timestamp,
    #[serde(rename = "Payload")]
    pub payload: Option<Vec<u8>>,
    #[serde(rename = "Compressed")]
    pub compressed: bool,
    #[serde(rename = "IsNew", skip_serializing_if = "Option::is_none")]
    pub is_new: Option<String>,
}

impl ContentRecord {
    pub fn new(session_id: &str, ttl_seconds: i64, created_date: Timestamp) -> Self {
        Self {
            id: session_id.to_string(),
            ttl: ttl_seconds,
            etag: None,
            created_date,
            payload: None,
            compressed: false,
            is_new: None,
        }
    }

    /// `true` when `IsNew` carries the sentinel value `"yes"` (spec.md §3).
    pub fn is_new(&self) -> bool {
        self.is_new.as_deref() == Some("yes")
    }
}

/// A presence-only document whose existence encodes "session is held
/// exclusive" (spec.md GLOSSARY). Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockRecord {
    pub id: String,
    pub ttl: i64,
    #[serde(rename = "_etag", skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(rename = "CreatedDate")]
    pub created_date: Timestamp,
}

impl LockRecord {
    /// Build the lock record for `session_id` per spec.md §3:
    /// `id = "${sessionId}_lock"`, `ttl = lockTtlSeconds`.
    pub fn new(session_id: &str, lock_ttl_seconds: u64, created_date: Timestamp) -> Self {
        Self { id: lock_id(session_id), ttl: lock_ttl_seconds as i64, etag: None, created_date }
    }
}
