//! Session store API (C5, spec.md §4.4): read/write/remove of content
//! records plus the sliding-expiration dampening rule.

use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use sessiond_common::{lock_id, ConsistencyLevel, Result, SessionStoreError};

use crate::clock::Clock;
use crate::codec::{self, SessionValue};
use crate::schema::ContentRecord;
use crate::store::DocumentStore;

fn codec_error(e: std::io::Error) -> SessionStoreError {
    SessionStoreError::Store { status: 500, message: format!("codec failure: {e}") }
}

/// The content record as read at request start, stashed per-request for a
/// possible later [`SessionApi::extend_lifetime`] call (spec.md §4.4,
/// "Ownership of the extension work"). Never shared across requests.
#[derive(Debug, Clone)]
pub struct StashedResource(ContentRecord);

impl StashedResource {
    /// The `CreatedDate` observed at read time, before any extension.
    pub fn created_date(&self) -> sessiond_common::Timestamp {
        self.0.created_date
    }
}

/// Outcome of [`SessionApi::get_session`].
#[derive(Debug, Clone)]
pub struct SessionRead {
    pub value: Option<SessionValue>,
    pub is_new: bool,
    pub stashed: Option<StashedResource>,
}

pub struct SessionApi {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    consistency_level: ConsistencyLevel,
    compression_enabled: bool,
}

impl SessionApi {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        consistency_level: ConsistencyLevel,
        compression_enabled: bool,
    ) -> Self {
        Self { store, clock, consistency_level, compression_enabled }
    }

    /// Returns `(null, false)` equivalent when the document is absent
    /// (spec.md §4.4 "Read").
    pub async fn get_session(&self, session_id: &str) -> Result<SessionRead> {
        let record = self.store.read_content(session_id, self.consistency_level).await?;
        let Some(record) = record else {
            return Ok(SessionRead { value: None, is_new: false, stashed: None });
        };

        let value = match &record.payload {
            Some(bytes) => Some(codec::decode(bytes, record.compressed).map_err(codec_error)?),
            None => None,
        };
        let is_new = record.is_new();
        Ok(SessionRead { value, is_new, stashed: Some(StashedResource(record)) })
    }

    /// Upsert (spec.md §4.4 "Write"): `ttl = value.timeout_minutes * 60`,
    /// `CreatedDate = now`. Returns the new `_etag`.
    pub async fn write_contents(&self, session_id: &str, value: &SessionValue, is_new: bool) -> Result<String> {
        let now = self.clock.now();
        let ttl_seconds = i64::from(value.timeout_minutes) * 60;

        let mut record = ContentRecord::new(session_id, ttl_seconds, now);
        record.payload = Some(codec::encode(value, self.compression_enabled).map_err(codec_error)?);
        record.compressed = self.compression_enabled;
        record.is_new = is_new.then(|| "yes".to_string());

        self.store.upsert_content(record).await
    }

    /// Delete both records independently. Not-found on either is tolerated
    /// (never returned to the caller) but logged at error level, per
    /// spec.md §4.4 "Remove": "a 404 on either record is logged at error
    /// level and ignored."
    pub async fn remove(&self, session_id: &str) {
        match self.store.delete_content(session_id).await {
            Ok(()) => {}
            Err(SessionStoreError::NotFound(_)) => {
                tracing::error!(session_id, "remove: content record already absent");
            }
            Err(other) => {
                tracing::error!(session_id, error = %other, "remove: failed to delete content record");
            }
        }

        let id = lock_id(session_id);
        match self.store.read_lock(&id).await {
            Ok(Some(lock)) => {
                let etag = lock.etag.unwrap_or_default();
                match self.store.delete_lock(&id, &etag).await {
                    Ok(()) => {}
                    Err(SessionStoreError::NotFound(_)) => {
                        tracing::error!(session_id, "remove: lock record already absent");
                    }
                    Err(e) => {
                        tracing::error!(session_id, error = %e, "remove: failed to delete lock record");
                    }
                }
            }
            Ok(None) => {}
            Err(other) => {
                tracing::error!(session_id, error = %other, "remove: failed to read lock record");
            }
        }
    }

    /// The dampening rule (spec.md §4.4): extend only once the remaining
    /// lifetime has dropped to or below one-third of `ttl`, matching the
    /// spec's own worked boundary example (`ttl=60`: a no-op at `t0+20`,
    /// a replace at `t0+41`). Uses [`ConsistencyLevel::Eventual`] and
    /// swallows 404/etag-mismatch, per spec.
    pub async fn extend_lifetime(&self, session_id: &str, stashed: &StashedResource) {
        let record = &stashed.0;
        let Some(etag) = record.etag.clone() else {
            return;
        };

        let now = self.clock.now();
        let remaining = (record.created_date + ChronoDuration::seconds(record.ttl)) - now;
        let tolerated = ChronoDuration::seconds(record.ttl / 3);
        if remaining > tolerated {
            return;
        }

        let mut updated = record.clone();
        updated.created_date = now;

        match self.store.replace_content_if_match(updated, &etag, ConsistencyLevel::Eventual).await {
            Ok(_) => {
                tracing::debug!(session_id, "extend_lifetime: replaced");
            }
            Err(SessionStoreError::NotFound(_)) | Err(SessionStoreError::Conflict(_)) => {
                tracing::debug!(session_id, "extend_lifetime: stale stashed resource, skipping");
            }
            Err(other) => {
                tracing::error!(session_id, error = %other, "extend_lifetime: store error");
            }
        }
    }
}
