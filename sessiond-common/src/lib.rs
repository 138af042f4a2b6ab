//! Shared types for the session-state backend: the error enum, store
//! configuration, and the small set of constants every other crate in the
//! workspace needs to agree on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name of the single container holding both content and lock records.
pub const CONTAINER_NAME: &str = "SessionStore";

/// Default TTL applied to the container itself; every document sets its own
/// `ttl` which overrides this safety net.
pub const DEFAULT_CONTAINER_TTL_SECS: u64 = 300;

/// Maximum length of a session id the host framework will ever hand us.
pub const MAX_SESSION_ID_LEN: usize = 80;

/// Suffix appended to a session id to form its lock record's id.
pub const LOCK_ID_SUFFIX: &str = "_lock";

/// Number of retries Phase 2 of lock acquisition performs before returning
/// whatever the final attempt produced.
pub const LOCK_SCRIPT_MAX_RETRIES: u32 = 3;

/// Inclusive bounds (milliseconds) for the randomized Phase 2 retry backoff.
pub const LOCK_SCRIPT_BACKOFF_MIN_MS: u64 = 10;
pub const LOCK_SCRIPT_BACKOFF_MAX_MS: u64 = 50;

/// Error kinds surfaced by the lock protocol and the session store API.
///
/// Variants are kinds, not exception types: `Conflict`/`RateLimited` are
/// recoverable inside the lock protocol and should never reach a caller
/// except as a final, exhausted-retries outcome.
#[derive(Debug, Error, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionStoreError {
    /// Normal on read and on release; never a failure, just a signal.
    #[error("session not found: {0}")]
    NotFound(String),

    /// A primary-key conflict (409) or the script's retryable statuses,
    /// surfaced only once all retries in §4.3 are exhausted.
    #[error("store conflict: {0}")]
    Conflict(String),

    /// The store's own retry budget (`maxRetryWaitOnRateLimited`) was
    /// exhausted without success.
    #[error("store rate-limited: {0}")]
    RateLimited(String),

    /// The caller's cancellation token fired before the operation completed.
    #[error("operation cancelled")]
    Cancelled,

    /// Any other store error, with the original status preserved.
    #[error("store error (status {status}): {message}")]
    Store { status: u16, message: String },

    /// A configuration problem detected at construction time. Never
    /// recovered — the caller must fix the configuration and restart.
    #[error("configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, SessionStoreError>;

/// Consistency level requested for a given store operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsistencyLevel {
    Strong,
    BoundedStaleness,
    Session,
    Eventual,
    ConsistentPrefix,
}

impl Default for ConsistencyLevel {
    fn default() -> Self {
        ConsistencyLevel::Strong
    }
}

/// Per-provider-instance configuration (spec.md §6).
///
/// The leading `x` in `x_lock_ttl_seconds` is historical: earlier
/// deployments of this provider shipped the knob under that name and
/// renaming it would break existing configuration files.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub connection_string: String,
    pub database_id: String,
    pub x_lock_ttl_seconds: u64,
    pub compression_enabled: bool,
    pub consistency_level: ConsistencyLevel,
}

impl StoreConfig {
    pub fn new(connection_string: impl Into<String>, database_id: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            database_id: database_id.into(),
            x_lock_ttl_seconds: 30,
            compression_enabled: true,
            consistency_level: ConsistencyLevel::Strong,
        }
    }

    /// Fail fast on an obviously-broken configuration. Called once at
    /// provider construction; never retried.
    pub fn validate(&self) -> Result<()> {
        if self.connection_string.trim().is_empty() {
            return Err(SessionStoreError::Configuration("connectionString is required".into()));
        }
        if self.database_id.trim().is_empty() {
            return Err(SessionStoreError::Configuration("databaseId is required".into()));
        }
        if self.x_lock_ttl_seconds == 0 {
            return Err(SessionStoreError::Configuration("xLockTtlSeconds must be > 0".into()));
        }
        Ok(())
    }

    /// Half the lock TTL, per spec.md §5: the ceiling on a single store
    /// request so it cannot outlive the lock it is protecting.
    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.x_lock_ttl_seconds / 2)
    }

    /// Also half the lock TTL (spec.md §4.2/§5), named separately from
    /// [`Self::request_timeout`] because the real store client exposes them
    /// as two distinct knobs even though this spec always sets them equal.
    pub fn max_retry_wait_on_rate_limited(&self) -> std::time::Duration {
        self.request_timeout()
    }
}

/// Validate a session id against the host framework's constraints (spec.md
/// §4.5): non-empty and no longer than [`MAX_SESSION_ID_LEN`]. No other
/// validation is performed — session ids are opaque to this crate.
pub fn validate_session_id(session_id: &str) -> Result<()> {
    if session_id.is_empty() {
        return Err(SessionStoreError::Configuration("session id must not be empty".into()));
    }
    if session_id.len() > MAX_SESSION_ID_LEN {
        return Err(SessionStoreError::Configuration(format!(
            "session id exceeds maximum length of {} characters",
            MAX_SESSION_ID_LEN
        )));
    }
    Ok(())
}

/// Build the lock record's id for a given session id (spec.md §3).
pub fn lock_id(session_id: &str) -> String {
    format!("{session_id}{LOCK_ID_SUFFIX}")
}

/// A point in time, always UTC. Alias kept narrow so call sites read as
/// intent ("a document timestamp") rather than a generic chrono import.
pub type Timestamp = DateTime<Utc>;
