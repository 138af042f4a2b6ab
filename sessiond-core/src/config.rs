//! Bootstrap-time constants for the document store (C3, spec.md §4.2).

/// Indexing policy applied to the container: no path is indexed, since every
/// access is a primary-key point read keyed by `id`.
pub const EXCLUDED_PATHS: &[&str] = &["/*"];

/// Partition key path. Every document's partition key equals its own `id`,
/// so locks and content never share a logical partition.
pub const PARTITION_KEY_PATH: &str = "/id";

/// Prefix for the deterministically-named conflict-arbitration stored
/// procedure (spec.md §4.2): `tryLock_<20-hex-sha1-of-body>`.
pub const LOCK_SCRIPT_NAME_PREFIX: &str = "tryLock_";

/// Number of hex characters of the script body's SHA-1 kept in its name.
pub const LOCK_SCRIPT_NAME_HASH_LEN: usize = 20;

/// Maximum time to wait when acquiring the in-memory store's read or write
/// lock. A hung lock acquisition cannot outlive this, mirroring the ceiling
/// spec.md §5 places on real store round-trips via `requestTimeout`.
pub const GUARD_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(1);
