//! Store bootstrap (C3, spec.md §4.2): idempotent creation of the database,
//! container, indexing policy, default TTL, and the conflict-arbitration
//! script. Every step tolerates a pre-existing resource.

use async_trait::async_trait;
use sha1::{Digest, Sha1};

use sessiond_common::{Result, CONTAINER_NAME, DEFAULT_CONTAINER_TTL_SECS};

use crate::config::{LOCK_SCRIPT_NAME_HASH_LEN, LOCK_SCRIPT_NAME_PREFIX, PARTITION_KEY_PATH};

/// Body of the server-side conflict-arbitration script run by Phase 2 of the
/// lock protocol (spec.md §4.3): check absence, then insert, as one
/// serializable transaction in the partition. Registered under a name
/// derived from its own hash so upgrades are collision-free and idempotent.
pub const LOCK_SCRIPT_BODY: &str = r#"
function tryLock(lockId, nowIso, lockTtlSeconds) {
    var collection = getContext().getCollection();
    var response = getContext().getResponse();

    var accepted = collection.queryDocuments(
        collection.getSelfLink(),
        'SELECT * FROM root r WHERE r.id = @id',
        { parameters: [{ name: '@id', value: lockId }] },
        function (err, documents) {
            if (err) throw err;
            if (documents.length > 0) {
                response.setBody({ locked: false, etag: documents[0]._etag, createdDate: documents[0].CreatedDate });
                return;
            }
            var created = collection.createDocument(collection.getSelfLink(), {
                id: lockId,
                ttl: lockTtlSeconds,
                CreatedDate: nowIso,
            }, function (err2, doc) {
                if (err2) throw err2;
                response.setBody({ locked: true, etag: doc._etag, createdDate: doc.CreatedDate });
            });
            if (!created) throw new Error('createDocument was not accepted');
        }
    );
    if (!accepted) throw new Error('queryDocuments was not accepted');
}
"#;

/// Derive the deterministic `tryLock_<20-hex-sha1>` name for a script body
/// (spec.md §4.2). Replacement only happens when the name is absent, so a
/// changed script body naturally gets a new, non-colliding name.
pub fn lock_script_name(script_body: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(script_body.as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|byte| format!("{byte:02x}")).collect();
    format!("{LOCK_SCRIPT_NAME_PREFIX}{}", &hex[..LOCK_SCRIPT_NAME_HASH_LEN])
}

/// Administrative surface a concrete [`crate::store::DocumentStore`] backend
/// exposes for first-use setup. Kept separate from `DocumentStore` itself:
/// every document operation is a per-request round trip, while these run
/// once per process (or once ever, for a shared database).
#[async_trait]
pub trait StoreBootstrap: Send + Sync {
    /// Create the database by name, tolerating "already exists".
    async fn ensure_database(&self) -> Result<()>;

    /// Create the `SessionStore` container with partition key `/id`,
    /// `excludedPaths=[/*]`, mode `Consistent`, default TTL
    /// [`DEFAULT_CONTAINER_TTL_SECS`]. Tolerates "already exists".
    async fn ensure_container(&self) -> Result<()>;

    /// Register [`LOCK_SCRIPT_BODY`] under [`lock_script_name`], only if
    /// absent. Returns the script's name for use by the lock protocol.
    async fn ensure_lock_script(&self) -> Result<String>;
}

/// No-op bootstrap for [`crate::memory::InMemoryDocumentStore`]: there is no
/// schema to create, but the lock protocol still needs a script name to
/// pass through its call sites, so this reports the same deterministic name
/// a real backend would.
pub struct NoopBootstrap;

#[async_trait]
impl StoreBootstrap for NoopBootstrap {
    async fn ensure_database(&self) -> Result<()> {
        Ok(())
    }

    async fn ensure_container(&self) -> Result<()> {
        Ok(())
    }

    async fn ensure_lock_script(&self) -> Result<String> {
        Ok(lock_script_name(LOCK_SCRIPT_BODY))
    }
}
