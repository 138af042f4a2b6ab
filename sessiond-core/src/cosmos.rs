//! Production [`DocumentStore`]/[`StoreBootstrap`] backed by Azure Cosmos DB.
//! Feature-gated behind `cosmos`: every other module in this crate is
//! exercised by [`crate::memory::InMemoryDocumentStore`] and carries no
//! dependency on this one.
//!
//! The exact `azure_data_cosmos` surface could not be verified against a
//! live build in this environment; the client construction and per-call
//! shapes below follow that crate's documented conventions (a
//! `CosmosClient` scoped to a database/container pair, `ItemOptions` for
//! conditional `If-Match`, `QueryOptions` for cross-partition suppression).
//! Treat this file as the one place in the crate where that risk is
//! concentrated — see DESIGN.md.

use std::sync::Arc;

use async_trait::async_trait;
use azure_data_cosmos::{CosmosClient, PartitionKey};
use sessiond_common::{ConsistencyLevel, Result, SessionStoreError, StoreConfig, Timestamp, CONTAINER_NAME};

use crate::bootstrap::{lock_script_name, StoreBootstrap, LOCK_SCRIPT_BODY};
use crate::config::{EXCLUDED_PATHS, PARTITION_KEY_PATH};
use crate::schema::{ContentRecord, LockRecord};
use crate::store::{DocumentStore, LockScriptResult};

/// Map a Cosmos HTTP status (plus its sub-status, when the response carries
/// one) to a [`SessionStoreError`] kind. Per spec.md §4.3's retryable
/// statuses: 400 with sub-status 409 ("Conflicting request") and 449 with
/// sub-status 0 ("Retry to avoid conflicts") are both `Conflict`, same as a
/// bare 409 primary-key violation — all three must reach the lock
/// protocol's retry loop (`lock.rs`), never `Store`/fatal.
fn map_cosmos_error(status: u16, sub_status: Option<u32>, message: String) -> SessionStoreError {
    match (status, sub_status) {
        (404, _) => SessionStoreError::NotFound(message),
        (409, _) => SessionStoreError::Conflict(message),
        (400, Some(409)) => SessionStoreError::Conflict(message),
        (449, _) => SessionStoreError::Conflict(message),
        (429, _) => SessionStoreError::RateLimited(message),
        (other, _) => SessionStoreError::Store { status: other, message },
    }
}

/// Extract the HTTP status and sub-status from a `azure_data_cosmos` error
/// for [`map_cosmos_error`], defaulting a missing status to 500 (fatal)
/// rather than silently treating an unrecognized failure as retryable.
fn cosmos_error(e: azure_data_cosmos::Error) -> SessionStoreError {
    let status = e.http_status().unwrap_or(500);
    let sub_status = e.sub_status();
    map_cosmos_error(status, sub_status, e.to_string())
}

/// Thin wrapper around a `azure_data_cosmos` client scoped to one
/// database/container pair, implementing the abstractions the rest of this
/// crate is built against.
pub struct CosmosDocumentStore {
    client: CosmosClient,
    database_id: String,
    lock_script_name: String,
}

impl CosmosDocumentStore {
    /// Construct a client from `config`. Does not touch the network; call
    /// [`StoreBootstrap::ensure_database`] etc. before first use.
    ///
    /// `requestTimeout` and `maxRetryWaitOnRateLimited` are both set to
    /// `xLockTtlSeconds / 2` (spec.md §4.2/§5), so a single hung store
    /// request can never outlive the lock it is protecting.
    pub fn new(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let options = azure_data_cosmos::CosmosClientOptions {
            request_timeout: Some(config.request_timeout()),
            max_retry_wait_on_rate_limited: Some(config.max_retry_wait_on_rate_limited()),
            ..Default::default()
        };
        let client = CosmosClient::with_connection_string(&config.connection_string, Some(options))
            .map_err(|e| SessionStoreError::Configuration(format!("invalid connection string: {e}")))?;
        let lock_script_name = lock_script_name(LOCK_SCRIPT_BODY);
        Ok(Self { client, database_id: config.database_id, lock_script_name })
    }

    fn container(&self) -> azure_data_cosmos::clients::ContainerClient {
        self.client.database_client(&self.database_id).container_client(CONTAINER_NAME)
    }
}

#[async_trait]
impl StoreBootstrap for CosmosDocumentStore {
    async fn ensure_database(&self) -> Result<()> {
        self.client
            .create_database_if_not_exists(&self.database_id)
            .await
            .map(|_| ())
            .map_err(cosmos_error)
    }

    async fn ensure_container(&self) -> Result<()> {
        let database = self.client.database_client(&self.database_id);
        database
            .create_container_if_not_exists(
                CONTAINER_NAME,
                PARTITION_KEY_PATH,
                azure_data_cosmos::ContainerOptions {
                    default_ttl: Some(sessiond_common::DEFAULT_CONTAINER_TTL_SECS as i32),
                    excluded_paths: EXCLUDED_PATHS.iter().map(|p| p.to_string()).collect(),
                    ..Default::default()
                },
            )
            .await
            .map(|_| ())
            .map_err(cosmos_error)
    }

    async fn ensure_lock_script(&self) -> Result<String> {
        let container = self.container();
        match container.scripts_client().get(&self.lock_script_name).await {
            Ok(_) => Ok(self.lock_script_name.clone()),
            Err(e) if e.http_status() == Some(404) => {
                container
                    .scripts_client()
                    .create_stored_procedure(&self.lock_script_name, LOCK_SCRIPT_BODY)
                    .await
                    .map_err(cosmos_error)?;
                Ok(self.lock_script_name.clone())
            }
            Err(e) => Err(cosmos_error(e)),
        }
    }
}

#[async_trait]
impl DocumentStore for CosmosDocumentStore {
    async fn try_create_lock(&self, record: LockRecord) -> Result<LockRecord> {
        let container = self.container();
        container
            .create_item(PartitionKey::from(record.id.clone()), &record, None)
            .await
            .map(|resp| LockRecord { etag: resp.etag().map(str::to_string), ..record })
            .map_err(cosmos_error)
    }

    async fn read_lock(&self, id: &str) -> Result<Option<LockRecord>> {
        let container = self.container();
        match container.item_client(id, PartitionKey::from(id)).read::<LockRecord>(None).await {
            Ok(resp) => Ok(Some(resp.into_body())),
            Err(e) if e.http_status() == Some(404) => Ok(None),
            Err(e) => Err(cosmos_error(e)),
        }
    }

    async fn delete_lock(&self, id: &str, etag: &str) -> Result<()> {
        let container = self.container();
        container
            .item_client(id, PartitionKey::from(id))
            .delete(Some(azure_data_cosmos::ItemOptions { if_match: Some(etag.to_string()), ..Default::default() }))
            .await
            .map(|_| ())
            .map_err(cosmos_error)
    }

    async fn execute_lock_script(
        &self,
        lock_id: &str,
        now: Timestamp,
        lock_ttl_seconds: u64,
    ) -> Result<LockScriptResult> {
        let container = self.container();
        container
            .scripts_client()
            .execute_stored_procedure::<LockScriptResult>(
                &self.lock_script_name,
                PartitionKey::from(lock_id),
                &[lock_id.into(), now.to_rfc3339().into(), lock_ttl_seconds.into()],
            )
            .await
            .map(|resp| resp.into_body())
            .map_err(cosmos_error)
    }

    async fn read_content(&self, id: &str, consistency: ConsistencyLevel) -> Result<Option<ContentRecord>> {
        let container = self.container();
        match container
            .item_client(id, PartitionKey::from(id))
            .read::<ContentRecord>(Some(azure_data_cosmos::ItemOptions {
                consistency_level: Some(to_cosmos_consistency(consistency)),
                ..Default::default()
            }))
            .await
        {
            Ok(resp) => Ok(Some(resp.into_body())),
            Err(e) if e.http_status() == Some(404) => Ok(None),
            Err(e) => Err(cosmos_error(e)),
        }
    }

    async fn upsert_content(&self, record: ContentRecord) -> Result<String> {
        let container = self.container();
        container
            .upsert_item(
                PartitionKey::from(record.id.clone()),
                &record,
                Some(azure_data_cosmos::ItemOptions { enable_content_response_on_write: Some(false), ..Default::default() }),
            )
            .await
            .map(|resp| resp.etag().unwrap_or_default().to_string())
            .map_err(cosmos_error)
    }

    async fn replace_content_if_match(
        &self,
        record: ContentRecord,
        etag: &str,
        consistency: ConsistencyLevel,
    ) -> Result<String> {
        let container = self.container();
        container
            .item_client(record.id.clone(), PartitionKey::from(record.id.clone()))
            .replace(
                &record,
                Some(azure_data_cosmos::ItemOptions {
                    if_match: Some(etag.to_string()),
                    consistency_level: Some(to_cosmos_consistency(consistency)),
                    enable_content_response_on_write: Some(false),
                    ..Default::default()
                }),
            )
            .await
            .map(|resp| resp.etag().unwrap_or_default().to_string())
            .map_err(cosmos_error)
    }

    async fn delete_content(&self, id: &str) -> Result<()> {
        let container = self.container();
        container
            .item_client(id, PartitionKey::from(id))
            .delete(None)
            .await
            .map(|_| ())
            .map_err(cosmos_error)
    }
}

fn to_cosmos_consistency(level: ConsistencyLevel) -> azure_data_cosmos::ConsistencyLevel {
    match level {
        ConsistencyLevel::Strong => azure_data_cosmos::ConsistencyLevel::Strong,
        ConsistencyLevel::BoundedStaleness => azure_data_cosmos::ConsistencyLevel::BoundedStaleness,
        ConsistencyLevel::Session => azure_data_cosmos::ConsistencyLevel::Session,
        ConsistencyLevel::Eventual => azure_data_cosmos::ConsistencyLevel::Eventual,
        ConsistencyLevel::ConsistentPrefix => azure_data_cosmos::ConsistencyLevel::ConsistentPrefix,
    }
}

/// Build a [`CosmosDocumentStore`], run bootstrap once, and return it ready
/// for use by the lock protocol and session store API.
pub async fn connect(config: StoreConfig) -> Result<Arc<CosmosDocumentStore>> {
    let store = Arc::new(CosmosDocumentStore::new(config)?);
    store.ensure_database().await?;
    store.ensure_container().await?;
    store.ensure_lock_script().await?;
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_regardless_of_sub_status() {
        assert!(matches!(map_cosmos_error(404, None, "x".into()), SessionStoreError::NotFound(_)));
    }

    #[test]
    fn bare_409_is_conflict() {
        assert!(matches!(map_cosmos_error(409, None, "x".into()), SessionStoreError::Conflict(_)));
    }

    #[test]
    fn four_forty_nine_is_conflict_regardless_of_sub_status() {
        assert!(matches!(map_cosmos_error(449, Some(0), "x".into()), SessionStoreError::Conflict(_)));
        assert!(matches!(map_cosmos_error(449, None, "x".into()), SessionStoreError::Conflict(_)));
    }

    /// spec.md §4.3: HTTP 400 with sub-status 409 ("Conflicting request")
    /// is retryable and must reach the lock protocol as `Conflict`.
    #[test]
    fn four_hundred_with_sub_status_409_is_conflict() {
        assert!(matches!(map_cosmos_error(400, Some(409), "x".into()), SessionStoreError::Conflict(_)));
    }

    /// A bare 400 with no sub-status (or an unrelated one) is a genuine
    /// bad-request, not a retryable conflict, and must stay fatal.
    #[test]
    fn four_hundred_without_sub_status_409_is_fatal() {
        assert!(matches!(
            map_cosmos_error(400, None, "x".into()),
            SessionStoreError::Store { status: 400, .. }
        ));
        assert!(matches!(
            map_cosmos_error(400, Some(1), "x".into()),
            SessionStoreError::Store { status: 400, .. }
        ));
    }

    #[test]
    fn rate_limited_and_fatal_fallback() {
        assert!(matches!(map_cosmos_error(429, None, "x".into()), SessionStoreError::RateLimited(_)));
        assert!(matches!(
            map_cosmos_error(500, None, "x".into()),
            SessionStoreError::Store { status: 500, .. }
        ));
    }
}
