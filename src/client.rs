use std::fmt::{Display, Formatter};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::batch::{BatchResponse, OperationResult, TransactionalBatch};
use crate::status::{StatusCode, StoreError};

/// Routing value that co-locates items for single-partition operations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionKey(String);

impl PartitionKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PartitionKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PartitionKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ItemOptions {
    /// Only apply the write if the stored `_etag` still matches.
    pub if_match: Option<String>,
}

impl ItemOptions {
    pub fn if_match(etag: impl Into<String>) -> Self {
        Self {
            if_match: Some(etag.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ItemResponse {
    pub status: StatusCode,
    pub request_charge: f64,
    pub etag: Option<String>,
    /// Raw document bytes; empty for deletes.
    pub value: Vec<u8>,
}

impl ItemResponse {
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.value)
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryResponse {
    pub items: Vec<Value>,
    pub request_charge: f64,
}

/// Client capability over one container of a partitioned document store.
///
/// Backends implement [`Store::execute_batch`] and the two query methods;
/// point operations default to single-operation batches so that every backend
/// shares the same status semantics.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Execute a grouped write atomically within its partition
    async fn execute_batch(&self, batch: TransactionalBatch) -> Result<BatchResponse, StoreError>;

    /// All items stored under one partition key, in id order
    async fn query_partition(&self, partition_key: &PartitionKey)
        -> Result<QueryResponse, StoreError>;

    /// Every item of the container, across partitions
    async fn scan_items(&self) -> Result<QueryResponse, StoreError>;

    /// Point read of a single item
    async fn read_item(
        &self,
        partition_key: &PartitionKey,
        id: &str,
    ) -> Result<ItemResponse, StoreError> {
        let mut batch = TransactionalBatch::new(partition_key.clone());
        batch.read_item(id);
        single(self.execute_batch(batch).await?, partition_key, id)
    }

    /// Create a new item; fails with a conflict if the id is taken
    async fn create_item(
        &self,
        partition_key: &PartitionKey,
        body: Vec<u8>,
    ) -> Result<ItemResponse, StoreError> {
        let id = item_id(&body);
        let mut batch = TransactionalBatch::new(partition_key.clone());
        batch.create_item(body);
        single(self.execute_batch(batch).await?, partition_key, &id)
    }

    /// Replace an existing item
    async fn replace_item(
        &self,
        partition_key: &PartitionKey,
        id: &str,
        body: Vec<u8>,
        options: ItemOptions,
    ) -> Result<ItemResponse, StoreError> {
        let mut batch = TransactionalBatch::new(partition_key.clone());
        batch.replace_item(id, body, options);
        single(self.execute_batch(batch).await?, partition_key, id)
    }

    /// Delete an existing item
    async fn delete_item(
        &self,
        partition_key: &PartitionKey,
        id: &str,
        options: ItemOptions,
    ) -> Result<ItemResponse, StoreError> {
        let mut batch = TransactionalBatch::new(partition_key.clone());
        batch.delete_item(id, options);
        single(self.execute_batch(batch).await?, partition_key, id)
    }
}

fn item_id(body: &[u8]) -> String {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|doc| doc.get("id").and_then(Value::as_str).map(str::to_owned))
        .unwrap_or_default()
}

/// Unwrap the outcome of a one-operation batch into a point response.
fn single(
    response: BatchResponse,
    partition_key: &PartitionKey,
    id: &str,
) -> Result<ItemResponse, StoreError> {
    let Some(result) = response.operations.into_iter().next() else {
        return Err(StoreError::BadRequest("empty batch response".to_string()));
    };
    if response.success {
        return Ok(ItemResponse {
            status: result.status,
            request_charge: result.request_charge,
            etag: result.etag,
            value: result.resource_body.unwrap_or_default(),
        });
    }
    Err(error_for(result, partition_key, id))
}

fn error_for(result: OperationResult, partition_key: &PartitionKey, id: &str) -> StoreError {
    let message = result
        .message
        .unwrap_or_else(|| format!("operation on [{id}] failed with {}", result.status));
    match result.status {
        StatusCode::NOT_FOUND => StoreError::NotFound {
            partition_key: partition_key.to_string(),
            id: id.to_string(),
        },
        StatusCode::CONFLICT => StoreError::Conflict {
            partition_key: partition_key.to_string(),
            id: id.to_string(),
        },
        StatusCode::PRECONDITION_FAILED => StoreError::PreconditionFailed { id: id.to_string() },
        StatusCode::INTERNAL_SERVER_ERROR => StoreError::Corrupted(message),
        status if status.is_transient() => StoreError::Transient(message),
        _ => StoreError::BadRequest(message),
    }
}
