//! Grouped-write evaluation shared by every backend.
//!
//! A backend opens one read-write transaction, hands it to [`execute`] as a
//! [`KvTxn`], and commits only when the returned response reports success.
//! Items are stored as JSON documents under `partition key | 0x1F | id`.

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::batch::{
    BatchOperation, BatchResponse, OperationKind, OperationResult, TransactionalBatch,
    MAX_BATCH_OPERATIONS,
};
use crate::client::{ItemOptions, PartitionKey};
use crate::status::{StatusCode, StoreError};

const KEY_SEPARATOR: u8 = 0x1F;

/// Outer error aborts the whole batch (infrastructure); inner error is the
/// sub-operation's own failed result.
type Applied = Result<Result<OperationResult, OperationResult>, StoreError>;

/// Transactional key-value view a backend exposes to the engine. Reads must
/// observe the transaction's own earlier writes.
pub trait KvTxn {
    fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;
    fn put(&mut self, key: &[u8], value: Vec<u8>) -> Result<(), StoreError>;
    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError>;
}

/// Partition layout of one container. Only the layouts the stored documents
/// actually carry can be built, so every write routes on a property its
/// documents have.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerConfig {
    partition_key_path: &'static str,
}

impl ContainerConfig {
    /// Customers and their sales orders, partitioned by `/customerId`.
    pub fn customers() -> Self {
        Self {
            partition_key_path: "/customerId",
        }
    }

    /// Product categories, all in the `category` partition of `/type`.
    pub fn product_categories() -> Self {
        Self {
            partition_key_path: "/type",
        }
    }

    /// Products, partitioned by `/categoryId`.
    pub fn products() -> Self {
        Self {
            partition_key_path: "/categoryId",
        }
    }

    pub fn partition_key_path(&self) -> &str {
        self.partition_key_path
    }
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self::customers()
    }
}

pub fn item_key(partition_key: &PartitionKey, id: &str) -> Result<Vec<u8>, StoreError> {
    if id.is_empty() || id.as_bytes().contains(&KEY_SEPARATOR) {
        return Err(StoreError::BadRequest(format!("invalid item id [{id}]")));
    }
    let mut key = partition_prefix(partition_key)?;
    key.extend_from_slice(id.as_bytes());
    Ok(key)
}

pub fn partition_prefix(partition_key: &PartitionKey) -> Result<Vec<u8>, StoreError> {
    let pk = partition_key.as_str().as_bytes();
    if pk.is_empty() || pk.contains(&KEY_SEPARATOR) {
        return Err(StoreError::BadRequest(format!(
            "invalid partition key [{partition_key}]"
        )));
    }
    let mut prefix = Vec::with_capacity(pk.len() + 1);
    prefix.extend_from_slice(pk);
    prefix.push(KEY_SEPARATOR);
    Ok(prefix)
}

fn kib(len: usize) -> f64 {
    len.div_ceil(1024).max(1) as f64
}

pub fn read_charge(len: usize) -> f64 {
    kib(len)
}

pub fn write_charge(len: usize) -> f64 {
    1.0 + 5.0 * kib(len)
}

pub fn query_charge(bytes_returned: usize) -> f64 {
    2.0 + bytes_returned.div_ceil(1024) as f64
}

pub fn decode_document(bytes: &[u8]) -> Result<Value, StoreError> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::Corrupted(e.to_string()))
}

/// Evaluate `batch` against `txn`. On the first failing sub-operation every
/// other sub-operation is reported as [`StatusCode::FAILED_DEPENDENCY`] and
/// the caller must not commit.
pub fn execute<T: KvTxn>(
    txn: &mut T,
    config: &ContainerConfig,
    batch: &TransactionalBatch,
) -> Result<BatchResponse, StoreError> {
    if batch.is_empty() {
        return Err(StoreError::BadRequest("batch has no operations".to_string()));
    }
    if batch.len() > MAX_BATCH_OPERATIONS {
        return Err(StoreError::BadRequest(format!(
            "batch has {} operations, limit is {MAX_BATCH_OPERATIONS}",
            batch.len()
        )));
    }

    let mut results = Vec::with_capacity(batch.len());
    for (index, operation) in batch.operations().iter().enumerate() {
        match apply(txn, config, batch.partition_key(), operation)? {
            Ok(result) => results.push(result),
            Err(failure) => {
                let mut operations: Vec<OperationResult> = batch
                    .operations()
                    .iter()
                    .map(|op| OperationResult::skipped(op.kind()))
                    .collect();
                operations[index] = failure;
                return Ok(BatchResponse {
                    success: false,
                    operations,
                });
            }
        }
    }

    Ok(BatchResponse {
        success: true,
        operations: results,
    })
}

fn apply<T: KvTxn>(
    txn: &mut T,
    config: &ContainerConfig,
    partition_key: &PartitionKey,
    operation: &BatchOperation,
) -> Applied {
    let kind = operation.kind();
    let fail = |status: StatusCode, message: String| -> Applied {
        Ok(Err(OperationResult {
            status,
            message: Some(message),
            ..OperationResult::skipped(kind)
        }))
    };

    match operation {
        BatchOperation::Create { body } => {
            let mut doc = match parse_body(body, config, partition_key, None) {
                Ok(doc) => doc,
                Err(message) => return fail(StatusCode::BAD_REQUEST, message),
            };
            let id = document_id(&doc);
            let key = match item_key(partition_key, &id) {
                Ok(key) => key,
                Err(e) => return fail(StatusCode::BAD_REQUEST, e.to_string()),
            };
            if txn.get(&key)?.is_some() {
                return fail(
                    StatusCode::CONFLICT,
                    format!("item [{id}] already exists in partition [{partition_key}]"),
                );
            }
            let etag = stamp(&mut doc);
            let bytes = encode(&doc)?;
            let charge = write_charge(bytes.len());
            txn.put(&key, bytes)?;
            Ok(Ok(written(kind, StatusCode::CREATED, charge, etag)))
        }
        BatchOperation::Replace { id, body, options } => {
            let mut doc = match parse_body(body, config, partition_key, Some(id.as_str())) {
                Ok(doc) => doc,
                Err(message) => return fail(StatusCode::BAD_REQUEST, message),
            };
            let key = match item_key(partition_key, id) {
                Ok(key) => key,
                Err(e) => return fail(StatusCode::BAD_REQUEST, e.to_string()),
            };
            let Some(existing) = txn.get(&key)? else {
                return fail(
                    StatusCode::NOT_FOUND,
                    format!("item [{id}] not found in partition [{partition_key}]"),
                );
            };
            if let Some(message) = etag_mismatch(&existing, options, id)? {
                return fail(StatusCode::PRECONDITION_FAILED, message);
            }
            let etag = stamp(&mut doc);
            let bytes = encode(&doc)?;
            let charge = write_charge(bytes.len());
            txn.put(&key, bytes)?;
            Ok(Ok(written(kind, StatusCode::OK, charge, etag)))
        }
        BatchOperation::Delete { id, options } => {
            let key = match item_key(partition_key, id) {
                Ok(key) => key,
                Err(e) => return fail(StatusCode::BAD_REQUEST, e.to_string()),
            };
            let Some(existing) = txn.get(&key)? else {
                return fail(
                    StatusCode::NOT_FOUND,
                    format!("item [{id}] not found in partition [{partition_key}]"),
                );
            };
            if let Some(message) = etag_mismatch(&existing, options, id)? {
                return fail(StatusCode::PRECONDITION_FAILED, message);
            }
            let charge = write_charge(existing.len());
            txn.delete(&key)?;
            Ok(Ok(OperationResult {
                status: StatusCode::NO_CONTENT,
                request_charge: charge,
                ..OperationResult::skipped(kind)
            }))
        }
        BatchOperation::Read { id } => {
            let key = match item_key(partition_key, id) {
                Ok(key) => key,
                Err(e) => return fail(StatusCode::BAD_REQUEST, e.to_string()),
            };
            let Some(existing) = txn.get(&key)? else {
                return fail(
                    StatusCode::NOT_FOUND,
                    format!("item [{id}] not found in partition [{partition_key}]"),
                );
            };
            let doc = decode_document(&existing)?;
            Ok(Ok(OperationResult {
                status: StatusCode::OK,
                request_charge: read_charge(existing.len()),
                etag: etag_of(&doc),
                resource_body: Some(existing),
                ..OperationResult::skipped(kind)
            }))
        }
    }
}

fn written(
    kind: OperationKind,
    status: StatusCode,
    charge: f64,
    etag: String,
) -> OperationResult {
    OperationResult {
        status,
        request_charge: charge,
        etag: Some(etag),
        ..OperationResult::skipped(kind)
    }
}

/// Validate a write body: a JSON object with a string `id` (matching
/// `expected_id` for replaces) whose partition key property equals the
/// batch's partition key.
fn parse_body(
    body: &[u8],
    config: &ContainerConfig,
    partition_key: &PartitionKey,
    expected_id: Option<&str>,
) -> Result<Map<String, Value>, String> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| format!("body is not valid JSON: {e}"))?;
    let Value::Object(doc) = value else {
        return Err("body must be a JSON object".to_string());
    };

    let id = doc
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| "body has no string `id`".to_string())?;
    if let Some(expected) = expected_id {
        if id != expected {
            return Err(format!("body id [{id}] does not match addressed id [{expected}]"));
        }
    }

    let path = config.partition_key_path();
    let routed = lookup(&doc, path)
        .and_then(Value::as_str)
        .map(str::to_owned);
    match routed {
        Some(value) if value == partition_key.as_str() => Ok(doc),
        Some(value) => Err(format!(
            "partition key {path} = [{value}] does not match batch partition [{partition_key}]"
        )),
        None => Err(format!("body has no string partition key at {path}")),
    }
}

/// Resolve a `/a/b` style path inside a document.
fn lookup<'a>(doc: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let path = path.strip_prefix('/')?;
    match path.split_once('/') {
        Some((head, rest)) => doc.get(head)?.pointer(&format!("/{rest}")),
        None => doc.get(path),
    }
}

fn document_id(doc: &Map<String, Value>) -> String {
    doc.get("id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn etag_of(doc: &Value) -> Option<String> {
    doc.get("_etag").and_then(Value::as_str).map(str::to_owned)
}

fn etag_mismatch(
    existing: &[u8],
    options: &ItemOptions,
    id: &str,
) -> Result<Option<String>, StoreError> {
    let Some(expected) = &options.if_match else {
        return Ok(None);
    };
    let current = etag_of(&decode_document(existing)?);
    if current.as_deref() == Some(expected.as_str()) {
        Ok(None)
    } else {
        Ok(Some(format!("item [{id}] etag does not match [{expected}]")))
    }
}

/// Set the system properties of a document about to be written.
fn stamp(doc: &mut Map<String, Value>) -> String {
    let etag = Uuid::new_v4().to_string();
    doc.insert("_etag".to_string(), Value::String(etag.clone()));
    doc.insert(
        "_ts".to_string(),
        Value::from(chrono::Utc::now().timestamp()),
    );
    etag
}

fn encode(doc: &Map<String, Value>) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(doc).map_err(|e| StoreError::Corrupted(e.to_string()))
}
