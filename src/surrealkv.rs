#![cfg(feature = "surrealkv")]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::batch::{BatchResponse, TransactionalBatch};
use crate::client::{PartitionKey, QueryResponse, Store};
use crate::engine::{self, ContainerConfig, KvTxn};
use crate::status::StoreError;

/// Container persisted in a SurrealKV directory. Commit conflicts between
/// concurrent grouped writes surface as transient errors.
#[derive(Clone)]
pub struct SurrealKVStore {
    db: Arc<surrealkv::Store>,
    dir: PathBuf,
    config: ContainerConfig,
}

impl SurrealKVStore {
    pub fn open(dir: impl AsRef<Path>, config: ContainerConfig) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();

        let mut opts = surrealkv::Options::new();
        opts.enable_versions = false;
        opts.disk_persistence = true;
        opts.dir = dir.clone();

        let db = surrealkv::Store::new(opts).map_err(StoreError::transient)?;
        debug!(dir = %dir.display(), "Opened SurrealKV container");

        Ok(Self {
            db: Arc::new(db),
            dir,
            config,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read_range(&self, prefix: &[u8]) -> Result<QueryResponse, StoreError> {
        let mut txn = self
            .db
            .begin_with_mode(surrealkv::Mode::ReadOnly)
            .map_err(StoreError::transient)?;

        let mut response = QueryResponse::default();
        let mut bytes = 0;
        for (key, value, _) in txn
            .scan(prefix.., None)
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::transient)? {
            if !key.starts_with(prefix) {
                break;
            }
            bytes += value.len();
            response.items.push(engine::decode_document(&value)?);
        }
        response.request_charge = engine::query_charge(bytes);
        Ok(response)
    }
}

impl KvTxn for surrealkv::Transaction {
    fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let value = surrealkv::Transaction::get(self, key).map_err(StoreError::transient)?;
        Ok(value.map(|v| v.to_vec()))
    }

    fn put(&mut self, key: &[u8], value: Vec<u8>) -> Result<(), StoreError> {
        self.set(key, &value).map_err(StoreError::transient)
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError> {
        surrealkv::Transaction::delete(self, key).map_err(StoreError::transient)
    }
}

#[async_trait]
impl Store for SurrealKVStore {
    async fn execute_batch(&self, batch: TransactionalBatch) -> Result<BatchResponse, StoreError> {
        let mut txn = self
            .db
            .begin_with_mode(surrealkv::Mode::ReadWrite)
            .map_err(StoreError::transient)?;

        let response = engine::execute(&mut txn, &self.config, &batch)?;
        if response.success {
            txn.commit().await.map_err(StoreError::transient)?;
        }
        Ok(response)
    }

    async fn query_partition(
        &self,
        partition_key: &PartitionKey,
    ) -> Result<QueryResponse, StoreError> {
        let prefix = engine::partition_prefix(partition_key)?;
        self.read_range(&prefix)
    }

    async fn scan_items(&self) -> Result<QueryResponse, StoreError> {
        self.read_range(&[])
    }
}
