#![cfg(feature = "rocksdb")]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use rocksdb::{
    DBCompactionStyle, DBCompressionType, Direction, IteratorMode, LogLevel,
    Options as RocksDBOptions, ReadOptions, Transaction, TransactionDB, TransactionDBOptions,
    TransactionOptions, WriteOptions,
};
use tracing::debug;

use crate::batch::{BatchResponse, TransactionalBatch};
use crate::client::{PartitionKey, QueryResponse, Store};
use crate::engine::{self, ContainerConfig, KvTxn};
use crate::status::StoreError;

/// Container persisted in a RocksDB transaction database. Sub-operations lock
/// the keys they read, so concurrent grouped writes on the same items wait or
/// fail with a transient lock timeout.
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<TransactionDB>,
    dir: PathBuf,
    config: ContainerConfig,
}

impl RocksDBStore {
    pub fn open(dir: impl AsRef<Path>, config: ContainerConfig) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();

        let mut opts = RocksDBOptions::default();
        // Synced commits (see get_transaction) flush the WAL with fdatasync, not fsync
        opts.set_use_fsync(false);
        opts.set_log_level(LogLevel::Error);
        opts.set_keep_log_file_num(20);
        opts.create_if_missing(true);
        opts.set_compaction_style(DBCompactionStyle::Level);
        opts.set_max_write_buffer_number(4);
        opts.set_write_buffer_size(64 * 1024 * 1024);
        // Documents are small, keep them inline with their keys
        opts.set_enable_blob_files(false);
        opts.set_compression_per_level(&[
            DBCompressionType::None,
            DBCompressionType::None,
            DBCompressionType::Snappy,
            DBCompressionType::Snappy,
            DBCompressionType::Lz4,
        ]);

        let txn_db_opts = TransactionDBOptions::default();
        let db = TransactionDB::open(&opts, &txn_db_opts, &dir).map_err(StoreError::transient)?;
        debug!(dir = %dir.display(), "Opened RocksDB container");

        Ok(Self {
            db: Arc::new(db),
            dir,
            config,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn get_transaction(&self) -> Transaction<TransactionDB> {
        let mut txn_opts = TransactionOptions::default();
        txn_opts.set_snapshot(true);

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(true);

        self.db.transaction_opt(&write_opts, &txn_opts)
    }

    fn read_range(&self, prefix: &[u8]) -> Result<QueryResponse, StoreError> {
        let mut opts = ReadOptions::default();
        opts.fill_cache(true);

        let mode = if prefix.is_empty() {
            IteratorMode::Start
        } else {
            IteratorMode::From(prefix, Direction::Forward)
        };

        let mut response = QueryResponse::default();
        let mut bytes = 0;
        for item in self.db.iterator_opt(mode, opts) {
            let (key, value) = item.map_err(StoreError::transient)?;
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

impl KvTxn for Transaction<'_, TransactionDB> {
    fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Transaction::get_for_update(self, key, true).map_err(StoreError::transient)
    }

    fn put(&mut self, key: &[u8], value: Vec<u8>) -> Result<(), StoreError> {
        Transaction::put(self, key, value).map_err(StoreError::transient)
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError> {
        Transaction::delete(self, key).map_err(StoreError::transient)
    }
}

#[async_trait]
impl Store for RocksDBStore {
    async fn execute_batch(&self, batch: TransactionalBatch) -> Result<BatchResponse, StoreError> {
        let mut txn = self.get_transaction();

        let response = engine::execute(&mut txn, &self.config, &batch)?;
        if response.success {
            txn.commit().map_err(StoreError::transient)?;
        } else {
            txn.rollback().map_err(StoreError::transient)?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ItemOptions;
    use crate::status::StatusCode;
    use serde_json::json;

    fn doc(id: &str, customer_id: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({"id": id, "customerId": customer_id})).unwrap()
    }

    #[tokio::test]
    async fn grouped_write_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let pk = PartitionKey::new("c1");
        {
            let store = RocksDBStore::open(dir.path(), ContainerConfig::default()).unwrap();
            let mut batch = TransactionalBatch::new(pk.clone());
            batch.create_item(doc("c1", "c1")).create_item(doc("o1", "c1"));
            assert!(store.execute_batch(batch).await.unwrap().success);
        }

        let store = RocksDBStore::open(dir.path(), ContainerConfig::default()).unwrap();
        assert_eq!(store.dir(), dir.path());
        let read = store.read_item(&pk, "o1").await.unwrap();
        assert_eq!(read.status, StatusCode::OK);
        assert_eq!(store.query_partition(&pk).await.unwrap().items.len(), 2);
        assert_eq!(store.scan_items().await.unwrap().items.len(), 2);
    }

    #[tokio::test]
    async fn failed_batch_is_rolled_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = RocksDBStore::open(dir.path(), ContainerConfig::default()).unwrap();
        let pk = PartitionKey::new("c1");
        store.create_item(&pk, doc("c1", "c1")).await.unwrap();

        let mut batch = TransactionalBatch::new(pk.clone());
        batch
            .create_item(doc("o1", "c1"))
            .replace_item("c1", doc("c1", "c1"), ItemOptions::if_match("stale"));
        let response = store.execute_batch(batch).await.unwrap();
        assert!(!response.success);
        assert_eq!(response.operations[0].status, StatusCode::FAILED_DEPENDENCY);
        assert_eq!(response.operations[1].status, StatusCode::PRECONDITION_FAILED);

        let items = store.query_partition(&pk).await.unwrap().items;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["id"], "c1");
    }
}
