use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::batch::{BatchResponse, TransactionalBatch};
use crate::client::{PartitionKey, QueryResponse, Store};
use crate::engine::{self, ContainerConfig, KvTxn};
use crate::status::StoreError;

type Items = BTreeMap<Vec<u8>, Vec<u8>>;

/// Process-local container. Grouped writes run under one lock and are staged
/// until every sub-operation succeeds.
#[derive(Clone, Default)]
pub struct MemoryStore {
    items: Arc<Mutex<Items>>,
    config: ContainerConfig,
}

impl MemoryStore {
    pub fn new(config: ContainerConfig) -> Self {
        Self {
            items: Arc::default(),
            config,
        }
    }

    /// Write raw bytes under a key, bypassing document validation.
    #[cfg(test)]
    pub(crate) async fn put_raw(&self, partition_key: &PartitionKey, id: &str, bytes: Vec<u8>) {
        let key = engine::item_key(partition_key, id).unwrap();
        self.items.lock().await.insert(key, bytes);
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }
}

struct Staged<'a> {
    committed: &'a Items,
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl KvTxn for Staged<'_> {
    fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        match self.writes.get(key) {
            Some(staged) => Ok(staged.clone()),
            None => Ok(self.committed.get(key).cloned()),
        }
    }

    fn put(&mut self, key: &[u8], value: Vec<u8>) -> Result<(), StoreError> {
        self.writes.insert(key.to_vec(), Some(value));
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError> {
        self.writes.insert(key.to_vec(), None);
        Ok(())
    }
}

fn collect<'a>(entries: impl Iterator<Item = &'a Vec<u8>>) -> Result<QueryResponse, StoreError> {
    let mut response = QueryResponse::default();
    let mut bytes = 0;
    for value in entries {
        bytes += value.len();
        response.items.push(engine::decode_document(value)?);
    }
    response.request_charge = engine::query_charge(bytes);
    Ok(response)
}

#[async_trait]
impl Store for MemoryStore {
    async fn execute_batch(&self, batch: TransactionalBatch) -> Result<BatchResponse, StoreError> {
        let mut items = self.items.lock().await;
        let mut staged = Staged {
            committed: &*items,
            writes: BTreeMap::new(),
        };
        let response = engine::execute(&mut staged, &self.config, &batch)?;
        let writes = staged.writes;

        if response.success {
            for (key, value) in writes {
                match value {
                    Some(value) => items.insert(key, value),
                    None => items.remove(&key),
                };
            }
        }
        Ok(response)
    }

    async fn query_partition(
        &self,
        partition_key: &PartitionKey,
    ) -> Result<QueryResponse, StoreError> {
        let prefix = engine::partition_prefix(partition_key)?;
        let items = self.items.lock().await;
        collect(
            items
                .range(prefix.clone()..)
                .take_while(|(key, _)| key.starts_with(&prefix))
                .map(|(_, value)| value),
        )
    }

    async fn scan_items(&self) -> Result<QueryResponse, StoreError> {
        let items = self.items.lock().await;
        collect(items.values())
    }
}
