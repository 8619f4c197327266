use std::fmt::{Display, Formatter};

use crate::client::{ItemOptions, PartitionKey};
use crate::status::StatusCode;

/// Upper bound on sub-operations in one grouped write.
pub const MAX_BATCH_OPERATIONS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationKind {
    Create,
    Replace,
    Delete,
    Read,
}

impl Display for OperationKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OperationKind::Create => "create",
            OperationKind::Replace => "replace",
            OperationKind::Delete => "delete",
            OperationKind::Read => "read",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub enum BatchOperation {
    Create {
        body: Vec<u8>,
    },
    Replace {
        id: String,
        body: Vec<u8>,
        options: ItemOptions,
    },
    Delete {
        id: String,
        options: ItemOptions,
    },
    Read {
        id: String,
    },
}

impl BatchOperation {
    pub fn kind(&self) -> OperationKind {
        match self {
            BatchOperation::Create { .. } => OperationKind::Create,
            BatchOperation::Replace { .. } => OperationKind::Replace,
            BatchOperation::Delete { .. } => OperationKind::Delete,
            BatchOperation::Read { .. } => OperationKind::Read,
        }
    }
}

/// Ordered sub-operations scoped to a single partition key, applied as a unit.
#[derive(Debug, Clone)]
pub struct TransactionalBatch {
    partition_key: PartitionKey,
    operations: Vec<BatchOperation>,
}

impl TransactionalBatch {
    pub fn new(partition_key: PartitionKey) -> Self {
        Self {
            partition_key,
            operations: Vec::new(),
        }
    }

    pub fn create_item(&mut self, body: Vec<u8>) -> &mut Self {
        self.operations.push(BatchOperation::Create { body });
        self
    }

    pub fn replace_item(
        &mut self,
        id: impl Into<String>,
        body: Vec<u8>,
        options: ItemOptions,
    ) -> &mut Self {
        self.operations.push(BatchOperation::Replace {
            id: id.into(),
            body,
            options,
        });
        self
    }

    pub fn delete_item(&mut self, id: impl Into<String>, options: ItemOptions) -> &mut Self {
        self.operations.push(BatchOperation::Delete {
            id: id.into(),
            options,
        });
        self
    }

    pub fn read_item(&mut self, id: impl Into<String>) -> &mut Self {
        self.operations.push(BatchOperation::Read { id: id.into() });
        self
    }

    pub fn partition_key(&self) -> &PartitionKey {
        &self.partition_key
    }

    pub fn operations(&self) -> &[BatchOperation] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct OperationResult {
    pub kind: OperationKind,
    pub status: StatusCode,
    pub request_charge: f64,
    pub etag: Option<String>,
    /// Document body, present for reads.
    pub resource_body: Option<Vec<u8>>,
    /// Reason reported by the store for a failed sub-operation.
    pub message: Option<String>,
}

impl OperationResult {
    pub(crate) fn skipped(kind: OperationKind) -> Self {
        Self {
            kind,
            status: StatusCode::FAILED_DEPENDENCY,
            request_charge: 0.0,
            etag: None,
            resource_body: None,
            message: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchResponse {
    pub success: bool,
    pub operations: Vec<OperationResult>,
}

impl BatchResponse {
    pub fn request_charge(&self) -> f64 {
        self.operations.iter().map(|op| op.request_charge).sum()
    }

    /// The sub-operation that caused a failed batch: the first one whose status
    /// is not the dependency-skipped sentinel.
    pub fn first_failure(&self) -> Option<(usize, &OperationResult)> {
        if self.success {
            return None;
        }
        self.operations
            .iter()
            .enumerate()
            .find(|(_, op)| !op.status.is_dependency_skipped())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(kind: OperationKind, status: StatusCode) -> OperationResult {
        OperationResult {
            status,
            ..OperationResult::skipped(kind)
        }
    }

    #[test]
    fn builder_keeps_request_order() {
        let mut batch = TransactionalBatch::new(PartitionKey::new("c1"));
        batch
            .create_item(b"{}".to_vec())
            .replace_item("c1", b"{}".to_vec(), ItemOptions::default());

        let kinds: Vec<_> = batch.operations().iter().map(BatchOperation::kind).collect();
        assert_eq!(kinds, vec![OperationKind::Create, OperationKind::Replace]);
        assert_eq!(batch.partition_key().as_str(), "c1");
    }

    #[test]
    fn first_failure_skips_dependency_sentinel() {
        let response = BatchResponse {
            success: false,
            operations: vec![
                result(OperationKind::Create, StatusCode::FAILED_DEPENDENCY),
                result(OperationKind::Replace, StatusCode::PRECONDITION_FAILED),
                result(OperationKind::Read, StatusCode::FAILED_DEPENDENCY),
            ],
        };

        let (index, op) = response.first_failure().unwrap();
        assert_eq!(index, 1);
        assert_eq!(op.status, StatusCode::PRECONDITION_FAILED);
    }

    #[test]
    fn successful_batch_has_no_failure() {
        let response = BatchResponse {
            success: true,
            operations: vec![result(OperationKind::Create, StatusCode::CREATED)],
        };
        assert!(response.first_failure().is_none());
    }
}
