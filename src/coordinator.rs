//! Recording and removing sales orders together with the owning customer's
//! `salesOrderCount`, as one grouped write per customer partition.
//!
//! Each call performs one point read of the customer and at most one grouped
//! write; nothing is retried and no lock is held between the two. A customer
//! modified by someone else in between makes the replace fail its if-match
//! precondition, which surfaces as [`OrderError::PartialFailure`].

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::batch::{BatchResponse, OperationKind, TransactionalBatch};
use crate::client::{ItemOptions, PartitionKey, Store};
use crate::model::{CustomerAggregate, SalesOrder, SALES_ORDER_TYPE};
use crate::status::{StatusCode, StoreError};

/// How `salesOrderCount` is rewritten when an order is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CountPolicy {
    /// previous + 1
    #[default]
    Increment,
    /// Always write this value.
    Fixed(u64),
}

impl CountPolicy {
    pub fn next(&self, previous: u64) -> u64 {
        match self {
            CountPolicy::Increment => previous.saturating_add(1),
            CountPolicy::Fixed(value) => *value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid count policy [{0}], expected `increment` or `fixed:<n>`")]
pub struct ParsePolicyError(String);

impl FromStr for CountPolicy {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().split_once(':') {
            None if s.trim().eq_ignore_ascii_case("increment") => Ok(CountPolicy::Increment),
            Some((name, value)) if name.eq_ignore_ascii_case("fixed") => value
                .trim()
                .parse()
                .map(CountPolicy::Fixed)
                .map_err(|_| ParsePolicyError(s.to_string())),
            _ => Err(ParsePolicyError(s.to_string())),
        }
    }
}

impl Display for CountPolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CountPolicy::Increment => f.write_str("increment"),
            CountPolicy::Fixed(value) => write!(f, "fixed:{value}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrderError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("customer [{customer_id}] not found")]
    NotFound { customer_id: String },

    #[error("could not decode stored data: {0}")]
    Decode(String),

    #[error("store unavailable: {0}")]
    Transient(String),

    #[error("store rejected the request: {0}")]
    Rejected(StoreError),

    #[error("grouped write failed at operation {index} ({kind}) with status {status}")]
    PartialFailure {
        index: usize,
        kind: OperationKind,
        status: StatusCode,
        message: Option<String>,
    },
}

impl OrderError {
    /// A duplicate id was written; the same order was already recorded.
    pub fn is_conflict(&self) -> bool {
        match self {
            OrderError::PartialFailure { status, .. } => status.is_conflict(),
            OrderError::Rejected(err) => err.is_conflict(),
            _ => false,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, OrderError::Transient(_))
    }
}

impl From<StoreError> for OrderError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { id, .. } => OrderError::NotFound { customer_id: id },
            StoreError::Transient(message) => OrderError::Transient(message),
            StoreError::Corrupted(message) => OrderError::Decode(message),
            other => OrderError::Rejected(other),
        }
    }
}

impl From<serde_json::Error> for OrderError {
    fn from(err: serde_json::Error) -> Self {
        OrderError::Decode(err.to_string())
    }
}

/// Progress of one coordinator call, reported through tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    ReadingCustomer,
    BuildingBatch,
    Submitting,
    Succeeded,
    Failed,
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::ReadingCustomer => "reading-customer",
            Phase::BuildingBatch => "building-batch",
            Phase::Submitting => "submitting",
            Phase::Succeeded => "succeeded",
            Phase::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperationOutcome {
    pub index: usize,
    pub kind: OperationKind,
    pub status: StatusCode,
    pub request_charge: f64,
    pub body: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupedWriteOutcome {
    pub customer_id: String,
    pub order_id: String,
    pub sales_order_count: u64,
    /// One entry per sub-operation, in request order.
    pub operations: Vec<OperationOutcome>,
}

impl GroupedWriteOutcome {
    pub fn request_charge(&self) -> f64 {
        self.operations.iter().map(|op| op.request_charge).sum()
    }
}

impl Display for GroupedWriteOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Customer {} now has salesOrderCount {} (order {})",
            self.customer_id, self.sales_order_count, self.order_id
        )?;
        for op in &self.operations {
            writeln!(
                f,
                "Operation {} ({}) completed with status code {} consumed {:.2} RU",
                op.index, op.kind, op.status, op.request_charge
            )?;
        }
        write!(f, "Total request charge: {:.2} RU", self.request_charge())
    }
}

/// Keeps a customer's order counter in step with its orders. The store is
/// injected; the coordinator owns no other state.
pub struct OrderCoordinator<S> {
    store: S,
    policy: CountPolicy,
}

impl<S: Store> OrderCoordinator<S> {
    pub fn new(store: S, policy: CountPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> CountPolicy {
        self.policy
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Create `order` and bump the customer's `salesOrderCount` as one grouped
    /// write in the customer's partition.
    ///
    /// The caller supplies the order id; `order.customer_id` must equal
    /// `customer_id`, which is both the customer's item id and the partition
    /// key of both writes.
    #[instrument(skip_all, fields(customer_id = %customer_id, order_id = %order.id))]
    pub async fn record_order(
        &self,
        customer_id: &str,
        order: &SalesOrder,
    ) -> Result<GroupedWriteOutcome, OrderError> {
        validate_order(customer_id, order)?;

        let partition_key = PartitionKey::new(customer_id);
        let (mut customer, etag) = self.read_customer(&partition_key, customer_id).await?;

        debug!(phase = %Phase::BuildingBatch);
        let previous = customer
            .sales_order_count()
            .map_err(|e| OrderError::Decode(e.to_string()))?;
        let count = self.policy.next(previous);
        customer.set_sales_order_count(count);
        info!(previous, count, policy = %self.policy, "Updating salesOrderCount");

        let mut batch = TransactionalBatch::new(partition_key);
        batch
            .create_item(serde_json::to_vec(order)?)
            .replace_item(customer_id, serde_json::to_vec(&customer)?, if_match(etag));

        let operations = self.submit(batch).await?;
        Ok(GroupedWriteOutcome {
            customer_id: customer_id.to_string(),
            order_id: order.id.clone(),
            sales_order_count: count,
            operations,
        })
    }

    /// Delete an order and decrement the customer's `salesOrderCount` as one
    /// grouped write. The decrement saturates at zero.
    #[instrument(skip(self))]
    pub async fn remove_order(
        &self,
        customer_id: &str,
        order_id: &str,
    ) -> Result<GroupedWriteOutcome, OrderError> {
        if customer_id.is_empty() || order_id.is_empty() {
            return Err(OrderError::InvalidRequest(
                "customer id and order id are required".to_string(),
            ));
        }
        if customer_id == order_id {
            return Err(OrderError::InvalidRequest(
                "order id must differ from the customer id".to_string(),
            ));
        }

        let partition_key = PartitionKey::new(customer_id);
        let (mut customer, etag) = self.read_customer(&partition_key, customer_id).await?;

        debug!(phase = %Phase::BuildingBatch);
        let previous = customer
            .sales_order_count()
            .map_err(|e| OrderError::Decode(e.to_string()))?;
        let count = previous.saturating_sub(1);
        customer.set_sales_order_count(count);

        let mut batch = TransactionalBatch::new(partition_key);
        batch
            .delete_item(order_id, ItemOptions::default())
            .replace_item(customer_id, serde_json::to_vec(&customer)?, if_match(etag));

        let operations = self.submit(batch).await?;
        Ok(GroupedWriteOutcome {
            customer_id: customer_id.to_string(),
            order_id: order_id.to_string(),
            sales_order_count: count,
            operations,
        })
    }

    async fn read_customer(
        &self,
        partition_key: &PartitionKey,
        customer_id: &str,
    ) -> Result<(CustomerAggregate, Option<String>), OrderError> {
        debug!(phase = %Phase::ReadingCustomer);
        let response = match self.store.read_item(partition_key, customer_id).await {
            Ok(response) => response,
            Err(err) => {
                warn!(phase = %Phase::Failed, error = %err, "Customer point read failed");
                return Err(err.into());
            }
        };
        info!(
            status = %response.status,
            request_charge = response.request_charge,
            "Customer read"
        );

        let customer: CustomerAggregate = response.json()?;
        if customer.id != customer_id {
            return Err(OrderError::Decode(format!(
                "stored customer id [{}] does not match lookup id [{customer_id}]",
                customer.id
            )));
        }
        Ok((customer, response.etag))
    }

    async fn submit(&self, batch: TransactionalBatch) -> Result<Vec<OperationOutcome>, OrderError> {
        debug!(phase = %Phase::Submitting, operations = batch.len());
        let response = self.store.execute_batch(batch).await.inspect_err(|err| {
            warn!(phase = %Phase::Failed, error = %err, "Grouped write was not executed");
        })?;
        interpret(response)
    }
}

fn validate_order(customer_id: &str, order: &SalesOrder) -> Result<(), OrderError> {
    if customer_id.is_empty() {
        return Err(OrderError::InvalidRequest("customer id is empty".to_string()));
    }
    if order.id.is_empty() {
        return Err(OrderError::InvalidRequest(
            "order id must be generated by the caller".to_string(),
        ));
    }
    if order.id == customer_id {
        return Err(OrderError::InvalidRequest(
            "order id must differ from the customer id".to_string(),
        ));
    }
    if order.kind != SALES_ORDER_TYPE {
        return Err(OrderError::InvalidRequest(format!(
            "order type is [{}], expected [{SALES_ORDER_TYPE}]",
            order.kind
        )));
    }
    if order.customer_id != customer_id {
        return Err(OrderError::InvalidRequest(format!(
            "order belongs to customer [{}], not [{customer_id}]",
            order.customer_id
        )));
    }
    Ok(())
}

fn if_match(etag: Option<String>) -> ItemOptions {
    ItemOptions { if_match: etag }
}

/// Turn a grouped-write response into per-operation outcomes, or into the
/// failure of the first sub-operation that was not merely skipped.
fn interpret(response: BatchResponse) -> Result<Vec<OperationOutcome>, OrderError> {
    if let Some((index, op)) = response.first_failure() {
        warn!(
            phase = %Phase::Failed,
            index,
            status = %op.status,
            "Transaction failed due to operation {index} which failed with status code {}",
            op.status
        );
        return Err(OrderError::PartialFailure {
            index,
            kind: op.kind,
            status: op.status,
            message: op.message.clone(),
        });
    }
    if !response.success {
        return Err(OrderError::Rejected(StoreError::BadRequest(
            "grouped write failed without a failing operation".to_string(),
        )));
    }

    let mut outcomes = Vec::with_capacity(response.operations.len());
    for (index, op) in response.operations.into_iter().enumerate() {
        info!(
            index,
            kind = %op.kind,
            status = %op.status,
            request_charge = op.request_charge,
            "Operation completed"
        );
        let body = match op.resource_body {
            Some(bytes) => Some(serde_json::from_slice(&bytes)?),
            None => None,
        };
        outcomes.push(OperationOutcome {
            index,
            kind: op.kind,
            status: op.status,
            request_charge: op.request_charge,
            body,
        });
    }
    info!(phase = %Phase::Succeeded, "Grouped write committed");
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::OperationResult;

    #[test]
    fn parses_count_policies() {
        assert_eq!("increment".parse::<CountPolicy>(), Ok(CountPolicy::Increment));
        assert_eq!("fixed:3".parse::<CountPolicy>(), Ok(CountPolicy::Fixed(3)));
        assert_eq!("FIXED: 12".parse::<CountPolicy>(), Ok(CountPolicy::Fixed(12)));
        assert!("fixed:".parse::<CountPolicy>().is_err());
        assert!("double".parse::<CountPolicy>().is_err());
        assert_eq!(CountPolicy::Fixed(3).to_string(), "fixed:3");
    }

    #[test]
    fn policies_compute_next_count() {
        assert_eq!(CountPolicy::Increment.next(2), 3);
        assert_eq!(CountPolicy::Increment.next(u64::MAX), u64::MAX);
        assert_eq!(CountPolicy::Fixed(3).next(10), 3);
    }

    #[test]
    fn store_errors_map_to_taxonomy() {
        let not_found = StoreError::NotFound {
            partition_key: "c".into(),
            id: "c".into(),
        };
        assert_eq!(
            OrderError::from(not_found),
            OrderError::NotFound {
                customer_id: "c".into()
            }
        );
        assert!(OrderError::from(StoreError::transient("timeout")).is_transient());
        assert!(matches!(
            OrderError::from(StoreError::Corrupted("x".into())),
            OrderError::Decode(_)
        ));
    }

    #[test]
    fn interpret_reports_first_real_failure() {
        let skipped = OperationResult {
            kind: OperationKind::Create,
            status: StatusCode::FAILED_DEPENDENCY,
            request_charge: 0.0,
            etag: None,
            resource_body: None,
            message: None,
        };
        let mut failed = skipped.clone();
        failed.kind = OperationKind::Replace;
        failed.status = StatusCode::PRECONDITION_FAILED;

        let err = interpret(BatchResponse {
            success: false,
            operations: vec![skipped, failed],
        })
        .unwrap_err();

        match err {
            OrderError::PartialFailure {
                index,
                kind,
                status,
                ..
            } => {
                assert_eq!(index, 1);
                assert_eq!(kind, OperationKind::Replace);
                assert_eq!(status, StatusCode::PRECONDITION_FAILED);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn interpret_decodes_bodies_in_order() {
        let ops = vec![
            OperationResult {
                kind: OperationKind::Create,
                status: StatusCode::CREATED,
                request_charge: 6.0,
                etag: Some("e1".into()),
                resource_body: None,
                message: None,
            },
            OperationResult {
                kind: OperationKind::Read,
                status: StatusCode::OK,
                request_charge: 1.0,
                etag: Some("e2".into()),
                resource_body: Some(br#"{"id":"c1"}"#.to_vec()),
                message: None,
            },
        ];

        let outcomes = interpret(BatchResponse {
            success: true,
            operations: ops,
        })
        .unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].kind, OperationKind::Create);
        assert_eq!(outcomes[1].body.as_ref().unwrap()["id"], "c1");
    }
}
