pub mod args;
pub mod batch;
pub mod catalog;
pub mod client;
pub mod coordinator;
pub mod database;
pub mod engine;
pub mod logging;
pub mod memory;
pub mod menu;
pub mod metrics;
pub mod model;
pub mod reports;
pub mod rocksdb;
pub mod seed;
pub mod session;
pub mod status;
pub mod surrealkv;

pub use batch::{BatchResponse, OperationKind, OperationResult, TransactionalBatch};
pub use client::{ItemOptions, ItemResponse, PartitionKey, QueryResponse, Store};
pub use coordinator::{CountPolicy, GroupedWriteOutcome, OrderCoordinator, OrderError};
pub use engine::ContainerConfig;
pub use memory::MemoryStore;
pub use model::{CustomerAggregate, LineItem, Product, ProductCategory, SalesOrder};
pub use status::{StatusCode, StoreError};
