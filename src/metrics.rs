use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::batch::{BatchResponse, TransactionalBatch};
use crate::client::{ItemOptions, ItemResponse, PartitionKey, QueryResponse, Store};
use crate::status::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RequestKind {
    PointRead,
    Create,
    Replace,
    Delete,
    Query,
    Scan,
    Batch,
}

impl RequestKind {
    fn label(self) -> &'static str {
        match self {
            RequestKind::PointRead => "Point reads",
            RequestKind::Create => "Creates",
            RequestKind::Replace => "Replaces",
            RequestKind::Delete => "Deletes",
            RequestKind::Query => "Queries",
            RequestKind::Scan => "Scans",
            RequestKind::Batch => "Batches",
        }
    }
}

#[derive(Debug, Default, Clone)]
struct Samples {
    latencies: Vec<Duration>,
    request_charge: f64,
    failures: u64,
}

/// Request latencies and charges gathered over one session.
#[derive(Debug, Default, Clone)]
pub struct Metrics {
    samples: BTreeMap<RequestKind, Samples>,
}

#[derive(Default, Clone)]
pub struct ConcurrentMetrics {
    metrics: Arc<Mutex<Metrics>>,
}

impl ConcurrentMetrics {
    pub async fn record(&self, kind: RequestKind, duration: Duration, request_charge: f64) {
        self.metrics.lock().await.record(kind, duration, request_charge);
    }

    pub async fn record_failure(&self, kind: RequestKind) {
        self.metrics.lock().await.record_failure(kind);
    }

    pub async fn get_metrics(&self) -> Metrics {
        self.metrics.lock().await.clone()
    }
}

impl Metrics {
    pub fn record(&mut self, kind: RequestKind, duration: Duration, request_charge: f64) {
        let samples = self.samples.entry(kind).or_default();
        samples.latencies.push(duration);
        samples.request_charge += request_charge;
    }

    pub fn record_failure(&mut self, kind: RequestKind) {
        self.samples.entry(kind).or_default().failures += 1;
    }

    pub fn count(&self, kind: RequestKind) -> usize {
        self.samples
            .get(&kind)
            .map_or(0, |samples| samples.latencies.len())
    }

    pub fn failures(&self, kind: RequestKind) -> u64 {
        self.samples.get(&kind).map_or(0, |samples| samples.failures)
    }

    pub fn total_request_charge(&self) -> f64 {
        self.samples.values().map(|s| s.request_charge).sum()
    }

    fn format_duration(nanos: f64) -> String {
        if nanos < 1_000.0 {
            format!("{:.2} ns", nanos)
        } else if nanos < 1_000_000.0 {
            format!("{:.2} µs", nanos / 1_000.0)
        } else if nanos < 1_000_000_000.0 {
            format!("{:.2} ms", nanos / 1_000_000.0)
        } else {
            format!("{:.2} s", nanos / 1_000_000_000.0)
        }
    }

    /// (min, median, p95, max) of a non-empty sample set.
    fn calculate_stats(latencies: &[Duration]) -> (String, String, String, String) {
        let mut sorted = latencies.to_vec();
        sorted.sort_unstable();

        let count = sorted.len();
        let p50_idx = (count - 1) * 50 / 100;
        let p95_idx = (count - 1) * 95 / 100;

        (
            Self::format_duration(sorted[0].as_nanos() as f64),
            Self::format_duration(sorted[p50_idx].as_nanos() as f64),
            Self::format_duration(sorted[p95_idx].as_nanos() as f64),
            Self::format_duration(sorted[count - 1].as_nanos() as f64),
        )
    }
}

impl Display for Metrics {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\nSession Request Statistics:")?;
        writeln!(
            f,
            "{:<13} {:<7} {:<9} {:<12} {:<12} {:<12} {:<12} {:<10}",
            "Operation", "Count", "Failures", "Min", "Median", "P95", "Max", "RU"
        )?;
        writeln!(f, "{:-<93}", "")?;

        for (kind, samples) in &self.samples {
            let (min, p50, p95, max) = if samples.latencies.is_empty() {
                let na = "N/A".to_string();
                (na.clone(), na.clone(), na.clone(), na)
            } else {
                Self::calculate_stats(&samples.latencies)
            };
            writeln!(
                f,
                "{:<13} {:<7} {:<9} {:<12} {:<12} {:<12} {:<12} {:<10.2}",
                kind.label(),
                samples.latencies.len(),
                samples.failures,
                min,
                p50,
                p95,
                max,
                samples.request_charge
            )?;
        }

        write!(f, "Total request charge: {:.2} RU", self.total_request_charge())
    }
}

/// Store decorator that records latency and request charge of every call.
#[derive(Clone)]
pub struct Metered<S> {
    inner: S,
    metrics: ConcurrentMetrics,
}

impl<S: Store> Metered<S> {
    pub fn new(inner: S) -> Self {
        Self::with_metrics(inner, ConcurrentMetrics::default())
    }

    /// Record into `metrics`, which may be shared with other stores.
    pub fn with_metrics(inner: S, metrics: ConcurrentMetrics) -> Self {
        Self { inner, metrics }
    }

    pub fn metrics(&self) -> &ConcurrentMetrics {
        &self.metrics
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn observe<T>(
        &self,
        kind: RequestKind,
        start: Instant,
        result: Result<T, StoreError>,
        charge: impl Fn(&T) -> f64,
    ) -> Result<T, StoreError> {
        match &result {
            Ok(value) => self.metrics.record(kind, start.elapsed(), charge(value)).await,
            Err(_) => self.metrics.record_failure(kind).await,
        }
        result
    }
}

#[async_trait]
impl<S: Store> Store for Metered<S> {
    async fn execute_batch(&self, batch: TransactionalBatch) -> Result<BatchResponse, StoreError> {
        let start = Instant::now();
        let result = self.inner.execute_batch(batch).await;
        let result = self
            .observe(RequestKind::Batch, start, result, BatchResponse::request_charge)
            .await;
        // A rejected batch still costs request units but counts as failed.
        if matches!(&result, Ok(response) if !response.success) {
            self.metrics.record_failure(RequestKind::Batch).await;
        }
        result
    }

    async fn query_partition(
        &self,
        partition_key: &PartitionKey,
    ) -> Result<QueryResponse, StoreError> {
        let start = Instant::now();
        let result = self.inner.query_partition(partition_key).await;
        self.observe(RequestKind::Query, start, result, |r| r.request_charge)
            .await
    }

    async fn scan_items(&self) -> Result<QueryResponse, StoreError> {
        let start = Instant::now();
        let result = self.inner.scan_items().await;
        self.observe(RequestKind::Scan, start, result, |r| r.request_charge)
            .await
    }

    async fn read_item(
        &self,
        partition_key: &PartitionKey,
        id: &str,
    ) -> Result<ItemResponse, StoreError> {
        let start = Instant::now();
        let result = self.inner.read_item(partition_key, id).await;
        self.observe(RequestKind::PointRead, start, result, |r| r.request_charge)
            .await
    }

    async fn create_item(
        &self,
        partition_key: &PartitionKey,
        body: Vec<u8>,
    ) -> Result<ItemResponse, StoreError> {
        let start = Instant::now();
        let result = self.inner.create_item(partition_key, body).await;
        self.observe(RequestKind::Create, start, result, |r| r.request_charge)
            .await
    }

    async fn replace_item(
        &self,
        partition_key: &PartitionKey,
        id: &str,
        body: Vec<u8>,
        options: ItemOptions,
    ) -> Result<ItemResponse, StoreError> {
        let start = Instant::now();
        let result = self.inner.replace_item(partition_key, id, body, options).await;
        self.observe(RequestKind::Replace, start, result, |r| r.request_charge)
            .await
    }

    async fn delete_item(
        &self,
        partition_key: &PartitionKey,
        id: &str,
        options: ItemOptions,
    ) -> Result<ItemResponse, StoreError> {
        let start = Instant::now();
        let result = self.inner.delete_item(partition_key, id, options).await;
        self.observe(RequestKind::Delete, start, result, |r| r.request_charge)
            .await
    }
}
