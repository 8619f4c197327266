use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::catalog::{self, CategoryRename};
use crate::client::Store;
use crate::coordinator::{CountPolicy, GroupedWriteOutcome, OrderCoordinator};
use crate::database::Containers;
use crate::metrics::{ConcurrentMetrics, Metered, Metrics};
use crate::model::SalesOrder;
use crate::reports;
use crate::seed::{self, SeedConfig};

/// One user session against the database: every action goes through metered
/// stores sharing one statistics table, printed on exit. Actions return their
/// rendered output.
pub struct Session<S> {
    coordinator: OrderCoordinator<Metered<S>>,
    categories: Metered<S>,
    products: Metered<S>,
    metrics: ConcurrentMetrics,
}

fn pretty<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("failed to render JSON")
}

impl<S: Store> Session<S> {
    pub fn new(containers: Containers<S>, policy: CountPolicy) -> Self {
        let metrics = ConcurrentMetrics::default();
        let meter = |store: S| Metered::with_metrics(store, metrics.clone());
        let customers = meter(containers.customers);
        let categories = meter(containers.categories);
        let products = meter(containers.products);
        Self {
            coordinator: OrderCoordinator::new(customers, policy),
            categories,
            products,
            metrics,
        }
    }

    fn store(&self) -> &Metered<S> {
        self.coordinator.store()
    }

    pub async fn customer(&self, customer_id: &str) -> Result<String> {
        let customer = reports::customer(self.store(), customer_id).await?;
        pretty(&customer)
    }

    /// The customer document as returned by a partition query.
    pub async fn query_customer(&self, customer_id: &str) -> Result<String> {
        info!(customer_id, "Querying customer");
        let (customer, _) = reports::customer_with_orders(self.store(), customer_id).await?;
        match customer {
            Some(customer) => pretty(&customer),
            None => Ok(format!("No customer found with id [{customer_id}]")),
        }
    }

    pub async fn orders(&self, customer_id: &str) -> Result<String> {
        let orders = reports::orders_for_customer(self.store(), customer_id).await?;
        if orders.is_empty() {
            return Ok(format!("No orders found for customer [{customer_id}]"));
        }
        let rendered = orders.iter().map(pretty).collect::<Result<Vec<_>>>()?;
        Ok(rendered.join("\n"))
    }

    pub async fn customer_with_orders(&self, customer_id: &str) -> Result<String> {
        let (customer, orders) = reports::customer_with_orders(self.store(), customer_id).await?;
        let mut out = Vec::with_capacity(orders.len() + 1);
        match customer {
            Some(customer) => out.push(format!("Customer:\n{}", pretty(&customer)?)),
            None => out.push(format!("No customer found with id [{customer_id}]")),
        }
        for order in &orders {
            out.push(format!("Sales Order:\n{}", pretty(order)?));
        }
        Ok(out.join("\n"))
    }

    pub async fn record_order(&self, customer_id: &str, order: &SalesOrder) -> Result<GroupedWriteOutcome> {
        let outcome = self
            .coordinator
            .record_order(customer_id, order)
            .await
            .with_context(|| format!("failed to record order [{}]", order.id))?;
        Ok(outcome)
    }

    pub async fn delete_order(&self, customer_id: &str, order_id: &str) -> Result<GroupedWriteOutcome> {
        let outcome = self
            .coordinator
            .remove_order(customer_id, order_id)
            .await
            .with_context(|| format!("failed to delete order [{order_id}]"))?;
        Ok(outcome)
    }

    pub async fn top_customers(&self, limit: usize) -> Result<String> {
        let customers = reports::top_customers(self.store(), limit).await?;
        let rendered = customers.iter().map(pretty).collect::<Result<Vec<_>>>()?;
        Ok(rendered.join("\n"))
    }

    pub async fn categories(&self) -> Result<String> {
        let categories = catalog::list_categories(&self.categories).await?;
        let rendered = categories.iter().map(pretty).collect::<Result<Vec<_>>>()?;
        Ok(rendered.join("\n"))
    }

    pub async fn products(&self, category_id: &str) -> Result<String> {
        let products = catalog::products_in_category(&self.products, category_id).await?;
        if products.is_empty() {
            return Ok(format!("No products found for category [{category_id}]"));
        }
        let rendered = products.iter().map(pretty).collect::<Result<Vec<_>>>()?;
        Ok(rendered.join("\n"))
    }

    pub async fn category_counts(&self, category_id: &str) -> Result<String> {
        let counts = catalog::category_product_counts(&self.products, category_id).await?;
        if counts.is_empty() {
            return Ok(format!("No products found for category [{category_id}]"));
        }
        Ok(counts
            .iter()
            .map(|row| format!("{}: {} products", row.category_name, row.product_count))
            .collect::<Vec<_>>()
            .join("\n"))
    }

    pub async fn rename_category(&self, category_id: &str, name: &str) -> Result<CategoryRename> {
        catalog::rename_category(&self.categories, &self.products, category_id, name).await
    }

    pub async fn seed(&self, config: &SeedConfig) -> Result<String> {
        let mut report = seed::seed(self.store(), config).await?;
        report.merge(seed::seed_catalog(&self.categories, &self.products).await?);
        Ok(format!(
            "Created {} items ({} already present). Total RUs consumed: {:.2} in {:.3} seconds",
            report.created,
            report.skipped,
            report.request_charge,
            report.elapsed.as_secs_f64()
        ))
    }

    pub async fn metrics(&self) -> Metrics {
        self.metrics.get_metrics().await
    }
}
