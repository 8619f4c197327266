use anyhow::{Context, Result};
use serde_json::Value;
use tracing::info;

use crate::client::{PartitionKey, Store};
use crate::model::{CustomerAggregate, CustomerSummary, SalesOrder, CUSTOMER_TYPE, SALES_ORDER_TYPE};

fn is_type(item: &Value, kind: &str) -> bool {
    item.get("type").and_then(Value::as_str) == Some(kind)
}

/// Point read of a customer; the customer id is also its partition key.
pub async fn customer<S: Store + ?Sized>(store: &S, customer_id: &str) -> Result<CustomerAggregate> {
    let response = store
        .read_item(&PartitionKey::new(customer_id), customer_id)
        .await?;
    info!(
        customer_id,
        status = %response.status,
        request_charge = response.request_charge,
        "Item read"
    );
    response
        .json()
        .with_context(|| format!("customer [{customer_id}] is not a valid customer document"))
}

/// The customer document and its orders, from a single partition query.
pub async fn customer_with_orders<S: Store + ?Sized>(
    store: &S,
    customer_id: &str,
) -> Result<(Option<CustomerAggregate>, Vec<SalesOrder>)> {
    let response = store
        .query_partition(&PartitionKey::new(customer_id))
        .await?;
    info!(
        items = response.items.len(),
        request_charge = response.request_charge,
        "Query page received"
    );

    let mut customer: Option<CustomerAggregate> = None;
    let mut orders: Vec<SalesOrder> = Vec::new();
    for item in response.items {
        if is_type(&item, SALES_ORDER_TYPE) {
            orders.push(serde_json::from_value(item).context("malformed sales order")?);
        } else if is_type(&item, CUSTOMER_TYPE) {
            customer = Some(serde_json::from_value(item).context("malformed customer")?);
        }
    }
    orders.sort_by(|a, b| {
        a.order_date
            .cmp(&b.order_date)
            .then_with(|| a.id.cmp(&b.id))
    });
    Ok((customer, orders))
}

pub async fn orders_for_customer<S: Store + ?Sized>(
    store: &S,
    customer_id: &str,
) -> Result<Vec<SalesOrder>> {
    let (_, orders) = customer_with_orders(store, customer_id).await?;
    Ok(orders)
}

/// Customers with the most orders, highest first. Counts that do not parse
/// rank as zero.
pub async fn top_customers<S: Store + ?Sized>(store: &S, limit: usize) -> Result<Vec<CustomerSummary>> {
    let response = store.scan_items().await?;
    info!(
        items = response.items.len(),
        request_charge = response.request_charge,
        "Cross-partition scan received"
    );

    let mut summaries = Vec::new();
    for item in response.items.into_iter().filter(|item| is_type(item, CUSTOMER_TYPE)) {
        let customer: CustomerAggregate =
            serde_json::from_value(item).context("malformed customer")?;
        summaries.push(CustomerSummary {
            first_name: customer.field_str("firstName").unwrap_or_default().to_string(),
            last_name: customer.field_str("lastName").unwrap_or_default().to_string(),
            sales_order_count: customer.sales_order_count().unwrap_or(0),
        });
    }

    summaries.sort_by(|a, b| {
        b.sales_order_count
            .cmp(&a.sales_order_count)
            .then_with(|| a.last_name.cmp(&b.last_name))
            .then_with(|| a.first_name.cmp(&b.first_name))
    });
    summaries.truncate(limit);
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use serde_json::json;

    async fn put(store: &MemoryStore, doc: Value) {
        let pk = PartitionKey::new(doc["customerId"].as_str().unwrap());
        store
            .create_item(&pk, serde_json::to_vec(&doc).unwrap())
            .await
            .unwrap();
    }

    fn customer_doc(id: &str, first: &str, last: &str, count: &str) -> Value {
        json!({
            "id": id, "customerId": id, "type": "customer",
            "firstName": first, "lastName": last, "salesOrderCount": count
        })
    }

    fn order_doc(id: &str, customer_id: &str, date: &str) -> Value {
        json!({
            "id": id, "customerId": customer_id, "type": "salesOrder",
            "orderDate": date, "details": []
        })
    }

    #[tokio::test]
    async fn splits_customer_and_orders_by_type() {
        let store = MemoryStore::default();
        put(&store, customer_doc("C1", "Ada", "Byron", "2")).await;
        put(&store, order_doc("B", "C1", "2014-03-01T00:00:00")).await;
        put(&store, order_doc("A", "C1", "2014-04-01T00:00:00")).await;
        put(&store, order_doc("Z", "C2", "2014-01-01T00:00:00")).await;

        let (customer, orders) = customer_with_orders(&store, "C1").await.unwrap();
        assert_eq!(customer.unwrap().display_name(), "Ada Byron");
        let ids: Vec<_> = orders.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["B", "A"]);

        let read = super::customer(&store, "C1").await.unwrap();
        assert_eq!(read.sales_order_count().unwrap(), 2);
        assert!(super::customer(&store, "C9").await.is_err());
    }

    #[tokio::test]
    async fn ranks_customers_numerically() {
        let store = MemoryStore::default();
        put(&store, customer_doc("C1", "Ada", "Byron", "9")).await;
        put(&store, customer_doc("C2", "Alan", "Turing", "10")).await;
        put(&store, customer_doc("C3", "Grace", "Hopper", "10")).await;
        put(&store, customer_doc("C4", "Edsger", "Dijkstra", "oops")).await;
        put(&store, order_doc("O1", "C1", "2014-03-01T00:00:00")).await;

        let top = top_customers(&store, 3).await.unwrap();
        let names: Vec<_> = top.iter().map(|c| c.last_name.as_str()).collect();
        assert_eq!(names, vec!["Hopper", "Turing", "Byron"]);
        assert_eq!(top[0].sales_order_count, 10);
    }
}
