use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{Duration as ChronoDuration, NaiveDate};
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::client::{PartitionKey, Store};
use crate::model::{
    LineItem, SalesOrder, CATEGORY_TYPE, CUSTOMER_TYPE, DATE_FORMAT, SALES_ORDER_TYPE,
};

/// Customer used by the order menu actions by default.
pub const DEMO_CUSTOMER_ID: &str = "54AB87A7-BDB9-4FAE-A668-AA9F43E26628";
/// Customer used by the point-read menu action by default.
pub const LOOKUP_CUSTOMER_ID: &str = "FFCAE1E9-7E8D-457B-8435-BB7992C6D8BF";

/// Category used by the product menu actions by default.
pub const TIRES_CATEGORY_ID: &str = "86F3CBAB-97A7-4D01-BABB-ADEFFFAED6B4";
/// Seeded name of [`TIRES_CATEGORY_ID`].
pub const TIRES_CATEGORY_NAME: &str = "Accessories, Tires and Tubes";
/// Name the rename menu action switches [`TIRES_CATEGORY_ID`] to.
pub const TIRES_CATEGORY_RENAMED: &str = "Accessories, Tires & Tubes";

const CATEGORIES: &[(&str, &str)] = &[
    (TIRES_CATEGORY_ID, TIRES_CATEGORY_NAME),
    ("14A1AD5D-59EA-4B7D-81D8-EE8B1A3F7E1B", "Accessories, Bottles and Cages"),
    ("C3C57C35-1D80-4EC5-AB12-46C57A017AFB", "Accessories, Helmets"),
    ("AE48F0AA-4F65-4734-A4CF-D48B8F82267F", "Bikes, Road Bikes"),
    ("34340561-3D26-4F33-B6AD-09260FC811D6", "Clothing, Gloves"),
];

/// (id, category id, sku, name, price)
const CATALOG: &[(&str, &str, &str, &str, f64)] = &[
    ("0E4D7CDA-5C7C-4F7B-9FC5-7CD16A8C4B47", TIRES_CATEGORY_ID, "TI-T723", "Touring Tire", 28.99),
    ("1B1D3F2C-8B4A-4F8E-9A8C-64E4C7C0B5A1", TIRES_CATEGORY_ID, "TT-T092", "Touring Tire Tube", 4.99),
    ("2C5A7F0D-3E1B-4D6A-8F2E-1A9B6C3D7E50", TIRES_CATEGORY_ID, "TI-R628", "ML Road Tire", 24.99),
    ("3D8E1A4B-6F2C-4B7D-9E3A-2B8C7D4E1F62", TIRES_CATEGORY_ID, "TT-M928", "Mountain Tire Tube", 4.99),
    ("4E9F2B5C-7A3D-4C8E-8F4B-3C9D8E5F2A73", TIRES_CATEGORY_ID, "PK-7098", "Patch Kit/8 Patches", 2.29),
    ("5FA03C6D-8B4E-4D9F-9A5C-4DAE9F6A3B84", "14A1AD5D-59EA-4B7D-81D8-EE8B1A3F7E1B", "BC-M005", "Mountain Bottle Cage", 9.99),
    ("60B14D7E-9C5F-4EA0-8B6D-5EBFA07B4C95", "14A1AD5D-59EA-4B7D-81D8-EE8B1A3F7E1B", "WB-H098", "Water Bottle - 30 oz.", 4.99),
    ("71C25E8F-AD60-4FB1-9C7E-6FC0B18C5DA6", "C3C57C35-1D80-4EC5-AB12-46C57A017AFB", "HL-U509-B", "Sport-100 Helmet, Blue", 34.99),
    ("82D36F90-BE71-40C2-8D8F-70D1C29D6EB7", "C3C57C35-1D80-4EC5-AB12-46C57A017AFB", "HL-U509-R", "Sport-100 Helmet, Red", 34.99),
    ("93E470A1-CF82-41D3-9E90-81E2D3AE7FC8", "AE48F0AA-4F65-4734-A4CF-D48B8F82267F", "BK-R64Y-42", "Road-550-W Yellow, 42", 1120.49),
    ("A4F581B2-D093-42E4-8FA1-92F3E4BF80D9", "34340561-3D26-4F33-B6AD-09260FC811D6", "GL-H102-M", "Half-Finger Gloves, M", 24.49),
];

const PRODUCTS: &[(&str, &str, f64)] = &[
    ("BK-R64Y-42", "Road-550-W Yellow, 42", 1120.49),
    ("HL-U509-B", "Sport-100 Helmet, Blue", 34.99),
    ("HL-U509-R", "Sport-100 Helmet, Red", 34.99),
    ("BK-M82B-44", "Mountain-100 Black, 44", 3374.99),
    ("TI-T723", "Touring Tire", 28.99),
    ("TT-T092", "Touring Tire Tube", 4.99),
    ("BC-M005", "Mountain Bottle Cage", 9.99),
    ("WB-H098", "Water Bottle - 30 oz.", 4.99),
    ("LJ-0192-L", "Long-Sleeve Logo Jersey, L", 49.99),
    ("GL-H102-M", "Half-Finger Gloves, M", 24.49),
];

const FIRST_NAMES: &[&str] = &[
    "Ada", "Alan", "Grace", "Edsger", "Barbara", "Donald", "Frances", "Ken", "Margaret", "Niklaus",
];

const LAST_NAMES: &[&str] = &[
    "Lovelace", "Turing", "Hopper", "Dijkstra", "Liskov", "Knuth", "Allen", "Thompson",
    "Hamilton", "Wirth",
];

#[derive(Debug, Clone)]
pub struct SeedConfig {
    /// Random customers added on top of the two demo customers.
    pub customer_count: u32,
    pub max_orders_per_customer: u32,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            customer_count: 25,
            max_orders_per_customer: 5,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SeedReport {
    pub created: usize,
    pub skipped: usize,
    pub request_charge: f64,
    pub elapsed: Duration,
}

/// The order the "create new order" menu action records: two line items for
/// the given customer under a fresh id.
pub fn sample_order(customer_id: &str) -> SalesOrder {
    let mut order = SalesOrder::new(
        customer_id,
        vec![line_item(PRODUCTS[0], 1), line_item(PRODUCTS[1], 1)],
    );
    order.ship_date = ship_date(&order.order_date, 7);
    order
}

fn line_item((sku, name, price): (&str, &str, f64), quantity: u32) -> LineItem {
    LineItem {
        sku: sku.to_string(),
        name: name.to_string(),
        price,
        quantity,
    }
}

fn ship_date(order_date: &str, days: i64) -> Option<String> {
    chrono::NaiveDateTime::parse_from_str(order_date, DATE_FORMAT)
        .ok()
        .map(|date| (date + ChronoDuration::days(days)).format(DATE_FORMAT).to_string())
}

fn customer_doc(id: &str, first: &str, last: &str, order_count: usize) -> Value {
    let email = format!("{}.{}@adventure-works.com", first.to_lowercase(), last.to_lowercase());
    json!({
        "id": id,
        "customerId": id,
        "type": CUSTOMER_TYPE,
        "title": "",
        "firstName": first,
        "lastName": last,
        "emailAddress": email,
        "phoneNumber": "425-555-0100",
        "creationDate": "2014-02-16T00:00:00",
        "addresses": [{
            "addressLine1": "1 Microsoft Way",
            "addressLine2": "",
            "city": "Redmond",
            "state": "WA",
            "country": "US",
            "zipCode": "98052"
        }],
        "password": {"hash": "", "salt": ""},
        "salesOrderCount": order_count.to_string()
    })
}

fn order(id: &str, customer_id: &str, order_date: String, details: Vec<LineItem>) -> SalesOrder {
    let ship_date = ship_date(&order_date, 7);
    SalesOrder {
        id: id.to_string(),
        kind: SALES_ORDER_TYPE.to_string(),
        customer_id: customer_id.to_string(),
        order_date,
        ship_date,
        details,
    }
}

fn demo_documents() -> Result<Vec<Value>> {
    let orders = [
        order(
            "000C23D8-B8BC-432E-9213-6473DFDA2BC5",
            DEMO_CUSTOMER_ID,
            "2014-02-16T00:00:00".to_string(),
            vec![line_item(PRODUCTS[0], 1), line_item(PRODUCTS[1], 1)],
        ),
        order(
            "5A8D1B86-9E8E-4F47-8A4B-C04DD3B2BE3A",
            DEMO_CUSTOMER_ID,
            "2014-06-02T00:00:00".to_string(),
            vec![line_item(PRODUCTS[4], 2), line_item(PRODUCTS[5], 2)],
        ),
    ];

    let mut docs = vec![
        customer_doc(DEMO_CUSTOMER_ID, "Franklin", "Ye", orders.len()),
        customer_doc(LOOKUP_CUSTOMER_ID, "Eva", "Corets", 0),
    ];
    for order in &orders {
        docs.push(serde_json::to_value(order)?);
    }
    Ok(docs)
}

fn random_documents<R: Rng>(rng: &mut R, config: &SeedConfig) -> Result<Vec<Value>> {
    let epoch = NaiveDate::from_ymd_opt(2013, 1, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .ok_or_else(|| anyhow::anyhow!("invalid seed epoch"))?;

    let mut docs = Vec::new();
    for _ in 0..config.customer_count {
        let customer_id = Uuid::new_v4().to_string().to_uppercase();
        let first = FIRST_NAMES.choose(rng).copied().unwrap_or("Pat");
        let last = LAST_NAMES.choose(rng).copied().unwrap_or("Doe");
        let order_count = rng.gen_range(0..=config.max_orders_per_customer) as usize;
        docs.push(customer_doc(&customer_id, first, last, order_count));

        for _ in 0..order_count {
            let lines = rng.gen_range(1..=3);
            let details = PRODUCTS
                .choose_multiple(rng, lines)
                .map(|product| line_item(*product, rng.gen_range(1..=4)))
                .collect();
            let date = epoch + ChronoDuration::days(rng.gen_range(0..730));
            let order = order(
                &Uuid::new_v4().to_string().to_uppercase(),
                &customer_id,
                date.format(DATE_FORMAT).to_string(),
                details,
            );
            docs.push(serde_json::to_value(&order)?);
        }
    }
    Ok(docs)
}

fn category_documents() -> Vec<Value> {
    CATEGORIES
        .iter()
        .map(|(id, name)| json!({"id": id, "type": CATEGORY_TYPE, "value": name}))
        .collect()
}

fn product_documents() -> Vec<Value> {
    CATALOG
        .iter()
        .map(|(id, category_id, sku, name, price)| {
            let category_name = CATEGORIES
                .iter()
                .find(|(category, _)| category == category_id)
                .map_or("", |(_, name)| *name);
            json!({
                "id": id,
                "categoryId": category_id,
                "categoryName": category_name,
                "sku": sku,
                "name": name,
                "description": format!("The product called \"{name}\""),
                "price": price,
                "tags": []
            })
        })
        .collect()
}

impl SeedReport {
    pub fn merge(&mut self, other: SeedReport) {
        self.created += other.created;
        self.skipped += other.skipped;
        self.request_charge += other.request_charge;
        self.elapsed += other.elapsed;
    }
}

/// Create each document under the partition named by `partition_field`,
/// counting existing ids as skipped.
async fn insert_all<S: Store + ?Sized>(
    store: &S,
    docs: Vec<Value>,
    partition_field: &str,
) -> Result<SeedReport> {
    let start = Instant::now();
    let mut report = SeedReport::default();
    for doc in docs {
        let partition_key = doc
            .get(partition_field)
            .and_then(Value::as_str)
            .map(PartitionKey::new)
            .ok_or_else(|| anyhow::anyhow!("seed document has no {partition_field}"))?;
        let id = doc.get("id").and_then(Value::as_str).unwrap_or_default().to_string();

        match store.create_item(&partition_key, serde_json::to_vec(&doc)?).await {
            Ok(response) => {
                report.created += 1;
                report.request_charge += response.request_charge;
            }
            Err(err) if err.is_conflict() => {
                debug!(id = %id, "Item already exists");
                report.skipped += 1;
            }
            Err(err) => return Err(err.into()),
        }
    }
    report.elapsed = start.elapsed();
    Ok(report)
}

/// Load the product categories and their products.
pub async fn seed_catalog<C, P>(categories: &C, products: &P) -> Result<SeedReport>
where
    C: Store + ?Sized,
    P: Store + ?Sized,
{
    let mut report = insert_all(categories, category_documents(), "type").await?;
    report.merge(insert_all(products, product_documents(), "categoryId").await?);
    info!(
        created = report.created,
        skipped = report.skipped,
        "Catalog loaded"
    );
    Ok(report)
}

/// Load the demo customers plus `config.customer_count` random customers with
/// orders. Items that already exist are left untouched, so seeding twice is
/// harmless.
pub async fn seed<S: Store + ?Sized>(store: &S, config: &SeedConfig) -> Result<SeedReport> {
    let mut docs = demo_documents()?;
    docs.extend(random_documents(&mut rand::thread_rng(), config)?);
    let report = insert_all(store, docs, "customerId").await?;

    info!(
        created = report.created,
        skipped = report.skipped,
        "Total RUs consumed: {:.2} in {:.3} seconds",
        report.request_charge,
        report.elapsed.as_secs_f64()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use crate::engine::ContainerConfig;
    use crate::memory::MemoryStore;
    use crate::reports;

    #[tokio::test]
    async fn seeding_is_idempotent_for_demo_data() {
        let store = MemoryStore::default();
        let config = SeedConfig {
            customer_count: 0,
            max_orders_per_customer: 0,
        };

        let first = seed(&store, &config).await.unwrap();
        assert_eq!(first.created, 4);
        assert!(first.request_charge > 0.0);

        let second = seed(&store, &config).await.unwrap();
        assert_eq!(second.created, 0);
        assert_eq!(second.skipped, 4);
    }

    #[tokio::test]
    async fn random_customers_have_matching_order_counts() {
        let store = MemoryStore::default();
        let config = SeedConfig {
            customer_count: 8,
            max_orders_per_customer: 3,
        };
        seed(&store, &config).await.unwrap();

        let customers = reports::top_customers(&store, 100).await.unwrap();
        assert_eq!(customers.len(), 10);

        let demo = reports::customer(&store, DEMO_CUSTOMER_ID).await.unwrap();
        assert_eq!(demo.sales_order_count().unwrap(), 2);
        let orders = reports::orders_for_customer(&store, DEMO_CUSTOMER_ID)
            .await
            .unwrap();
        assert_eq!(orders.len(), 2);
    }

    #[test]
    fn sample_order_is_ready_to_record() {
        let order = sample_order(DEMO_CUSTOMER_ID);
        assert_eq!(order.customer_id, DEMO_CUSTOMER_ID);
        assert_eq!(order.kind, SALES_ORDER_TYPE);
        assert_eq!(order.details.len(), 2);
        assert!(!order.id.is_empty());
        assert!(order.ship_date.is_some());
    }

    #[tokio::test]
    async fn catalog_products_carry_their_category_name() {
        let categories = MemoryStore::new(ContainerConfig::product_categories());
        let products = MemoryStore::new(ContainerConfig::products());

        let first = seed_catalog(&categories, &products).await.unwrap();
        assert_eq!(first.created, CATEGORIES.len() + CATALOG.len());
        let again = seed_catalog(&categories, &products).await.unwrap();
        assert_eq!(again.skipped, first.created);

        let tires = catalog::products_in_category(&products, TIRES_CATEGORY_ID)
            .await
            .unwrap();
        assert_eq!(tires.len(), 5);
        assert!(tires.iter().all(|p| p.category_name == TIRES_CATEGORY_NAME));
        assert_eq!(catalog::list_categories(&categories).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn customer_documents_need_the_customer_layout() {
        let store = MemoryStore::new(ContainerConfig::products());
        let config = SeedConfig {
            customer_count: 0,
            max_orders_per_customer: 0,
        };
        assert!(seed(&store, &config).await.is_err());
        assert!(store.is_empty().await);
    }
}
