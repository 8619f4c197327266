use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use anyhow::{bail, Context, Result};
use serde_json::Value;
use tracing::info;

use crate::batch::{TransactionalBatch, MAX_BATCH_OPERATIONS};
use crate::client::{ItemOptions, PartitionKey, Store};
use crate::model::{CategoryProductCount, Product, ProductCategory, CATEGORY_TYPE};

/// Every category document lives in this partition of the category container.
pub const CATEGORY_PARTITION: &str = CATEGORY_TYPE;

fn category_partition() -> PartitionKey {
    PartitionKey::new(CATEGORY_PARTITION)
}

/// All product categories, ordered by name.
pub async fn list_categories<S: Store + ?Sized>(store: &S) -> Result<Vec<ProductCategory>> {
    let response = store.query_partition(&category_partition()).await?;
    info!(
        items = response.items.len(),
        request_charge = response.request_charge,
        "Category page received"
    );

    let mut categories = response
        .items
        .into_iter()
        .filter(|item| item.get("type").and_then(Value::as_str) == Some(CATEGORY_TYPE))
        .map(serde_json::from_value::<ProductCategory>)
        .collect::<Result<Vec<_>, _>>()
        .context("malformed category")?;
    categories.sort_by(|a, b| a.value.cmp(&b.value).then_with(|| a.id.cmp(&b.id)));
    Ok(categories)
}

pub async fn category<S: Store + ?Sized>(store: &S, category_id: &str) -> Result<ProductCategory> {
    let response = store.read_item(&category_partition(), category_id).await?;
    response
        .json()
        .with_context(|| format!("category [{category_id}] is not a valid category document"))
}

/// Products of one category; the category id is the product partition key.
pub async fn products_in_category<S: Store + ?Sized>(
    store: &S,
    category_id: &str,
) -> Result<Vec<Product>> {
    let response = store
        .query_partition(&PartitionKey::new(category_id))
        .await?;
    info!(
        category_id,
        items = response.items.len(),
        request_charge = response.request_charge,
        "Product page received"
    );

    let mut products = response
        .items
        .into_iter()
        .map(serde_json::from_value::<Product>)
        .collect::<Result<Vec<_>, _>>()
        .context("malformed product")?;
    products.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
    Ok(products)
}

/// Product counts of a category grouped by the category name each product
/// carries. More than one row means a rename has not reached every product.
pub async fn category_product_counts<S: Store + ?Sized>(
    store: &S,
    category_id: &str,
) -> Result<Vec<CategoryProductCount>> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for product in products_in_category(store, category_id).await? {
        *counts.entry(product.category_name).or_default() += 1;
    }
    Ok(counts
        .into_iter()
        .map(|(category_name, product_count)| CategoryProductCount {
            category_name,
            product_count,
        })
        .collect())
}

#[derive(Debug, Clone)]
pub struct CategoryRename {
    pub category: ProductCategory,
    pub previous_name: String,
    pub products_updated: usize,
    pub request_charge: f64,
}

impl Display for CategoryRename {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Category {} renamed from [{}] to [{}]; {} products updated. Consumed {:.2} RU",
            self.category.id,
            self.previous_name,
            self.category.value,
            self.products_updated,
            self.request_charge
        )
    }
}

/// Rename a category and copy the new name onto its products.
///
/// The category is replaced under the etag it was read with. Products are
/// then rewritten in grouped writes of at most [`MAX_BATCH_OPERATIONS`]; only
/// products still carrying another name are touched, so repeating a rename
/// that failed part way completes it.
pub async fn rename_category<C, P>(
    categories: &C,
    products: &P,
    category_id: &str,
    name: &str,
) -> Result<CategoryRename>
where
    C: Store + ?Sized,
    P: Store + ?Sized,
{
    let name = name.trim();
    if name.is_empty() {
        bail!("category name must not be empty");
    }

    let partition_key = category_partition();
    let read = categories
        .read_item(&partition_key, category_id)
        .await
        .with_context(|| format!("failed to read category [{category_id}]"))?;
    let mut category: ProductCategory = read
        .json()
        .with_context(|| format!("category [{category_id}] is not a valid category document"))?;
    let etag = read
        .etag
        .clone()
        .with_context(|| format!("category [{category_id}] has no etag"))?;

    let previous_name = std::mem::replace(&mut category.value, name.to_string());
    let replaced = categories
        .replace_item(
            &partition_key,
            category_id,
            serde_json::to_vec(&category)?,
            ItemOptions::if_match(etag),
        )
        .await
        .with_context(|| format!("failed to rename category [{category_id}]"))?;
    if let Some(etag) = &replaced.etag {
        category
            .fields
            .insert("_etag".to_string(), Value::String(etag.clone()));
    }
    let mut request_charge = read.request_charge + replaced.request_charge;
    info!(category_id, previous = %previous_name, name, "Category renamed");

    let product_key = PartitionKey::new(category_id);
    let listed = products.query_partition(&product_key).await?;
    request_charge += listed.request_charge;
    let stale: Vec<Value> = listed
        .items
        .into_iter()
        .filter(|item| item.get("categoryName").and_then(Value::as_str) != Some(name))
        .collect();

    for chunk in stale.chunks(MAX_BATCH_OPERATIONS) {
        let mut batch = TransactionalBatch::new(product_key.clone());
        for item in chunk {
            let mut item = item.clone();
            let id = item
                .get("id")
                .and_then(Value::as_str)
                .map(str::to_owned)
                .context("product without an id")?;
            let options = item
                .get("_etag")
                .and_then(Value::as_str)
                .map(ItemOptions::if_match)
                .unwrap_or_default();
            if let Some(fields) = item.as_object_mut() {
                fields.insert("categoryName".to_string(), Value::from(name));
            }
            batch.replace_item(id, serde_json::to_vec(&item)?, options);
        }

        let response = products.execute_batch(batch).await?;
        request_charge += response.request_charge();
        if let Some((index, failed)) = response.first_failure() {
            bail!(
                "updating products of category [{category_id}] failed at operation {index} with status {}",
                failed.status
            );
        }
    }
    info!(category_id, products = stale.len(), "Category name propagated");

    Ok(CategoryRename {
        category,
        previous_name,
        products_updated: stale.len(),
        request_charge,
    })
}
