use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

pub const SALES_ORDER_TYPE: &str = "salesOrder";
pub const CUSTOMER_TYPE: &str = "customer";
pub const CATEGORY_TYPE: &str = "category";

/// Timestamp layout used by the sample dataset (`2014-02-16T00:00:00`).
pub const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub sku: String,
    pub name: String,
    pub price: f64,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesOrder {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub customer_id: String,
    pub order_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ship_date: Option<String>,
    pub details: Vec<LineItem>,
}

impl SalesOrder {
    /// A new order with a freshly generated id, dated now.
    pub fn new(customer_id: impl Into<String>, details: Vec<LineItem>) -> Self {
        Self {
            id: Uuid::new_v4().to_string().to_uppercase(),
            kind: SALES_ORDER_TYPE.to_string(),
            customer_id: customer_id.into(),
            order_date: chrono::Utc::now().format(DATE_FORMAT).to_string(),
            ship_date: None,
            details,
        }
    }

    pub fn total(&self) -> f64 {
        self.details
            .iter()
            .map(|item| item.price * f64::from(item.quantity))
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CountError {
    #[error("salesOrderCount [{0}] is not a non-negative integer")]
    Invalid(String),
}

/// A customer document. Only `id` and `salesOrderCount` are interpreted; all
/// other properties pass through a read-modify-write untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerAggregate {
    pub id: String,
    #[serde(
        rename = "salesOrderCount",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    sales_order_count: Option<Value>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl CustomerAggregate {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sales_order_count: None,
            fields: Map::new(),
        }
    }

    /// Current order count; absent counts read as zero. Accepts both the
    /// string form (`"2"`) and a JSON number.
    pub fn sales_order_count(&self) -> Result<u64, CountError> {
        match &self.sales_order_count {
            None | Some(Value::Null) => Ok(0),
            Some(Value::String(text)) => text
                .trim()
                .parse()
                .map_err(|_| CountError::Invalid(text.clone())),
            Some(Value::Number(number)) => number
                .as_u64()
                .ok_or_else(|| CountError::Invalid(number.to_string())),
            Some(other) => Err(CountError::Invalid(other.to_string())),
        }
    }

    /// Overwrite the count, keeping the JSON representation it was read in.
    pub fn set_sales_order_count(&mut self, count: u64) {
        let value = match &self.sales_order_count {
            Some(Value::Number(_)) => Value::from(count),
            _ => Value::String(count.to_string()),
        };
        self.sales_order_count = Some(value);
    }

    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    pub fn kind(&self) -> Option<&str> {
        self.field_str("type")
    }

    pub fn display_name(&self) -> String {
        match (self.field_str("firstName"), self.field_str("lastName")) {
            (Some(first), Some(last)) => format!("{first} {last}"),
            (Some(name), None) | (None, Some(name)) => name.to_string(),
            (None, None) => self.id.clone(),
        }
    }
}

/// Projection used by the top-customers report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerSummary {
    pub first_name: String,
    pub last_name: String,
    pub sales_order_count: u64,
}

/// A product category; all categories share the `category` partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductCategory {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Display name of the category.
    pub value: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// A product. `categoryName` is a copy of the owning category's name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub category_id: String,
    pub category_name: String,
    pub sku: String,
    pub name: String,
    pub price: f64,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Number of products in a category carrying a given category name.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryProductCount {
    pub category_name: String,
    pub product_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn customer_keeps_unknown_fields_and_count_representation() {
        let raw = json!({
            "id": "C1",
            "customerId": "C1",
            "type": "customer",
            "firstName": "Franklin",
            "lastName": "Ye",
            "salesOrderCount": "2",
            "addresses": [{"city": "Seattle"}],
            "_etag": "abc"
        });
        let mut customer: CustomerAggregate = serde_json::from_value(raw).unwrap();
        assert_eq!(customer.sales_order_count().unwrap(), 2);
        assert_eq!(customer.kind(), Some("customer"));
        assert_eq!(customer.display_name(), "Franklin Ye");

        customer.set_sales_order_count(3);
        let written = serde_json::to_value(&customer).unwrap();
        assert_eq!(written["salesOrderCount"], json!("3"));
        assert_eq!(written["addresses"][0]["city"], "Seattle");
        assert_eq!(written["customerId"], "C1");
    }

    #[test]
    fn numeric_counts_stay_numeric() {
        let mut customer: CustomerAggregate =
            serde_json::from_value(json!({"id": "C1", "salesOrderCount": 7})).unwrap();
        assert_eq!(customer.sales_order_count().unwrap(), 7);
        customer.set_sales_order_count(8);
        assert_eq!(serde_json::to_value(&customer).unwrap()["salesOrderCount"], json!(8));
    }

    #[test]
    fn missing_count_reads_as_zero_and_writes_as_string() {
        let mut customer = CustomerAggregate::new("C1");
        assert_eq!(customer.sales_order_count().unwrap(), 0);
        customer.set_sales_order_count(1);
        assert_eq!(serde_json::to_value(&customer).unwrap()["salesOrderCount"], json!("1"));
    }

    #[test]
    fn malformed_count_is_rejected() {
        let customer: CustomerAggregate =
            serde_json::from_value(json!({"id": "C1", "salesOrderCount": "many"})).unwrap();
        assert_eq!(
            customer.sales_order_count(),
            Err(CountError::Invalid("many".to_string()))
        );
    }

    #[test]
    fn sales_order_uses_camel_case_wire_names() {
        let order = SalesOrder {
            id: "O1".into(),
            kind: SALES_ORDER_TYPE.into(),
            customer_id: "C1".into(),
            order_date: "2014-02-16T00:00:00".into(),
            ship_date: Some("2014-02-23T00:00:00".into()),
            details: vec![LineItem {
                sku: "HL-U509-B".into(),
                name: "Sport-100 Helmet, Blue".into(),
                price: 34.99,
                quantity: 2,
            }],
        };
        let value = serde_json::to_value(&order).unwrap();
        assert_eq!(value["type"], "salesOrder");
        assert_eq!(value["customerId"], "C1");
        assert_eq!(value["shipDate"], "2014-02-23T00:00:00");
        assert!((order.total() - 69.98).abs() < 1e-9);
    }

    #[test]
    fn catalog_documents_keep_extra_fields() {
        let category: ProductCategory = serde_json::from_value(json!({
            "id": "K1", "type": "category", "value": "Helmets", "_etag": "e"
        }))
        .unwrap();
        assert_eq!(category.kind, CATEGORY_TYPE);
        assert_eq!(serde_json::to_value(&category).unwrap()["_etag"], "e");

        let product: Product = serde_json::from_value(json!({
            "id": "P1", "categoryId": "K1", "categoryName": "Helmets",
            "sku": "HL-U509", "name": "Sport-100 Helmet", "price": 34.99,
            "tags": [{"name": "Blue"}]
        }))
        .unwrap();
        let value = serde_json::to_value(&product).unwrap();
        assert_eq!(value["categoryName"], "Helmets");
        assert_eq!(value["tags"][0]["name"], "Blue");
    }
}
