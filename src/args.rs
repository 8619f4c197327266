use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::coordinator::CountPolicy;
use crate::database::{self, Backend};
use crate::seed::{DEMO_CUSTOMER_ID, LOOKUP_CUSTOMER_ID, TIRES_CATEGORY_ID};

#[derive(Parser, Debug)]
#[command(term_width = 0, about = "Sales order desk over a partitioned document store")]
pub struct Args {
    /// The storage engine backing the container
    #[arg(short, long, env = "ORDERDESK_BACKEND", default_value = "memory")]
    pub backend: Backend,

    /// Root directory for on-disk backends
    #[arg(long, env = "ORDERDESK_DATA_DIR", default_value = "orderdesk-data")]
    pub data_dir: PathBuf,

    #[arg(long, env = "ORDERDESK_DATABASE", default_value = "database-v2")]
    pub database: String,

    /// How salesOrderCount changes when an order is recorded: `increment` or `fixed:<n>`
    #[arg(long, env = "ORDERDESK_COUNT_POLICY", default_value = "increment")]
    pub count_policy: CountPolicy,

    /// Load the sample customers before running (always done for the memory backend)
    #[arg(long)]
    pub seed: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Args {
    pub fn container_dir(&self, container: &str) -> PathBuf {
        database::container_dir(&self.data_dir, &self.database, container)
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Interactive menu (the default)
    Menu,
    /// Load sample customers and orders
    Seed {
        /// Random customers added on top of the demo customers
        #[arg(long, default_value = "25")]
        customers: u32,

        #[arg(long, default_value = "5")]
        max_orders: u32,
    },
    /// Point read of a customer
    Customer {
        #[arg(default_value = LOOKUP_CUSTOMER_ID)]
        customer_id: String,
    },
    /// A customer and all of their orders
    Orders {
        #[arg(default_value = DEMO_CUSTOMER_ID)]
        customer_id: String,
    },
    /// Record a new order and update the customer's order count
    RecordOrder {
        #[arg(default_value = DEMO_CUSTOMER_ID)]
        customer_id: String,

        /// JSON sales order to record instead of a generated one
        #[arg(long)]
        order_file: Option<PathBuf>,
    },
    /// Delete an order and update the customer's order count
    DeleteOrder {
        customer_id: String,
        order_id: String,
    },
    /// Customers with the most orders
    Top {
        #[arg(long, default_value = "10")]
        limit: usize,
    },
    /// List all product categories
    Categories,
    /// Products of one category
    Products {
        #[arg(default_value = TIRES_CATEGORY_ID)]
        category_id: String,
    },
    /// Rename a category and update its products
    RenameCategory {
        category_id: String,
        name: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_memory_and_increment() {
        let args = Args::try_parse_from(["orderdesk"]).unwrap();
        assert_eq!(args.backend, Backend::Memory);
        assert_eq!(args.count_policy, CountPolicy::Increment);
        assert_eq!(
            args.container_dir("customer"),
            PathBuf::from("orderdesk-data/database-v2/customer")
        );
        assert!(args.command.is_none());
    }

    #[test]
    fn parses_subcommands_and_policy() {
        let args = Args::try_parse_from([
            "orderdesk",
            "--count-policy",
            "fixed:2",
            "record-order",
            "C1",
        ])
        .unwrap();
        assert_eq!(args.count_policy, CountPolicy::Fixed(2));
        assert_eq!(
            args.command,
            Some(Command::RecordOrder {
                customer_id: "C1".to_string(),
                order_file: None,
            })
        );

        let args = Args::try_parse_from(["orderdesk", "top"]).unwrap();
        assert_eq!(args.command, Some(Command::Top { limit: 10 }));
    }

    #[test]
    fn partition_layout_is_not_configurable() {
        assert!(Args::try_parse_from(["orderdesk", "--partition-key-path", "/id"]).is_err());
        assert!(Args::try_parse_from(["orderdesk", "--container", "orders"]).is_err());
    }

    #[test]
    fn parses_catalog_subcommands() {
        let args = Args::try_parse_from(["orderdesk", "products"]).unwrap();
        assert_eq!(
            args.command,
            Some(Command::Products {
                category_id: TIRES_CATEGORY_ID.to_string(),
            })
        );

        let args =
            Args::try_parse_from(["orderdesk", "rename-category", "K1", "Tires & Tubes"]).unwrap();
        assert_eq!(
            args.command,
            Some(Command::RenameCategory {
                category_id: "K1".to_string(),
                name: "Tires & Tubes".to_string(),
            })
        );
    }

    #[test]
    fn rejects_unknown_policy() {
        assert!(Args::try_parse_from(["orderdesk", "--count-policy", "double"]).is_err());
    }
}
