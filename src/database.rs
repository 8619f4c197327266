use std::path::{Path, PathBuf};

use clap::ValueEnum;

use crate::engine::ContainerConfig;
use crate::memory::MemoryStore;

pub const CUSTOMER_CONTAINER: &str = "customer";
pub const CATEGORY_CONTAINER: &str = "productCategory";
pub const PRODUCT_CONTAINER: &str = "product";

/// Storage engine backing the container.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Process-local, lost on exit
    Memory,
    #[cfg(feature = "surrealkv")]
    Surrealkv,
    #[cfg(feature = "rocksdb")]
    Rocksdb,
}

impl Backend {
    pub fn is_persistent(self) -> bool {
        !matches!(self, Backend::Memory)
    }
}

/// Directory holding one container: `<data_dir>/<database>/<container>`.
pub fn container_dir(data_dir: &Path, database: &str, container: &str) -> PathBuf {
    data_dir.join(database).join(container)
}

/// The three containers of the database, each with its own layout.
pub struct Containers<S> {
    pub customers: S,
    pub categories: S,
    pub products: S,
}

impl<S> Containers<S> {
    /// Open every container through `open(name, layout)`, stopping at the
    /// first failure.
    pub fn try_open<E, F>(mut open: F) -> Result<Self, E>
    where
        F: FnMut(&'static str, ContainerConfig) -> Result<S, E>,
    {
        Ok(Self {
            customers: open(CUSTOMER_CONTAINER, ContainerConfig::customers())?,
            categories: open(CATEGORY_CONTAINER, ContainerConfig::product_categories())?,
            products: open(PRODUCT_CONTAINER, ContainerConfig::products())?,
        })
    }
}

impl Containers<MemoryStore> {
    pub fn in_memory() -> Self {
        Self {
            customers: MemoryStore::new(ContainerConfig::customers()),
            categories: MemoryStore::new(ContainerConfig::product_categories()),
            products: MemoryStore::new(ContainerConfig::products()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn containers_nest_under_their_database() {
        let dir = container_dir(Path::new("data"), "database", "container");
        assert_eq!(dir, PathBuf::from("data/database/container"));
    }

    #[test]
    fn only_memory_is_ephemeral() {
        assert!(!Backend::Memory.is_persistent());
        #[cfg(feature = "surrealkv")]
        assert!(Backend::Surrealkv.is_persistent());
    }

    #[test]
    fn opens_each_container_with_its_layout() {
        let mut opened = Vec::new();
        let containers = Containers::try_open(|name, config| {
            opened.push(name);
            Ok::<_, String>(config.partition_key_path().to_string())
        })
        .unwrap();
        assert_eq!(opened, vec!["customer", "productCategory", "product"]);
        assert_eq!(containers.customers, "/customerId");
        assert_eq!(containers.categories, "/type");
        assert_eq!(containers.products, "/categoryId");

        let failed = Containers::<String>::try_open(|name, _| {
            if name == CATEGORY_CONTAINER {
                Err(format!("cannot open {name}"))
            } else {
                Ok(name.to_string())
            }
        });
        assert_eq!(failed.err(), Some("cannot open productCategory".to_string()));
    }
}
