use serde_json::{json, Value};

use orderdesk::catalog;
use orderdesk::database::Containers;
use orderdesk::seed::{
    self, sample_order, SeedConfig, DEMO_CUSTOMER_ID, TIRES_CATEGORY_ID, TIRES_CATEGORY_NAME,
    TIRES_CATEGORY_RENAMED,
};
use orderdesk::{reports, ContainerConfig, CountPolicy, OrderCoordinator, OrderError, Store};

async fn exercise<S: Store + Clone>(store: S) {
    let config = SeedConfig {
        customer_count: 3,
        max_orders_per_customer: 2,
    };
    let report = seed::seed(&store, &config).await.unwrap();
    assert!(report.created >= 7);

    let coordinator = OrderCoordinator::new(store.clone(), CountPolicy::Increment);
    let order = sample_order(DEMO_CUSTOMER_ID);
    let outcome = coordinator
        .record_order(DEMO_CUSTOMER_ID, &order)
        .await
        .unwrap();
    assert_eq!(outcome.sales_order_count, 3);

    let err = coordinator
        .record_order(DEMO_CUSTOMER_ID, &order)
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    let (customer, orders) = reports::customer_with_orders(&store, DEMO_CUSTOMER_ID)
        .await
        .unwrap();
    let customer = serde_json::to_value(customer.unwrap()).unwrap();
    assert_eq!(customer["salesOrderCount"], json!("3"));
    assert_eq!(orders.len(), 3);

    coordinator
        .remove_order(DEMO_CUSTOMER_ID, &order.id)
        .await
        .unwrap();
    let customer: Value = serde_json::to_value(
        reports::customer(&store, DEMO_CUSTOMER_ID).await.unwrap(),
    )
    .unwrap();
    assert_eq!(customer["salesOrderCount"], json!("2"));

    let missing = coordinator
        .record_order("does-not-exist", &sample_order("does-not-exist"))
        .await
        .unwrap_err();
    assert!(matches!(missing, OrderError::NotFound { .. }));

    let top = reports::top_customers(&store, 100).await.unwrap();
    assert_eq!(top.len(), 5);
}

async fn exercise_catalog<S: Store>(containers: Containers<S>) {
    let Containers {
        categories,
        products,
        ..
    } = containers;
    seed::seed_catalog(&categories, &products).await.unwrap();

    let renamed = catalog::rename_category(
        &categories,
        &products,
        TIRES_CATEGORY_ID,
        TIRES_CATEGORY_RENAMED,
    )
    .await
    .unwrap();
    assert_eq!(renamed.products_updated, 5);
    let counts = catalog::category_product_counts(&products, TIRES_CATEGORY_ID)
        .await
        .unwrap();
    assert_eq!(counts.len(), 1);
    assert_eq!(counts[0].category_name, TIRES_CATEGORY_RENAMED);

    catalog::rename_category(&categories, &products, TIRES_CATEGORY_ID, TIRES_CATEGORY_NAME)
        .await
        .unwrap();
    let restored = catalog::category(&categories, TIRES_CATEGORY_ID).await.unwrap();
    assert_eq!(restored.value, TIRES_CATEGORY_NAME);
}

#[tokio::test]
async fn memory_backend() {
    exercise(orderdesk::MemoryStore::new(ContainerConfig::default())).await;
    exercise_catalog(Containers::in_memory()).await;
}

#[cfg(feature = "surrealkv")]
#[tokio::test]
async fn surrealkv_backend() {
    let dir = tempfile::tempdir().unwrap();
    let store =
        orderdesk::surrealkv::SurrealKVStore::open(dir.path(), ContainerConfig::default()).unwrap();
    exercise(store).await;

    let root = tempfile::tempdir().unwrap();
    let containers = Containers::try_open(|name, config| {
        let dir = root.path().join(name);
        std::fs::create_dir_all(&dir).unwrap();
        orderdesk::surrealkv::SurrealKVStore::open(dir, config)
    })
    .unwrap();
    exercise_catalog(containers).await;
}

#[cfg(feature = "rocksdb")]
#[tokio::test]
async fn rocksdb_backend() {
    let dir = tempfile::tempdir().unwrap();
    let store =
        orderdesk::rocksdb::RocksDBStore::open(dir.path(), ContainerConfig::default()).unwrap();
    exercise(store).await;

    let root = tempfile::tempdir().unwrap();
    let containers = Containers::try_open(|name, config| {
        let dir = root.path().join(name);
        std::fs::create_dir_all(&dir).unwrap();
        orderdesk::rocksdb::RocksDBStore::open(dir, config)
    })
    .unwrap();
    exercise_catalog(containers).await;
}
