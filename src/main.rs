use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use orderdesk::args::{Args, Command};
use orderdesk::client::Store;
use orderdesk::database::{Backend, Containers};
use orderdesk::logging::setup_tracing;
use orderdesk::menu::Menu;
use orderdesk::model::SalesOrder;
use orderdesk::seed::{sample_order, SeedConfig};
use orderdesk::session::Session;

fn main() -> Result<()> {
    let args = Args::parse();
    setup_tracing();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build the tokio runtime")?;

    runtime.block_on(run(args))
}

async fn run(args: Args) -> Result<()> {
    info!(
        backend = ?args.backend,
        database = %args.database,
        policy = %args.count_policy,
        "Opening containers"
    );

    match args.backend {
        Backend::Memory => run_session(Containers::in_memory(), &args).await,
        #[cfg(feature = "surrealkv")]
        Backend::Surrealkv => {
            let containers = Containers::try_open(|name, config| {
                open_dir(&args.container_dir(name), |dir| {
                    orderdesk::surrealkv::SurrealKVStore::open(dir, config)
                })
            })?;
            run_session(containers, &args).await
        }
        #[cfg(feature = "rocksdb")]
        Backend::Rocksdb => {
            let containers = Containers::try_open(|name, config| {
                open_dir(&args.container_dir(name), |dir| {
                    orderdesk::rocksdb::RocksDBStore::open(dir, config)
                })
            })?;
            run_session(containers, &args).await
        }
    }
}

#[cfg_attr(not(any(feature = "surrealkv", feature = "rocksdb")), allow(dead_code))]
fn open_dir<S, F>(dir: &Path, open: F) -> Result<S>
where
    F: FnOnce(&Path) -> Result<S, orderdesk::StoreError>,
{
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create data directory {}", dir.display()))?;
    open(dir).with_context(|| format!("failed to open container at {}", dir.display()))
}

async fn run_session<S: Store>(containers: Containers<S>, args: &Args) -> Result<()> {
    let session = Session::new(containers, args.count_policy);

    // A memory container starts empty every run.
    let explicit_seed = matches!(args.command, Some(Command::Seed { .. }));
    if (args.seed || !args.backend.is_persistent()) && !explicit_seed {
        let seeded = session.seed(&SeedConfig::default()).await?;
        info!("{seeded}");
    }

    let output = match args.command.clone().unwrap_or(Command::Menu) {
        Command::Menu => {
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            return Menu::new(&session, stdin, tokio::io::stdout()).run().await;
        }
        Command::Seed {
            customers,
            max_orders,
        } => {
            let config = SeedConfig {
                customer_count: customers,
                max_orders_per_customer: max_orders,
            };
            session.seed(&config).await?
        }
        Command::Customer { customer_id } => session.customer(&customer_id).await?,
        Command::Orders { customer_id } => session.customer_with_orders(&customer_id).await?,
        Command::RecordOrder {
            customer_id,
            order_file,
        } => {
            let order = match order_file {
                Some(path) => read_order(&path)?,
                None => sample_order(&customer_id),
            };
            session.record_order(&customer_id, &order).await?.to_string()
        }
        Command::DeleteOrder {
            customer_id,
            order_id,
        } => session
            .delete_order(&customer_id, &order_id)
            .await?
            .to_string(),
        Command::Top { limit } => session.top_customers(limit).await?,
        Command::Categories => session.categories().await?,
        Command::Products { category_id } => session.products(&category_id).await?,
        Command::RenameCategory { category_id, name } => session
            .rename_category(&category_id, &name)
            .await?
            .to_string(),
    };

    println!("{output}");
    println!("{}", session.metrics().await);
    Ok(())
}

fn read_order(path: &Path) -> Result<SalesOrder> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read order file {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid sales order in {}", path.display()))
}
