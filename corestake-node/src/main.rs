use anyhow::{Context, Result};
use clap::Parser;
use corestake_api::{metrics::Metrics, AppState};
use corestake_genesis::{create_genesis_state, GenesisConfig};
use corestake_service::{system_clock, KeeperConfig, NodeState};
use corestake_storage::Storage;
use corestake_types::AccountId;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::RwLock;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(author, version, about = "CoreStake liquid staking engine node", long_about = None)]
struct Args {
    #[arg(short, long, default_value = "./data")]
    data_dir: String,
    /// Genesis JSON used when the data dir holds no snapshot.
    #[arg(short, long)]
    genesis: Option<String>,
    /// Owner account of the built-in development genesis (`corestake-cli init` prints one).
    #[arg(long)]
    dev_owner: Option<String>,
    #[arg(short, long, default_value = "0.0.0.0:3000")]
    listen: SocketAddr,
    /// Operator account the keeper acts as; no keeper runs without it.
    #[arg(long)]
    keeper: Option<String>,
    #[arg(long, default_value_t = 60)]
    keeper_interval_secs: u64,
    #[arg(long, default_value_t = 50)]
    keeper_batch_size: u32,
    #[arg(long, default_value = "info")]
    log_level: Level,
}

fn open_storage(data_dir: &str) -> Result<Storage> {
    #[cfg(feature = "rocksdb")]
    let storage = Storage::open_rocks(data_dir);
    #[cfg(not(feature = "rocksdb"))]
    let storage = Storage::open_dir(data_dir);
    storage.context("Failed to initialize storage")
}

fn load_node(args: &Args, storage: &Storage, now: u64) -> Result<NodeState> {
    if let Some(node) = NodeState::restore(storage)? {
        info!(sequence = node.engine.sequence, "Loaded existing state.");
        return Ok(node);
    }

    info!("No snapshot found, building genesis...");
    let genesis = match &args.genesis {
        Some(path) => GenesisConfig::load(path)?.build()?,
        None => {
            let owner = args
                .dev_owner
                .as_deref()
                .context("no snapshot found: pass --genesis or --dev-owner")?;
            let owner: AccountId = owner.parse().context("invalid --dev-owner")?;
            create_genesis_state(owner, now)?
        }
    };
    let node = NodeState::from(genesis);
    node.persist(storage).context("Failed to save genesis state")?;
    Ok(node)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")?;

    info!("Starting CoreStake Node...");

    let storage = Arc::new(open_storage(&args.data_dir)?);
    info!("Storage initialized at {}", args.data_dir);

    let clock = system_clock();
    let node = load_node(&args, &storage, clock())?;
    let shared_state = Arc::new(RwLock::new(node));

    let (mut service, handle) = corestake_service::channel(shared_state.clone(), storage.clone(), 1000);
    if let Some(keeper) = &args.keeper {
        let account: AccountId = keeper.parse().context("invalid --keeper account")?;
        service = service.with_keeper(KeeperConfig {
            account,
            interval: Duration::from_secs(args.keeper_interval_secs),
            batch_size: args.keeper_batch_size,
        });
        info!(keeper = %account, "Keeper enabled");
    }
    tokio::spawn(service.run());

    let api_state = AppState {
        node: shared_state.clone(),
        service: handle,
        metrics: Arc::new(Metrics::new()),
        clock,
    };
    let listen = args.listen;
    tokio::spawn(async move {
        if let Err(e) = corestake_api::start_server(listen, api_state).await {
            error!("API server stopped: {}", e);
        }
    });

    info!("Node running. Press Ctrl+C to stop.");
    signal::ctrl_c().await?;

    let node = shared_state.read().await;
    node.persist(&storage).context("Failed to save final snapshot")?;
    info!(sequence = node.engine.sequence, "Snapshot saved, shutting down");
    Ok(())
}
