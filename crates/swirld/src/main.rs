//! swirld - hashgraph consensus node
//!
//! Loads the node key and the genesis peers from the data directory,
//! listens for peers over TCP and commits blocks to an in-memory
//! application until interrupted.

use anyhow::Context;
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use swirl_net::TcpTransport;
use swirld::config::{Config, StoreKind};
use swirld::{InmemAppProxy, InmemStore, Node, SledStore, Store};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_logging(config: &Config) {
    let level = if config.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("swirld={level},swirl_net={level}")));

    let registry = tracing_subscriber::registry().with(filter);
    if config.log_format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    config.validate()?;
    let key = config.load_key()?;
    let genesis = config.load_peers()?;
    info!(id = %key.peer_id(), peers = genesis.len(), "loaded identity");

    let sled = match config.store {
        StoreKind::Sled => Some(Arc::new(
            SledStore::open(config.data_dir.join("db"), &genesis).context("opening store")?,
        )),
        StoreKind::Inmem => None,
    };
    let store: Arc<dyn Store> = match &sled {
        Some(sled) => sled.clone(),
        None => Arc::new(InmemStore::new(&genesis)),
    };

    let transport = TcpTransport::bind(&config.listen, config.tcp_timeout())
        .await
        .with_context(|| format!("binding {}", config.listen))?
        .with_join_timeout(config.join_timeout());
    let proxy = Arc::new(InmemAppProxy::new());

    let node = Node::new(config.node_config(), key, store, Arc::new(transport), proxy)?;
    node.run()?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            node.shutdown().await;
        }
        _ = node.stopped() => {
            node.shutdown().await;
        }
    }

    if let Some(sled) = sled {
        sled.flush().context("flushing store")?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();
    init_logging(&config);

    info!("swirld v{}", env!("CARGO_PKG_VERSION"));

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
