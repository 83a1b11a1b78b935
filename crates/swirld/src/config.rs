//! Configuration for swirld

use crate::node::NodeConfig;
use anyhow::Context;
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use swirl_core::{KeyPair, Peer, PeerSet};

/// File in the data directory holding the hex-encoded key seed
pub const KEY_FILE: &str = "priv_key";

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    Inmem,
    Sled,
}

/// swirld - hashgraph consensus node
#[derive(Parser, Debug, Clone)]
#[command(name = "swirld")]
#[command(about = "Hashgraph consensus node")]
pub struct Config {
    /// Address to listen on; also the address advertised to peers
    #[arg(short, long, default_value = "127.0.0.1:1337")]
    pub listen: String,

    /// Data directory for the key and the event store
    #[arg(short, long, default_value = "./data/swirld", env = "SWIRLD_DATA_DIR")]
    pub data_dir: PathBuf,

    /// Genesis peers (JSON file); defaults to <data_dir>/peers.json
    #[arg(long)]
    pub peers: Option<PathBuf>,

    /// Human-readable name
    #[arg(long, default_value = "")]
    pub moniker: String,

    /// Gossip period in milliseconds
    #[arg(long, default_value = "50")]
    pub heartbeat_ms: u64,

    /// Request timeout in milliseconds
    #[arg(long, default_value = "1000")]
    pub tcp_timeout_ms: u64,

    /// Maximum events per sync response
    #[arg(long, default_value = "1000")]
    pub sync_limit: usize,

    /// Catch up from a peer's anchor block instead of replaying history
    #[arg(long)]
    pub enable_fast_sync: bool,

    /// Events we may lag behind before catching up
    #[arg(long, default_value = "1000")]
    pub catch_up_threshold: u64,

    /// Time allowed for a join request to reach consensus, in milliseconds
    #[arg(long, default_value = "10000")]
    pub join_timeout_ms: u64,

    /// Event store backend
    #[arg(long, value_enum, default_value = "sled")]
    pub store: StoreKind,

    /// Undecided rounds tolerated before reporting a consensus stall
    #[arg(long, default_value = "20")]
    pub fame_liveness_bound: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Log format (json or pretty)
    #[arg(long, default_value = "pretty")]
    pub log_format: String,
}

/// Entry of the peers file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerEntry {
    /// Hex-encoded ed25519 public key
    pub pub_key: String,
    pub net_addr: String,
    #[serde(default)]
    pub moniker: String,
}

impl Config {
    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.listen.is_empty() {
            anyhow::bail!("Listen address cannot be empty");
        }
        if self.heartbeat_ms == 0 {
            anyhow::bail!("Heartbeat must be positive");
        }
        if self.sync_limit == 0 {
            anyhow::bail!("Sync limit must be positive");
        }
        if self.join_timeout_ms < self.tcp_timeout_ms {
            anyhow::bail!("Join timeout cannot be shorter than the request timeout");
        }
        if !matches!(self.log_format.as_str(), "json" | "pretty") {
            anyhow::bail!("Unknown log format {:?}", self.log_format);
        }
        Ok(())
    }

    pub fn node_config(&self) -> NodeConfig {
        NodeConfig {
            heartbeat: Duration::from_millis(self.heartbeat_ms),
            sync_limit: self.sync_limit,
            enable_fast_sync: self.enable_fast_sync,
            catch_up_threshold: self.catch_up_threshold,
            join_timeout: Duration::from_millis(self.join_timeout_ms),
            fame_liveness_bound: self.fame_liveness_bound,
            moniker: self.moniker.clone(),
        }
    }

    pub fn tcp_timeout(&self) -> Duration {
        Duration::from_millis(self.tcp_timeout_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn peers_path(&self) -> PathBuf {
        self.peers
            .clone()
            .unwrap_or_else(|| self.data_dir.join("peers.json"))
    }

    /// Load the node key, generating and saving one on first start
    pub fn load_key(&self) -> anyhow::Result<KeyPair> {
        load_or_create_key(&self.data_dir.join(KEY_FILE))
    }

    pub fn load_peers(&self) -> anyhow::Result<PeerSet> {
        load_peers(&self.peers_path())
    }
}

pub fn load_or_create_key(path: &Path) -> anyhow::Result<KeyPair> {
    if path.exists() {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading key from {}", path.display()))?;
        let bytes = hex::decode(text.trim()).context("key file is not hex")?;
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| anyhow::anyhow!("key seed must be 32 bytes"))?;
        return Ok(KeyPair::from_seed(&seed));
    }

    let key = KeyPair::generate();
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating {}", dir.display()))?;
    }
    std::fs::write(path, hex::encode(key.seed()))
        .with_context(|| format!("writing key to {}", path.display()))?;
    Ok(key)
}

pub fn load_peers(path: &Path) -> anyhow::Result<PeerSet> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading peers from {}", path.display()))?;
    let entries: Vec<PeerEntry> = serde_json::from_str(&text).context("parsing peers file")?;
    if entries.is_empty() {
        anyhow::bail!("peers file {} is empty", path.display());
    }

    let mut peers = Vec::with_capacity(entries.len());
    for entry in entries {
        let bytes = hex::decode(&entry.pub_key)
            .with_context(|| format!("public key of {:?} is not hex", entry.net_addr))?;
        let pub_key: [u8; 32] = bytes
            .try_into()
            .map_err(|_| anyhow::anyhow!("public key of {:?} must be 32 bytes", entry.net_addr))?;
        let peer = Peer::new(pub_key, entry.net_addr, entry.moniker);
        peer.validate()?;
        peers.push(peer);
    }
    Ok(PeerSet::new(peers))
}
