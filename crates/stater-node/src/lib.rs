//! # stater-node
//! Persistence backends, block storage, and full-node composition for the
//! Stater protocol.

pub mod blockstore;
pub mod config;
pub mod node;
pub mod storage;

pub use blockstore::BlockStore;
pub use config::NodeConfig;
pub use node::{BlockStatus, Node};
pub use storage::RocksCoinsBackend;

/// Install the global tracing subscriber with an env-filter directive
/// (e.g. `"info"` or `"stater_node=debug"`).
pub fn init_logging(filter: &str) {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();
}
