//! Node configuration.
//!
//! [`NodeConfig`] is an explicit value passed into [`Node::open`]
//! (crate::node::Node::open); nothing in the node reads process-wide
//! state. Defaults suit a mainnet deployment; a TOML file or
//! `STATER_`-prefixed environment variables can override them.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use stater_core::constants::DEFAULT_CACHE_ENTRIES;

/// Configuration for a node instance.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Root directory for all persistent data.
    pub data_dir: PathBuf,
    /// Bound on the chain state lookaside cache.
    pub cache_entries: usize,
    /// Whether chain state writes block on durability.
    pub sync_writes: bool,
    /// Use the RocksDB backend; `false` selects the flat-file fallback.
    pub kv_backend: bool,
    /// Log level filter string (e.g. "info", "stater_node=debug").
    pub log_level: String,
    /// Finalization window for the fork resolver.
    pub finalization_depth: u32,
    /// Extra work a deep reorg must carry, in basis points.
    pub reorg_margin_bps: u32,
    /// Sustained validation budget for incoming blocks.
    pub rate_limit_per_minute: u64,
    /// Burst capacity of the validation rate limiter.
    pub rate_limit_burst: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stater");

        Self {
            data_dir,
            cache_entries: DEFAULT_CACHE_ENTRIES,
            sync_writes: true,
            kv_backend: true,
            log_level: "info".to_string(),
            finalization_depth: 100,
            reorg_margin_bps: 500,
            rate_limit_per_minute: 120,
            rate_limit_burst: 240,
        }
    }
}

impl NodeConfig {
    /// Load configuration from an optional TOML file, then environment
    /// variables prefixed `STATER_`, over the defaults.
    pub fn load(file: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path.to_path_buf()));
        }
        builder = builder.add_source(config::Environment::with_prefix("STATER"));
        let settings = builder.build()?;

        // Missing fields fall back to the defaults via serde.
        let mut cfg: NodeConfig = settings.try_deserialize()?;
        if cfg.cache_entries == 0 {
            cfg.cache_entries = DEFAULT_CACHE_ENTRIES;
        }
        Ok(cfg)
    }

    /// Path to the RocksDB chain state directory.
    pub fn chainstate_path(&self) -> PathBuf {
        self.data_dir.join("chainstate")
    }

    /// Path to the flat-file chain state fallback.
    pub fn flat_chainstate_path(&self) -> PathBuf {
        self.data_dir.join("chainstate.dat")
    }

    /// Path to the append-only block file.
    pub fn blockstore_path(&self) -> PathBuf {
        self.data_dir.join("blocks.dat")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_data_dir_ends_with_stater() {
        let cfg = NodeConfig::default();
        assert!(
            cfg.data_dir.ends_with("stater"),
            "data_dir should end with 'stater': {:?}",
            cfg.data_dir
        );
    }

    #[test]
    fn defaults_are_durable() {
        let cfg = NodeConfig::default();
        assert!(cfg.sync_writes);
        assert!(cfg.kv_backend);
        assert_eq!(cfg.cache_entries, DEFAULT_CACHE_ENTRIES);
    }

    #[test]
    fn derived_paths_live_under_data_dir() {
        let cfg = NodeConfig {
            data_dir: PathBuf::from("/tmp/stater-test"),
            ..NodeConfig::default()
        };
        assert_eq!(cfg.chainstate_path(), PathBuf::from("/tmp/stater-test/chainstate"));
        assert_eq!(
            cfg.flat_chainstate_path(),
            PathBuf::from("/tmp/stater-test/chainstate.dat")
        );
        assert_eq!(cfg.blockstore_path(), PathBuf::from("/tmp/stater-test/blocks.dat"));
    }

    #[test]
    fn load_without_file_yields_defaults() {
        let cfg = NodeConfig::load(None).unwrap();
        assert_eq!(cfg.finalization_depth, NodeConfig::default().finalization_depth);
    }

    #[test]
    fn config_is_clone_and_debug() {
        let cfg = NodeConfig::default();
        let copy = cfg.clone();
        assert!(format!("{copy:?}").contains("NodeConfig"));
    }
}
