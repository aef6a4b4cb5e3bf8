//! Full-node composition: header admission, block connection, and
//! mempool wiring over persistent storage.
//!
//! [`Node`] is the surface the network and miner layers drive. Incoming
//! blocks pass a rate limiter, the fork resolver, and the connector;
//! accepted blocks land in the block store and purge the mempool.
//! Blocks that switch the tip to another branch are *not* replayed here:
//! the caller receives the reorg path and drives reconnection in that
//! order, which keeps the UTXO set and the header index on a single
//! linearization.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use stater_consensus::{BlockMeta, ForkResolver, connect_block};
use stater_core::antidos::{OrphanBlock, OrphanBuffer, ValidationRateLimiter};
use stater_core::chainstate::{Chainstate, CoinsBackend, FlatFileBackend};
use stater_core::constants::MTP_WINDOW;
use stater_core::error::{CoreError, ForkError, MempoolError, StoreError};
use stater_core::genesis;
use stater_core::mempool::{Mempool, ValidationContext};
use stater_core::params::Params;
use stater_core::types::{Block, Hash256, Transaction};
use stater_core::validation::ValidationOptions;

use crate::blockstore::BlockStore;
use crate::config::NodeConfig;
use crate::storage::RocksCoinsBackend;

/// Outcome of submitting a block to the node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlockStatus {
    /// Extended the best chain and was applied to the UTXO set.
    Connected { height: u32 },
    /// Header admitted on a side branch; the tip is unchanged.
    SideChain,
    /// The header displaced the tip onto another branch. The caller must
    /// replay blocks along the returned genesis-first path.
    TipSwitched { reorg_path: Vec<Hash256> },
    /// Parent unknown; buffered until it arrives.
    Orphaned,
    /// Refused by the validation rate limiter; resubmit later.
    RateLimited,
}

/// A running node instance.
pub struct Node {
    params: Params,
    chainstate: Arc<Chainstate>,
    fork: ForkResolver,
    mempool: Mempool,
    blockstore: Mutex<BlockStore>,
    limiter: Mutex<ValidationRateLimiter>,
    orphans: Mutex<OrphanBuffer>,
}

impl Node {
    /// Open a node over the configured storage, creating and connecting
    /// the genesis block on first run and replaying stored headers
    /// otherwise.
    pub fn open(config: &NodeConfig, params: Params) -> Result<Self, CoreError> {
        std::fs::create_dir_all(&config.data_dir)
            .map_err(|e| StoreError::Io(e.to_string()))?;

        let backend: Box<dyn CoinsBackend> = if config.kv_backend {
            Box::new(RocksCoinsBackend::open(config.chainstate_path())?)
        } else {
            Box::new(FlatFileBackend::open(config.flat_chainstate_path())?)
        };
        let chainstate = Arc::new(Chainstate::open(
            backend,
            config.cache_entries,
            config.sync_writes,
        )?);
        let blockstore = BlockStore::open(config.blockstore_path())?;

        let node = Self {
            params,
            chainstate,
            fork: ForkResolver::new(config.finalization_depth, config.reorg_margin_bps),
            mempool: Mempool::with_defaults(),
            blockstore: Mutex::new(blockstore),
            limiter: Mutex::new(ValidationRateLimiter::new(
                config.rate_limit_per_minute,
                config.rate_limit_burst,
            )),
            orphans: Mutex::new(OrphanBuffer::default()),
        };

        let max_height = node.blockstore.lock().max_height();
        match max_height {
            Some(max) => node.replay_headers(max)?,
            None => node.bootstrap_genesis()?,
        }
        node.refresh_mempool_context();

        info!(
            tip = ?node.tip().map(|t| t.height),
            utxos = node.chainstate.utxo_count(),
            "node open"
        );
        Ok(node)
    }

    /// Rebuild the in-memory header index from the block store. The UTXO
    /// set itself is already persistent.
    fn replay_headers(&self, max_height: u32) -> Result<(), CoreError> {
        let store = self.blockstore.lock();
        for height in 0..=max_height {
            let block = store.read_block(height)?;
            let hash = block.header.hash();
            self.fork.consider_header(
                &block.header,
                hash,
                block.header.prev_hash,
                height,
                &self.params,
            )?;
        }
        debug!(max_height, "replayed stored headers");
        Ok(())
    }

    /// First run: derive, connect, and store the genesis block.
    fn bootstrap_genesis(&self) -> Result<(), CoreError> {
        let block = genesis::create_genesis_block(&self.params)?;
        let opts = ValidationOptions::new(
            self.params.genesis_time.saturating_sub(1).max(1),
            self.params.genesis_time,
        );
        connect_block(&block, &self.chainstate, &self.params, 0, None, &opts)?;
        let hash = block.header.hash();
        self.fork
            .consider_header(&block.header, hash, Hash256::ZERO, 0, &self.params)?;
        self.blockstore.lock().write_block(0, &block)?;
        info!(%hash, "connected genesis");
        Ok(())
    }

    /// Submit a block received from the network or the miner.
    pub fn submit_block(&self, block: &Block, now: u32) -> Result<BlockStatus, CoreError> {
        let weight = 1 + block.transactions.len() as u64 / 64;
        if !self.limiter.lock().consume(weight) {
            warn!("validation rate limit hit; deferring block");
            return Ok(BlockStatus::RateLimited);
        }

        let hash = block.header.hash();
        let parent = block.header.prev_hash;

        let parent_meta = if parent.is_zero() {
            None
        } else {
            match self.fork.meta(&parent) {
                Some(meta) => Some(meta),
                None => {
                    self.orphans.lock().add(OrphanBlock {
                        block: block.clone(),
                        hash,
                        parent,
                        received: Instant::now(),
                    });
                    debug!(%hash, %parent, "buffered orphan block");
                    return Ok(BlockStatus::Orphaned);
                }
            }
        };
        let height = parent_meta.map(|m| m.height + 1).unwrap_or(0);

        // Checkpoint conflicts are rejected before any state changes.
        if let Some(expected) = self.params.checkpoints.get(&height) {
            if *expected != hash {
                return Err(ForkError::CheckpointMismatch(height).into());
            }
        }

        let tip_before = self.fork.tip();
        let extends_tip = match &tip_before {
            None => parent.is_zero(),
            Some(tip) => tip.hash == parent,
        };

        if extends_tip {
            let opts = ValidationOptions::new(self.median_time_past(&parent), now);
            connect_block(block, &self.chainstate, &self.params, height, None, &opts)?;
            let adopted =
                self.fork
                    .consider_header(&block.header, hash, parent, height, &self.params)?;
            debug_assert!(adopted, "extending the tip strictly increases work");

            self.blockstore.lock().write_block(height, block)?;
            self.mempool.remove_for_block(&block.transactions);
            self.refresh_mempool_context();
            info!(height, %hash, "block connected");

            self.connect_ready_orphans(hash, now);
            return Ok(BlockStatus::Connected { height });
        }

        // Side branch: weigh the header only. Connection happens when the
        // caller replays the reorg path.
        let adopted = self
            .fork
            .consider_header(&block.header, hash, parent, height, &self.params)?;
        if adopted {
            let reorg_path = self.fork.reorg_path(&hash);
            info!(height, %hash, depth = reorg_path.len(), "tip switched to competing branch");
            Ok(BlockStatus::TipSwitched { reorg_path })
        } else {
            debug!(height, %hash, "side-chain header admitted");
            Ok(BlockStatus::SideChain)
        }
    }

    /// Submit buffered orphans whose parent just connected.
    fn connect_ready_orphans(&self, parent: Hash256, now: u32) {
        let ready = self.orphans.lock().pop_children(&parent);
        for orphan in ready {
            match self.submit_block(&orphan.block, now) {
                Ok(status) => debug!(hash = %orphan.hash, ?status, "orphan resubmitted"),
                Err(e) => warn!(hash = %orphan.hash, error = %e, "orphan rejected"),
            }
        }
    }

    /// Submit a transaction for mempool admission.
    pub fn accept_transaction(&self, tx: Transaction, fee: u64) -> Result<Hash256, MempoolError> {
        self.mempool.accept(tx, fee)
    }

    /// Median of the timestamps of the last 11 headers ending at `tip`.
    ///
    /// For the genesis block there is no history; one second before the
    /// configured genesis time keeps the ordering rule meaningful.
    pub fn median_time_past(&self, tip: &Hash256) -> u32 {
        if tip.is_zero() {
            return self.params.genesis_time.saturating_sub(1).max(1);
        }
        let mut times = Vec::with_capacity(MTP_WINDOW);
        let mut cursor = self.fork.meta(tip);
        while let Some(meta) = cursor {
            times.push(meta.time);
            if times.len() == MTP_WINDOW || meta.parent.is_zero() {
                break;
            }
            cursor = self.fork.meta(&meta.parent);
        }
        if times.is_empty() {
            return self.params.genesis_time.saturating_sub(1).max(1);
        }
        times.sort_unstable();
        times[times.len() / 2]
    }

    fn refresh_mempool_context(&self) {
        let next_height = self.tip().map(|t| t.height + 1).unwrap_or(0);
        let chainstate = Arc::clone(&self.chainstate);
        self.mempool.set_validation_context(ValidationContext {
            params: self.params.clone(),
            height: next_height,
            lookup: Box::new(move |outpoint| chainstate.get(outpoint)),
        });
    }

    /// Current best tip metadata.
    pub fn tip(&self) -> Option<BlockMeta> {
        self.fork.tip()
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn chainstate(&self) -> &Chainstate {
        &self.chainstate
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    /// Genesis-first ancestry of the current tip.
    pub fn best_chain(&self) -> Vec<Hash256> {
        self.tip()
            .map(|t| self.fork.reorg_path(&t.hash))
            .unwrap_or_default()
    }
}
