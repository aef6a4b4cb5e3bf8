//! Best-chain selection by cumulative work.
//!
//! The resolver maintains the header DAG as a parent-indexed map and
//! tracks the tip with the most cumulative work. Two safeguards harden
//! it against history rewrites:
//!
//! - **Checkpoints**: headers at pinned heights must match the parameter
//!   set exactly; anything else is rejected before it enters the index.
//! - **Reorganization margin**: a fork reaching deeper than the
//!   finalization window only displaces the tip when its cumulative work
//!   clears the current tip's by a configured basis-point margin. Shallow
//!   forks follow the plain most-work rule.

use std::collections::HashMap;

use parking_lot::Mutex;
use primitive_types::{U256, U512};
use tracing::{debug, info};

use stater_core::difficulty;
use stater_core::error::ForkError;
use stater_core::params::Params;
use stater_core::types::{BlockHeader, Hash256};

/// Metadata for one known header. Callers observe these by value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockMeta {
    pub hash: Hash256,
    /// Zero for genesis.
    pub parent: Hash256,
    pub height: u32,
    pub time: u32,
    pub bits: u32,
    /// Sum of per-header work from genesis along this ancestry.
    pub chain_work: U256,
}

struct Inner {
    index: HashMap<Hash256, BlockMeta>,
    best_tip: Option<BlockMeta>,
}

/// Tracks cumulative work per header and arbitrates competing tips.
pub struct ForkResolver {
    finalization_depth: u32,
    /// Extra work a deep fork must carry, in basis points of the current
    /// tip's cumulative work (10 000 = 100 %).
    reorg_margin_bps: u32,
    inner: Mutex<Inner>,
}

impl ForkResolver {
    pub fn new(finalization_depth: u32, reorg_margin_bps: u32) -> Self {
        Self {
            finalization_depth,
            // A zero margin would make deep reorganizations free.
            reorg_margin_bps: reorg_margin_bps.max(1),
            inner: Mutex::new(Inner {
                index: HashMap::new(),
                best_tip: None,
            }),
        }
    }

    /// Admit a header into the index and decide whether it becomes the
    /// new tip. Returns `true` when it did.
    ///
    /// A non-null parent must already be indexed; an unknown parent is
    /// fatal for the candidate, never silently ignored.
    pub fn consider_header(
        &self,
        header: &BlockHeader,
        hash: Hash256,
        parent_hash: Hash256,
        height: u32,
        params: &Params,
    ) -> Result<bool, ForkError> {
        let block_work = difficulty::block_work(header.bits)?;

        if let Some(expected) = params.checkpoints.get(&height) {
            if *expected != hash {
                return Err(ForkError::CheckpointMismatch(height));
            }
        }

        let mut inner = self.inner.lock();

        let chain_work = if parent_hash.is_zero() {
            block_work
        } else {
            let parent = inner
                .index
                .get(&parent_hash)
                .ok_or_else(|| ForkError::UnknownParent(parent_hash.to_string()))?;
            parent.chain_work.checked_add(block_work).unwrap_or(U256::MAX)
        };

        let meta = BlockMeta {
            hash,
            parent: parent_hash,
            height,
            time: header.time,
            bits: header.bits,
            chain_work,
        };
        inner.index.insert(hash, meta);

        let adopt = match &inner.best_tip {
            None => true,
            Some(current) => self.is_better_chain(&meta, current),
        };
        if adopt {
            let reorged = inner
                .best_tip
                .as_ref()
                .is_some_and(|old| old.hash != parent_hash);
            if reorged {
                info!(height, %hash, "fork displaced best tip");
            } else {
                debug!(height, %hash, "extended best tip");
            }
            inner.best_tip = Some(meta);
        }
        Ok(adopt)
    }

    fn is_better_chain(&self, candidate: &BlockMeta, current: &BlockMeta) -> bool {
        if candidate.chain_work <= current.chain_work {
            return false;
        }

        // Shallow forks follow the most-work rule unconditionally.
        if u64::from(candidate.height) + u64::from(self.finalization_depth)
            >= u64::from(current.height)
        {
            return true;
        }

        // Deep fork: demand the margin on top of the current tip's work.
        let required: U512 = current
            .chain_work
            .full_mul(U256::from(10_000u64 + u64::from(self.reorg_margin_bps)))
            / U512::from(10_000u64);
        U512::from(candidate.chain_work) > required
    }

    /// The current best tip, if any header was admitted.
    pub fn tip(&self) -> Option<BlockMeta> {
        self.inner.lock().best_tip
    }

    /// Metadata for a known header.
    pub fn meta(&self, hash: &Hash256) -> Option<BlockMeta> {
        self.inner.lock().index.get(hash).copied()
    }

    /// Number of headers in the index.
    pub fn header_count(&self) -> usize {
        self.inner.lock().index.len()
    }

    /// Ancestor chain of `target` in genesis-first order.
    ///
    /// Walks parent links until the null-parented genesis. Connecting
    /// blocks in exactly this order keeps the UTXO set and the header
    /// index on the same linearization.
    pub fn reorg_path(&self, target: &Hash256) -> Vec<Hash256> {
        let inner = self.inner.lock();
        let mut path = Vec::new();
        let mut cursor = inner.index.get(target);
        while let Some(meta) = cursor {
            path.push(meta.hash);
            if meta.parent.is_zero() {
                break;
            }
            cursor = inner.index.get(&meta.parent);
        }
        path.reverse();
        path
    }
}
