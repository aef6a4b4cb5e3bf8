//! Atomic application of blocks to the chain state.
//!
//! [`connect_block`] is the single write path into the UTXO set. It
//! revalidates the block (header, transaction set, Merkle commitment),
//! stages every mutation inside a chain state transaction, and commits
//! only if the whole block applies. Any failure rolls the staged changes
//! back, leaving the set exactly as it was.

use std::collections::HashSet;

use tracing::{debug, warn};

use stater_core::chainstate::Chainstate;
use stater_core::error::{CoreError, TransactionError};
use stater_core::params::Params;
use stater_core::types::{Block, OutPoint};
use stater_core::validation::{self, UtxoLookup, ValidationOptions};

/// Totals from a successfully connected block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectResult {
    /// UTXOs created by the block's outputs.
    pub utxos_created: usize,
    /// UTXOs consumed by the block's non-coinbase inputs.
    pub utxos_spent: usize,
    /// Sum of transaction fees paid in the block.
    pub total_fees: u64,
}

/// Validate `block` and apply it to `chainstate` at `height`.
///
/// `fallback` supplies UTXOs not present in the store (e.g. outputs of a
/// sibling chain segment during reorg replay). On any rejection or store
/// failure the chain state is rolled back and the error surfaced; the
/// tip and set are untouched.
pub fn connect_block(
    block: &Block,
    chainstate: &Chainstate,
    params: &Params,
    height: u32,
    fallback: Option<UtxoLookup<'_>>,
    opts: &ValidationOptions,
) -> Result<ConnectResult, CoreError> {
    // Full validation first: PoW, timestamps, scripts, conservation, and
    // the Merkle commitment. Nothing is staged for an invalid block.
    let lookup = |outpoint: &OutPoint| {
        chainstate
            .get(outpoint)
            .or_else(|| fallback.and_then(|f| f(outpoint)))
    };
    let summary = validation::validate_block(block, params, height, Some(&lookup), opts)?;

    chainstate.begin();
    match apply_transactions(block, chainstate, fallback) {
        Ok((created, spent)) => {
            chainstate.commit()?;
            debug!(height, created, spent, fees = summary.total_fees, "connected block");
            Ok(ConnectResult {
                utxos_created: created,
                utxos_spent: spent,
                total_fees: summary.total_fees,
            })
        }
        Err(e) => {
            warn!(height, error = %e, "block rejected during application");
            chainstate.rollback();
            Err(e)
        }
    }
}

/// Stage the block's mutations. Caller owns begin/commit/rollback.
fn apply_transactions(
    block: &Block,
    chainstate: &Chainstate,
    fallback: Option<UtxoLookup<'_>>,
) -> Result<(usize, usize), CoreError> {
    // The validator's lookup is cached, so it alone cannot see a UTXO
    // spent twice across cache generations. This set is authoritative
    // for intra-block double spends.
    let mut spent_in_block: HashSet<OutPoint> = HashSet::new();
    let mut created = 0usize;
    let mut spent = 0usize;

    for tx in &block.transactions {
        let coinbase = tx.is_coinbase();

        if !coinbase {
            for input in &tx.inputs {
                if !spent_in_block.insert(input.prevout) {
                    return Err(TransactionError::DuplicateSpend(input.prevout.to_string()).into());
                }
                let available = chainstate.have(&input.prevout)
                    || fallback.is_some_and(|f| f(&input.prevout).is_some());
                if !available {
                    return Err(TransactionError::UnknownUtxo(input.prevout.to_string()).into());
                }
            }
        }

        let txid = tx.txid();
        for (index, output) in tx.outputs.iter().enumerate() {
            let outpoint = OutPoint {
                txid,
                index: index as u32,
            };
            chainstate.add(outpoint, output.clone())?;
            created += 1;
        }

        if !coinbase {
            for input in &tx.inputs {
                chainstate.spend(&input.prevout)?;
                spent += 1;
            }
        }
    }

    Ok((created, spent))
}
