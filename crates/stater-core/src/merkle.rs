//! Tagged Merkle root over a transaction list.
//!
//! Leaves are transaction IDs (tagged hashes of the canonical
//! serialization); interior nodes hash the concatenation of their children
//! under the `"MERKLE"` tag. Odd layers duplicate their last element. The
//! empty list maps to [`Hash256::ZERO`], which is never reached in
//! consensus because every block carries a coinbase.

use crate::hash::{TAG_MERKLE, tagged_hash};
use crate::types::{Hash256, Transaction};

/// Hash a pair of sibling nodes into their parent.
pub fn node_hash(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut preimage = [0u8; 64];
    preimage[..32].copy_from_slice(left.as_bytes());
    preimage[32..].copy_from_slice(right.as_bytes());
    tagged_hash(TAG_MERKLE, &preimage)
}

/// Compute the Merkle root from precomputed leaves (transaction IDs).
pub fn merkle_root(leaves: &[Hash256]) -> Hash256 {
    if leaves.is_empty() {
        return Hash256::ZERO;
    }

    let mut layer = leaves.to_vec();
    while layer.len() > 1 {
        layer = next_layer(&layer);
    }
    layer[0]
}

/// Compute the Merkle root for a block's transaction list.
pub fn block_merkle_root(transactions: &[Transaction]) -> Hash256 {
    let txids: Vec<Hash256> = transactions.iter().map(Transaction::txid).collect();
    merkle_root(&txids)
}

/// Pair adjacent hashes into the next layer, duplicating the last element
/// when the layer has odd length.
fn next_layer(layer: &[Hash256]) -> Vec<Hash256> {
    let mut next = Vec::with_capacity(layer.len().div_ceil(2));
    let mut i = 0;
    while i < layer.len() {
        let left = &layer[i];
        let right = if i + 1 < layer.len() { &layer[i + 1] } else { left };
        next.push(node_hash(left, right));
        i += 2;
    }
    next
}
