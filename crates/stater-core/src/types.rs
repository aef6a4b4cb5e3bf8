//! Core protocol types: transactions, blocks, UTXOs.
//!
//! All monetary values are in lepta (1 STR = 10^8 lepta). Wire layouts for
//! these types are defined in [`wire`](crate::wire); hashing lives in
//! [`hash`](crate::hash).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::hash::{TAG_BLOCK, TAG_TX, tagged_hash};
use crate::wire;

/// A 32-byte digest.
///
/// Equality and ordering are byte-wise, treating the digest as a big-endian
/// integer. The zero value doubles as the "no parent" marker for genesis
/// and the null-outpoint hash for coinbase inputs.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The zero hash (32 zero bytes).
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Identifier of the asset a UTXO is denominated in.
///
/// Stater is multi-asset: every input and output of a transaction must
/// carry the same asset, and value conservation is checked per asset. The
/// set of registered assets and their policies live in
/// [`Params`](crate::params::Params).
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
)]
pub struct AssetId(pub u8);

impl AssetId {
    /// Stater, the proof-of-work asset. Decoded transactions default here.
    pub const STR: Self = Self(0);
    /// Drachm, the secondary settlement asset.
    pub const DRM: Self = Self(1);
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::STR => write!(f, "STR"),
            Self::DRM => write!(f, "DRM"),
            Self(other) => write!(f, "asset({other})"),
        }
    }
}

/// Reference to a specific output of a previous transaction.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutPoint {
    /// Transaction containing the referenced output.
    pub txid: Hash256,
    /// Index of the output within that transaction.
    pub index: u32,
}

impl OutPoint {
    /// The null outpoint, used exclusively by coinbase inputs.
    pub fn null() -> Self {
        Self {
            txid: Hash256::ZERO,
            index: u32::MAX,
        }
    }

    /// Check if this is the null outpoint (coinbase marker).
    pub fn is_null(&self) -> bool {
        // Index first; cheaper than scanning the hash.
        self.index == u32::MAX && self.txid.is_zero()
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.index)
    }
}

/// A transaction input, spending a previous output.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TxIn {
    /// The outpoint being spent. Null outpoint for coinbase.
    pub prevout: OutPoint,
    /// 64-byte Schnorr signature for regular inputs; arbitrary miner data
    /// (2–100 bytes) for the coinbase.
    pub script_sig: Vec<u8>,
    /// Sequence number. Values below `0xFFFFFFFE` signal replaceability.
    pub sequence: u32,
    /// Asset this input spends. Not serialized; must agree with the
    /// referenced UTXO during validation.
    pub asset: AssetId,
}

/// A transaction output, creating a new UTXO.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TxOut {
    /// Value in the asset's smallest units.
    pub value: u64,
    /// 32-byte x-only Schnorr public key of the recipient.
    pub script_pubkey: Vec<u8>,
    /// Asset this output is denominated in. Not serialized.
    pub asset: AssetId,
}

/// A transaction transferring value within a single asset.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    /// Protocol version.
    pub version: u32,
    /// Inputs consuming previous outputs.
    pub inputs: Vec<TxIn>,
    /// New outputs created by this transaction.
    pub outputs: Vec<TxOut>,
    /// Earliest time or height at which the transaction is final.
    pub lock_time: u32,
}

impl Transaction {
    /// Compute the transaction ID: the tagged hash of the canonical
    /// serialization under the `"TX"` tag.
    pub fn txid(&self) -> Hash256 {
        tagged_hash(TAG_TX, &wire::serialize_tx(self))
    }

    /// Check if this is a coinbase transaction (single input with null
    /// outpoint).
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].prevout.is_null()
    }

    /// Sum of all output values. Returns `None` on overflow.
    pub fn total_output_value(&self) -> Option<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |acc, out| acc.checked_add(out.value))
    }

    /// Canonical serialized size in bytes.
    pub fn size(&self) -> usize {
        wire::serialize_tx(self).len()
    }
}

/// Block header: the 80-byte proof-of-work commitment.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockHeader {
    /// Protocol/signalling version.
    pub version: u32,
    /// Hash of the previous block header. Zero for genesis.
    pub prev_hash: Hash256,
    /// Tagged Merkle root over the block's transactions.
    pub merkle_root: Hash256,
    /// Unix timestamp in seconds.
    pub time: u32,
    /// Compact difficulty target.
    pub bits: u32,
    /// Proof-of-work nonce.
    pub nonce: u32,
}

impl BlockHeader {
    /// Compute the block hash: the tagged hash of the canonical 80-byte
    /// serialization under the `"BLOCK"` tag.
    pub fn hash(&self) -> Hash256 {
        tagged_hash(TAG_BLOCK, &wire::serialize_header(self))
    }
}

/// A complete block: header plus transactions.
///
/// Non-empty by rule; the first transaction is the coinbase.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Get the coinbase transaction, if the block is non-empty.
    pub fn coinbase(&self) -> Option<&Transaction> {
        self.transactions.first()
    }
}
