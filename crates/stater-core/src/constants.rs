//! Protocol constants. All monetary values in lepta (1 STR = 10^8 lepta).

pub const COIN: u64 = 100_000_000;

/// Hard cap on the canonical size of a single transaction.
pub const MAX_TX_SIZE: usize = 1_000_000;

/// Approximate block weight limit. Weight is canonical size times
/// [`WEIGHT_PER_BYTE`].
pub const MAX_BLOCK_WEIGHT: usize = 4_000_000;
pub const WEIGHT_PER_BYTE: usize = 4;

/// Outputs below this value are unspendable noise and rejected outright.
pub const DUST_FLOOR: u64 = 546;

/// Upper bound on a non-coinbase scriptSig.
pub const MAX_SCRIPT_SIG: usize = 1_650;

/// Coinbase scriptSig carries arbitrary miner data within these bounds.
pub const MIN_COINBASE_SIG: usize = 2;
pub const MAX_COINBASE_SIG: usize = 100;

/// Every spendable output commits to a 32-byte x-only public key.
pub const SCRIPT_PUBKEY_LEN: usize = 32;

/// BIP-340 Schnorr signatures are exactly 64 bytes.
pub const SIGNATURE_LEN: usize = 64;

/// Maximum tolerated clock drift for incoming header timestamps (seconds).
pub const MAX_FUTURE_DRIFT: u32 = 2 * 60 * 60;

/// Inputs with a sequence below this signal opt-in replaceability.
pub const SEQUENCE_RBF_THRESHOLD: u32 = 0xFFFF_FFFE;

/// Serialized block header size on the wire.
pub const HEADER_SIZE: usize = 80;

/// Number of trailing headers over which median time past is computed.
pub const MTP_WINDOW: usize = 11;

/// Default bound on the chain state lookaside cache.
pub const DEFAULT_CACHE_ENTRIES: usize = 64 * 1024;
