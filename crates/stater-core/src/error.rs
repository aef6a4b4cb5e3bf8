//! Error types for the Stater consensus core.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unexpected end of input at byte {0}")] UnexpectedEof(usize),
    #[error("trailing bytes after decode: {0}")] TrailingBytes(usize),
    #[error("header must be exactly 80 bytes, got {0}")] BadHeaderLength(usize),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("signature must be 64 bytes, got {0}")] BadSignatureLength(usize),
    #[error("script pubkey must be a 32-byte x-only key, got {0} bytes")] BadPubKeyLength(usize),
    #[error("public key does not lift to a curve point")] InvalidPublicKey,
    #[error("signature verification failed")] VerificationFailed,
    #[error("input index out of bounds: {index} >= {len}")] InputIndexOutOfBounds { index: usize, len: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DifficultyError {
    #[error("compact target has the sign bit set")] NegativeTarget,
    #[error("compact target decodes to zero")] ZeroTarget,
    #[error("compact target exceeds 256 bits")] TargetOverflow,
    #[error("retarget timespan parameter is zero")] ZeroTimespan,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("block has no transactions")] EmptyBlock,
    #[error("first transaction is not a coinbase")] FirstTxNotCoinbase,
    #[error("coinbase not allowed at position {0}")] UnexpectedCoinbase(usize),
    #[error("invalid coinbase: {0}")] InvalidCoinbase(String),
    #[error("empty inputs or outputs")] EmptyInputsOrOutputs,
    #[error("oversized transaction: {size} > {max}")] OversizedTransaction { size: usize, max: usize },
    #[error("block weight exceeded: {weight} > {max}")] BlockWeightExceeded { weight: usize, max: usize },
    #[error("null outpoint in non-coinbase input {0}")] NullOutpoint(usize),
    #[error("scriptSig length {len} out of range on input {index}")] ScriptSigLength { index: usize, len: usize },
    #[error("duplicate spend of {0}")] DuplicateSpend(String),
    #[error("unknown UTXO: {0}")] UnknownUtxo(String),
    #[error("no UTXO lookup available for spend validation")] MissingLookup,
    #[error("asset mismatch: {0}")] AssetMismatch(String),
    #[error("unregistered asset id {0}")] UnknownAsset(u8),
    #[error("coinbase asset not eligible for proof-of-work")] AssetNotMineable,
    #[error("dust output at index {index}: {value}")] DustOutput { index: usize, value: u64 },
    #[error("script pubkey at index {index} is {len} bytes, expected 32")] BadScriptPubKey { index: usize, len: usize },
    #[error("amount outside money range: {0}")] MoneyOutOfRange(u64),
    #[error("value overflow")] ValueOverflow,
    #[error("invalid signature on input {index}")] InvalidSignature { index: usize },
    #[error("outputs {total_out} exceed inputs {total_in}")] Overspend { total_in: u64, total_out: u64 },
    #[error("coinbase pays {paid}, maximum is {max}")] ExcessCoinbase { paid: u64, max: u64 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    #[error("proof of work does not meet target")] InvalidPow,
    #[error("median time past not supplied")] MissingMedianTimePast,
    #[error("timestamp {time} not after median time past {mtp}")] TimestampNotPastMedian { time: u32, mtp: u32 },
    #[error("timestamp {time} too far in the future (horizon {horizon})")] TimestampTooFar { time: u32, horizon: u32 },
    #[error("required state root anchor is missing")] MissingStateRoot,
    #[error("state root anchor does not match expected value")] StateRootMismatch,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockError {
    #[error(transparent)] Header(#[from] HeaderError),
    #[error(transparent)] Transactions(#[from] TransactionError),
    #[error("merkle root does not commit to the transaction list")] MerkleMismatch,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("i/o: {0}")] Io(String),
    #[error("corrupt chain state: {0}")] Corrupt(String),
    #[error("spend of missing UTXO: {0}")] MissingUtxo(String),
    #[error("unknown key: {0}")] UnknownKey(String),
    #[error("backend: {0}")] Backend(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MempoolError {
    #[error("transaction already in pool: {0}")] AlreadyExists(String),
    #[error("fee {fee} below required {required}")] FeeTooLow { fee: u64, required: u64 },
    #[error("oversized for relay: {size} > {max}")] Oversized { size: usize, max: usize },
    #[error("conflicting pool transaction is not replaceable: {0}")] NotReplaceable(String),
    #[error("replacement fee rate {new} not above {existing}")] ReplacementUnderpriced { new: u64, existing: u64 },
    #[error("rejected by consensus validation: {0}")] Rejected(#[from] TransactionError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ForkError {
    #[error("parent header unknown: {0}")] UnknownParent(String),
    #[error("conflicts with checkpoint at height {0}")] CheckpointMismatch(u32),
    #[error(transparent)] Difficulty(#[from] DifficultyError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenesisError {
    #[error("supplied genesis nonce does not satisfy proof of work")] BadNonce,
    #[error("exhausted nonce space mining genesis")] NonceExhausted,
    #[error(transparent)] Difficulty(#[from] DifficultyError),
}

/// Umbrella error for callers that compose several core components.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error(transparent)] Decode(#[from] DecodeError),
    #[error(transparent)] Crypto(#[from] CryptoError),
    #[error(transparent)] Difficulty(#[from] DifficultyError),
    #[error(transparent)] Transaction(#[from] TransactionError),
    #[error(transparent)] Header(#[from] HeaderError),
    #[error(transparent)] Block(#[from] BlockError),
    #[error(transparent)] Store(#[from] StoreError),
    #[error(transparent)] Mempool(#[from] MempoolError),
    #[error(transparent)] Fork(#[from] ForkError),
    #[error(transparent)] Genesis(#[from] GenesisError),
}
