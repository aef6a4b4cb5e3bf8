//! Header and transaction-set validation.
//!
//! Three levels:
//!
//! - [`validate_header`]: proof of work and timestamp rules (context from
//!   the caller: median time past and wall clock).
//! - [`validate_transactions`]: the full per-block transaction sequence
//!   against a UTXO lookup, including script verification, per-asset value
//!   conservation, and the coinbase subsidy ceiling.
//! - [`validate_transaction`]: a single non-coinbase transaction against
//!   the UTXO set, used on the mempool admission path.
//!
//! All functions are total: invalid input produces a typed rejection and
//! never mutates anything.

use std::collections::{HashMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::constants::{
    MAX_BLOCK_WEIGHT, MAX_COINBASE_SIG, MAX_FUTURE_DRIFT, MAX_SCRIPT_SIG, MAX_TX_SIZE,
    MIN_COINBASE_SIG, SCRIPT_PUBKEY_LEN, WEIGHT_PER_BYTE,
};
use crate::crypto;
use crate::difficulty;
use crate::error::{BlockError, HeaderError, TransactionError};
use crate::merkle;
use crate::params::Params;
use crate::types::{AssetId, Block, BlockHeader, Hash256, OutPoint, Transaction, TxOut};

/// Borrowed UTXO lookup: outpoint to the output it created, if unspent.
pub type UtxoLookup<'a> = &'a dyn Fn(&OutPoint) -> Option<TxOut>;

/// Caller-supplied context for header and block validation.
#[derive(Clone, Debug)]
pub struct ValidationOptions {
    /// Median of the previous 11 header timestamps. Zero is rejected:
    /// every production path must supply real ordering context.
    pub median_time_past: u32,
    /// Current wall clock (or network-adjusted) time.
    pub now: u32,
    /// Tolerated drift into the future, in seconds.
    pub max_future_drift: u32,
    /// When set, the block must carry a non-zero sidechain state root.
    pub require_state_root: bool,
    /// State root anchor supplied alongside the block.
    pub state_root: Hash256,
    /// Expected anchor value; zero skips the equality check.
    pub expected_state_root: Hash256,
}

impl ValidationOptions {
    /// Options with an explicit clock.
    pub fn new(median_time_past: u32, now: u32) -> Self {
        Self {
            median_time_past,
            now,
            max_future_drift: MAX_FUTURE_DRIFT,
            require_state_root: false,
            state_root: Hash256::ZERO,
            expected_state_root: Hash256::ZERO,
        }
    }

    /// Options using the system clock.
    pub fn for_now(median_time_past: u32) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs().min(u64::from(u32::MAX)) as u32)
            .unwrap_or(0);
        Self::new(median_time_past, now)
    }
}

/// Validate header fields: proof of work, median-time-past ordering, and
/// future drift.
pub fn validate_header(
    header: &BlockHeader,
    params: &Params,
    opts: &ValidationOptions,
) -> Result<(), HeaderError> {
    if !difficulty::check_proof_of_work(&header.hash(), header.bits, params) {
        return Err(HeaderError::InvalidPow);
    }

    if opts.median_time_past == 0 {
        return Err(HeaderError::MissingMedianTimePast);
    }
    if header.time <= opts.median_time_past {
        return Err(HeaderError::TimestampNotPastMedian {
            time: header.time,
            mtp: opts.median_time_past,
        });
    }

    let horizon = (u64::from(opts.now) + u64::from(opts.max_future_drift))
        .min(u64::from(u32::MAX)) as u32;
    if header.time > horizon {
        return Err(HeaderError::TimestampTooFar {
            time: header.time,
            horizon,
        });
    }

    Ok(())
}

/// Totals produced by a successful transaction-set validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TxSetSummary {
    /// Sum of all transaction fees in the block.
    pub total_fees: u64,
    /// Total value minted by the coinbase.
    pub coinbase_value: u64,
    /// Asset the coinbase is denominated in.
    pub coinbase_asset: AssetId,
}

/// Summary of a successfully validated standalone transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValidatedTransaction {
    pub total_input: u64,
    pub total_output: u64,
    /// `total_input - total_output`. Zero fees are legal.
    pub fee: u64,
}

/// Short-lived lookaside over the caller's UTXO lookup, so repeated
/// references within one block hit memory instead of the backing store.
struct CachedLookup<'a> {
    base: UtxoLookup<'a>,
    capacity: usize,
    cache: HashMap<OutPoint, TxOut>,
}

impl<'a> CachedLookup<'a> {
    fn new(base: UtxoLookup<'a>, capacity: usize) -> Self {
        Self {
            base,
            capacity,
            cache: HashMap::new(),
        }
    }

    fn get(&mut self, outpoint: &OutPoint) -> Option<TxOut> {
        if let Some(hit) = self.cache.get(outpoint) {
            return Some(hit.clone());
        }
        let found = (self.base)(outpoint)?;
        if self.cache.len() >= self.capacity {
            self.cache.clear();
        }
        self.cache.insert(*outpoint, found.clone());
        Some(found)
    }
}

/// Fold `candidate` into the transaction's single-asset constraint.
fn merge_asset(
    current: &mut Option<AssetId>,
    candidate: AssetId,
    params: &Params,
) -> Result<(), TransactionError> {
    if !params.is_asset_registered(candidate) {
        return Err(TransactionError::UnknownAsset(candidate.0));
    }
    match current {
        Some(existing) if *existing != candidate => Err(TransactionError::AssetMismatch(format!(
            "{existing} vs {candidate}"
        ))),
        _ => {
            *current = Some(candidate);
            Ok(())
        }
    }
}

fn checked_sum(acc: u64, value: u64) -> Result<u64, TransactionError> {
    acc.checked_add(value).ok_or(TransactionError::ValueOverflow)
}

/// Validate a block's transaction sequence.
///
/// The first transaction must be the coinbase and the only one; every
/// other transaction must spend existing UTXOs exactly once, verify its
/// scripts, stay within one asset, and conserve value. The coinbase may
/// mint at most `subsidy(height, asset) + total fees`.
pub fn validate_transactions(
    txs: &[Transaction],
    params: &Params,
    height: u32,
    lookup: Option<UtxoLookup<'_>>,
) -> Result<TxSetSummary, TransactionError> {
    let coinbase = txs.first().ok_or(TransactionError::EmptyBlock)?;
    if !coinbase.is_coinbase() {
        return Err(TransactionError::FirstTxNotCoinbase);
    }
    if coinbase.outputs.is_empty() {
        return Err(TransactionError::InvalidCoinbase("no outputs".into()));
    }

    let sig_len = coinbase.inputs[0].script_sig.len();
    if !(MIN_COINBASE_SIG..=MAX_COINBASE_SIG).contains(&sig_len) {
        return Err(TransactionError::InvalidCoinbase(format!(
            "scriptSig length {sig_len} outside [{MIN_COINBASE_SIG}, {MAX_COINBASE_SIG}]"
        )));
    }

    let mut coinbase_asset: Option<AssetId> = None;
    let mut coinbase_value: u64 = 0;
    for (i, out) in coinbase.outputs.iter().enumerate() {
        merge_asset(&mut coinbase_asset, out.asset, params)?;
        coinbase_value = checked_sum(coinbase_value, out.value)?;
        if !params.money_range(out.value, out.asset) {
            return Err(TransactionError::MoneyOutOfRange(out.value));
        }
        if !params.money_range(coinbase_value, out.asset) {
            return Err(TransactionError::MoneyOutOfRange(coinbase_value));
        }
        if out.script_pubkey.len() != SCRIPT_PUBKEY_LEN {
            return Err(TransactionError::BadScriptPubKey {
                index: i,
                len: out.script_pubkey.len(),
            });
        }
    }
    merge_asset(&mut coinbase_asset, coinbase.inputs[0].asset, params)?;
    let coinbase_asset = coinbase_asset.expect("coinbase has at least one output");

    if params.multi_asset_active(height) {
        let mineable = params
            .asset_policy(coinbase_asset)
            .map(|p| p.pow_allowed)
            .unwrap_or(false);
        if !mineable {
            return Err(TransactionError::AssetNotMineable);
        }
    }

    let mut seen_prevouts: HashSet<OutPoint> = HashSet::with_capacity(txs.len() * 2);
    let mut running_weight: usize = 0;
    let mut total_fees: u64 = 0;
    let mut cached = lookup.map(|base| CachedLookup::new(base, 1_024));

    for (position, tx) in txs.iter().enumerate().skip(1) {
        if tx.is_coinbase() {
            return Err(TransactionError::UnexpectedCoinbase(position));
        }
        if tx.inputs.is_empty() || tx.outputs.is_empty() {
            return Err(TransactionError::EmptyInputsOrOutputs);
        }

        let size = tx.size();
        if size == 0 || size > MAX_TX_SIZE {
            return Err(TransactionError::OversizedTransaction {
                size,
                max: MAX_TX_SIZE,
            });
        }
        running_weight += size * WEIGHT_PER_BYTE;
        if running_weight > MAX_BLOCK_WEIGHT {
            return Err(TransactionError::BlockWeightExceeded {
                weight: running_weight,
                max: MAX_BLOCK_WEIGHT,
            });
        }

        let mut tx_asset: Option<AssetId> = None;

        let mut total_out: u64 = 0;
        for (i, out) in tx.outputs.iter().enumerate() {
            merge_asset(&mut tx_asset, out.asset, params)?;
            total_out = checked_sum(total_out, out.value)?;
            if !params.money_range(out.value, out.asset) || !params.money_range(total_out, out.asset)
            {
                return Err(TransactionError::MoneyOutOfRange(total_out));
            }
            if out.script_pubkey.len() != SCRIPT_PUBKEY_LEN {
                return Err(TransactionError::BadScriptPubKey {
                    index: i,
                    len: out.script_pubkey.len(),
                });
            }
            if out.value < params.dust_floor(out.asset) {
                return Err(TransactionError::DustOutput {
                    index: i,
                    value: out.value,
                });
            }
        }

        let cached = cached.as_mut().ok_or(TransactionError::MissingLookup)?;

        let mut total_in: u64 = 0;
        for (i, input) in tx.inputs.iter().enumerate() {
            if input.prevout.is_null() {
                return Err(TransactionError::NullOutpoint(i));
            }
            let sig_len = input.script_sig.len();
            if sig_len == 0 || sig_len > MAX_SCRIPT_SIG {
                return Err(TransactionError::ScriptSigLength { index: i, len: sig_len });
            }
            merge_asset(&mut tx_asset, input.asset, params)?;

            if !seen_prevouts.insert(input.prevout) {
                return Err(TransactionError::DuplicateSpend(input.prevout.to_string()));
            }

            let utxo = cached
                .get(&input.prevout)
                .ok_or_else(|| TransactionError::UnknownUtxo(input.prevout.to_string()))?;
            if input.asset != utxo.asset {
                return Err(TransactionError::AssetMismatch(format!(
                    "input {} spends {} with asset {}",
                    i, utxo.asset, input.asset
                )));
            }
            merge_asset(&mut tx_asset, utxo.asset, params)?;

            crypto::verify_input(tx, i, &utxo)
                .map_err(|_| TransactionError::InvalidSignature { index: i })?;

            total_in = checked_sum(total_in, utxo.value)?;
            if !params.money_range(total_in, utxo.asset) {
                return Err(TransactionError::MoneyOutOfRange(total_in));
            }
        }

        if total_out > total_in {
            return Err(TransactionError::Overspend { total_in, total_out });
        }

        total_fees = checked_sum(total_fees, total_in - total_out)?;
        if total_fees > params.max_money_out {
            return Err(TransactionError::MoneyOutOfRange(total_fees));
        }
    }

    let max_coinbase = params
        .subsidy(height, coinbase_asset)
        .checked_add(total_fees)
        .ok_or(TransactionError::ValueOverflow)?;
    if coinbase_value > max_coinbase {
        return Err(TransactionError::ExcessCoinbase {
            paid: coinbase_value,
            max: max_coinbase,
        });
    }

    Ok(TxSetSummary {
        total_fees,
        coinbase_value,
        coinbase_asset,
    })
}

/// Validate one non-coinbase transaction against the UTXO set.
///
/// Mempool admission path: structural checks, script verification, asset
/// agreement, and value conservation, returning the computed fee.
pub fn validate_transaction(
    tx: &Transaction,
    params: &Params,
    lookup: UtxoLookup<'_>,
) -> Result<ValidatedTransaction, TransactionError> {
    if tx.is_coinbase() {
        return Err(TransactionError::InvalidCoinbase(
            "coinbase cannot be validated standalone".into(),
        ));
    }
    if tx.inputs.is_empty() || tx.outputs.is_empty() {
        return Err(TransactionError::EmptyInputsOrOutputs);
    }

    let size = tx.size();
    if size == 0 || size > MAX_TX_SIZE {
        return Err(TransactionError::OversizedTransaction {
            size,
            max: MAX_TX_SIZE,
        });
    }

    let mut tx_asset: Option<AssetId> = None;

    let mut total_output: u64 = 0;
    for (i, out) in tx.outputs.iter().enumerate() {
        merge_asset(&mut tx_asset, out.asset, params)?;
        total_output = checked_sum(total_output, out.value)?;
        if !params.money_range(out.value, out.asset) || !params.money_range(total_output, out.asset)
        {
            return Err(TransactionError::MoneyOutOfRange(total_output));
        }
        if out.script_pubkey.len() != SCRIPT_PUBKEY_LEN {
            return Err(TransactionError::BadScriptPubKey {
                index: i,
                len: out.script_pubkey.len(),
            });
        }
        if out.value < params.dust_floor(out.asset) {
            return Err(TransactionError::DustOutput {
                index: i,
                value: out.value,
            });
        }
    }

    let mut seen: HashSet<OutPoint> = HashSet::with_capacity(tx.inputs.len());
    let mut total_input: u64 = 0;
    for (i, input) in tx.inputs.iter().enumerate() {
        if input.prevout.is_null() {
            return Err(TransactionError::NullOutpoint(i));
        }
        let sig_len = input.script_sig.len();
        if sig_len == 0 || sig_len > MAX_SCRIPT_SIG {
            return Err(TransactionError::ScriptSigLength { index: i, len: sig_len });
        }
        if !seen.insert(input.prevout) {
            return Err(TransactionError::DuplicateSpend(input.prevout.to_string()));
        }
        merge_asset(&mut tx_asset, input.asset, params)?;

        let utxo = lookup(&input.prevout)
            .ok_or_else(|| TransactionError::UnknownUtxo(input.prevout.to_string()))?;
        if input.asset != utxo.asset {
            return Err(TransactionError::AssetMismatch(format!(
                "input {} spends {} with asset {}",
                i, utxo.asset, input.asset
            )));
        }
        merge_asset(&mut tx_asset, utxo.asset, params)?;

        crypto::verify_input(tx, i, &utxo)
            .map_err(|_| TransactionError::InvalidSignature { index: i })?;

        total_input = checked_sum(total_input, utxo.value)?;
        if !params.money_range(total_input, utxo.asset) {
            return Err(TransactionError::MoneyOutOfRange(total_input));
        }
    }

    if total_output > total_input {
        return Err(TransactionError::Overspend {
            total_in: total_input,
            total_out: total_output,
        });
    }

    Ok(ValidatedTransaction {
        total_input,
        total_output,
        fee: total_input - total_output,
    })
}

/// Validate a complete block: header rules, optional state-root anchor,
/// transaction set, and the Merkle commitment.
pub fn validate_block(
    block: &Block,
    params: &Params,
    height: u32,
    lookup: Option<UtxoLookup<'_>>,
    opts: &ValidationOptions,
) -> Result<TxSetSummary, BlockError> {
    validate_header(&block.header, params, opts)?;

    if opts.require_state_root {
        if opts.state_root.is_zero() {
            return Err(BlockError::Header(HeaderError::MissingStateRoot));
        }
        if !opts.expected_state_root.is_zero() && opts.state_root != opts.expected_state_root {
            return Err(BlockError::Header(HeaderError::StateRootMismatch));
        }
    }

    let summary = validate_transactions(&block.transactions, params, height, lookup)?;

    if merkle::block_merkle_root(&block.transactions) != block.header.merkle_root {
        return Err(BlockError::MerkleMismatch);
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::COIN;
    use crate::crypto::{keypair_from_secret, script_pubkey_for, sign_input};
    use crate::types::TxIn;
    use secp256k1::Keypair;

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn params() -> Params {
        Params::regtest()
    }

    fn keypair(seed: u8) -> Keypair {
        keypair_from_secret(&[seed; 32]).unwrap()
    }

    fn coinbase(value: u64, asset: AssetId) -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![TxIn {
                prevout: OutPoint::null(),
                script_sig: b"mined by tests".to_vec(),
                sequence: u32::MAX,
                asset,
            }],
            outputs: vec![TxOut {
                value,
                script_pubkey: vec![0x01; 32],
                asset,
            }],
            lock_time: 0,
        }
    }

    /// A signed transaction spending `outpoints` (all owned by `kp`,
    /// all of `asset`) into one output of `out_value`.
    fn signed_spend(
        kp: &Keypair,
        outpoints: &[OutPoint],
        out_value: u64,
        asset: AssetId,
    ) -> Transaction {
        let mut tx = Transaction {
            version: 1,
            inputs: outpoints
                .iter()
                .map(|op| TxIn {
                    prevout: *op,
                    script_sig: vec![],
                    sequence: u32::MAX,
                    asset,
                })
                .collect(),
            outputs: vec![TxOut {
                value: out_value,
                script_pubkey: vec![0x02; 32],
                asset,
            }],
            lock_time: 0,
        };
        for i in 0..tx.inputs.len() {
            sign_input(&mut tx, i, kp).unwrap();
        }
        tx
    }

    fn utxo(value: u64, kp: &Keypair, asset: AssetId) -> TxOut {
        TxOut {
            value,
            script_pubkey: script_pubkey_for(kp),
            asset,
        }
    }

    fn lookup_in(map: &HashMap<OutPoint, TxOut>) -> impl Fn(&OutPoint) -> Option<TxOut> + '_ {
        |op| map.get(op).cloned()
    }

    fn op(seed: u8, index: u32) -> OutPoint {
        OutPoint {
            txid: Hash256([seed; 32]),
            index,
        }
    }

    /// Iterate the nonce until the header satisfies its own target.
    fn mine(mut header: BlockHeader, p: &Params) -> BlockHeader {
        while !difficulty::check_proof_of_work(&header.hash(), header.bits, p) {
            header.nonce += 1;
        }
        header
    }

    // ------------------------------------------------------------------
    // Header validation
    // ------------------------------------------------------------------

    fn sample_header(p: &Params, time: u32) -> BlockHeader {
        mine(
            BlockHeader {
                version: 1,
                prev_hash: Hash256::ZERO,
                merkle_root: Hash256([0x33; 32]),
                time,
                bits: p.genesis_bits,
                nonce: 0,
            },
            p,
        )
    }

    #[test]
    fn header_accepts_sane_fields() {
        let p = params();
        let h = sample_header(&p, 1_000);
        validate_header(&h, &p, &ValidationOptions::new(999, 1_000)).unwrap();
    }

    #[test]
    fn header_rejects_zero_mtp() {
        let p = params();
        let h = sample_header(&p, 1_000);
        assert_eq!(
            validate_header(&h, &p, &ValidationOptions::new(0, 1_000)).unwrap_err(),
            HeaderError::MissingMedianTimePast
        );
    }

    #[test]
    fn header_time_must_exceed_mtp() {
        let p = params();
        let h = sample_header(&p, 1_000);
        // time == mtp is rejected; one second past the median passes.
        assert!(matches!(
            validate_header(&h, &p, &ValidationOptions::new(1_000, 1_000)).unwrap_err(),
            HeaderError::TimestampNotPastMedian { .. }
        ));
        validate_header(&h, &p, &ValidationOptions::new(999, 1_000)).unwrap();
    }

    #[test]
    fn header_rejects_far_future() {
        let p = params();
        let h = sample_header(&p, 50_000);
        let opts = ValidationOptions {
            max_future_drift: 100,
            ..ValidationOptions::new(1, 10_000)
        };
        assert!(matches!(
            validate_header(&h, &p, &opts).unwrap_err(),
            HeaderError::TimestampTooFar { .. }
        ));
    }

    #[test]
    fn header_future_boundary_is_inclusive() {
        let p = params();
        let h = sample_header(&p, 10_100);
        let opts = ValidationOptions {
            max_future_drift: 100,
            ..ValidationOptions::new(1, 10_000)
        };
        validate_header(&h, &p, &opts).unwrap();
    }

    #[test]
    fn header_rejects_failed_pow() {
        let p = Params::mainnet();
        // Unmined header against the real mainnet target.
        let h = BlockHeader {
            version: 1,
            prev_hash: Hash256::ZERO,
            merkle_root: Hash256([0xFF; 32]),
            time: 1_000,
            bits: p.genesis_bits,
            nonce: 0,
        };
        if difficulty::check_proof_of_work(&h.hash(), h.bits, &p) {
            return; // astronomically unlikely lucky hash
        }
        assert_eq!(
            validate_header(&h, &p, &ValidationOptions::new(1, 1_000)).unwrap_err(),
            HeaderError::InvalidPow
        );
    }

    // ------------------------------------------------------------------
    // Transaction set: coinbase rules
    // ------------------------------------------------------------------

    #[test]
    fn empty_block_rejected() {
        assert_eq!(
            validate_transactions(&[], &params(), 1, None).unwrap_err(),
            TransactionError::EmptyBlock
        );
    }

    #[test]
    fn coinbase_only_block_accepted() {
        let p = params();
        let summary =
            validate_transactions(&[coinbase(50 * COIN, AssetId::STR)], &p, 1, None).unwrap();
        assert_eq!(summary.total_fees, 0);
        assert_eq!(summary.coinbase_value, 50 * COIN);
        assert_eq!(summary.coinbase_asset, AssetId::STR);
    }

    #[test]
    fn first_tx_must_be_coinbase() {
        let p = params();
        let kp = keypair(1);
        let tx = signed_spend(&kp, &[op(0x11, 0)], 1_000, AssetId::STR);
        assert_eq!(
            validate_transactions(&[tx], &p, 1, None).unwrap_err(),
            TransactionError::FirstTxNotCoinbase
        );
    }

    #[test]
    fn second_coinbase_rejected() {
        let p = params();
        let txs = vec![coinbase(50 * COIN, AssetId::STR), coinbase(1, AssetId::STR)];
        assert_eq!(
            validate_transactions(&txs, &p, 1, None).unwrap_err(),
            TransactionError::UnexpectedCoinbase(1)
        );
    }

    #[test]
    fn coinbase_script_sig_bounds() {
        let p = params();
        let mut short = coinbase(50 * COIN, AssetId::STR);
        short.inputs[0].script_sig = vec![0x01];
        assert!(matches!(
            validate_transactions(&[short], &p, 1, None).unwrap_err(),
            TransactionError::InvalidCoinbase(_)
        ));

        let mut long = coinbase(50 * COIN, AssetId::STR);
        long.inputs[0].script_sig = vec![0x01; 101];
        assert!(matches!(
            validate_transactions(&[long], &p, 1, None).unwrap_err(),
            TransactionError::InvalidCoinbase(_)
        ));
    }

    #[test]
    fn coinbase_output_script_must_be_32_bytes() {
        let p = params();
        let mut cb = coinbase(50 * COIN, AssetId::STR);
        cb.outputs[0].script_pubkey = vec![0x01; 31];
        assert!(matches!(
            validate_transactions(&[cb], &p, 1, None).unwrap_err(),
            TransactionError::BadScriptPubKey { index: 0, len: 31 }
        ));
    }

    #[test]
    fn coinbase_overpay_rejected_at_one_unit() {
        let p = params();
        let subsidy = p.subsidy(1, AssetId::STR);
        validate_transactions(&[coinbase(subsidy, AssetId::STR)], &p, 1, None).unwrap();
        assert!(matches!(
            validate_transactions(&[coinbase(subsidy + 1, AssetId::STR)], &p, 1, None).unwrap_err(),
            TransactionError::ExcessCoinbase { .. }
        ));
    }

    #[test]
    fn mixed_asset_coinbase_rejected() {
        let p = params();
        let mut cb = coinbase(50 * COIN, AssetId::STR);
        cb.outputs.push(TxOut {
            value: 1_000,
            script_pubkey: vec![0x02; 32],
            asset: AssetId::DRM,
        });
        assert!(matches!(
            validate_transactions(&[cb], &p, 1, None).unwrap_err(),
            TransactionError::AssetMismatch(_)
        ));
    }

    #[test]
    fn pow_asset_rule_when_active() {
        let mut p = params();
        p.asset_rule_height = 0;
        // DRM is not mineable; with the rule active a DRM coinbase fails.
        assert_eq!(
            validate_transactions(&[coinbase(1_000, AssetId::DRM)], &p, 1, None).unwrap_err(),
            TransactionError::AssetNotMineable
        );
        // STR passes (value within subsidy).
        validate_transactions(&[coinbase(50 * COIN, AssetId::STR)], &p, 1, None).unwrap();
    }

    #[test]
    fn drm_coinbase_before_activation_is_allowed_within_zero_subsidy() {
        // Rule inactive: a DRM coinbase may only mint fees (subsidy is 0).
        let p = params();
        assert!(matches!(
            validate_transactions(&[coinbase(1_000, AssetId::DRM)], &p, 1, None).unwrap_err(),
            TransactionError::ExcessCoinbase { .. }
        ));
    }

    // ------------------------------------------------------------------
    // Transaction set: spends
    // ------------------------------------------------------------------

    /// One confirmed 50 STR UTXO owned by `kp` at `op(0x99, 1)`.
    fn single_utxo_set(kp: &Keypair, value: u64, asset: AssetId) -> HashMap<OutPoint, TxOut> {
        let mut map = HashMap::new();
        map.insert(op(0x99, 1), utxo(value, kp, asset));
        map
    }

    #[test]
    fn valid_spend_with_fee() {
        let p = params();
        let kp = keypair(2);
        let map = single_utxo_set(&kp, 50 * COIN, AssetId::STR);
        let lookup = lookup_in(&map);

        let spend = signed_spend(&kp, &[op(0x99, 1)], 50 * COIN - 1_000, AssetId::STR);
        let txs = vec![coinbase(p.subsidy(1, AssetId::STR) + 1_000, AssetId::STR), spend];
        let summary = validate_transactions(&txs, &p, 1, Some(&lookup)).unwrap();
        assert_eq!(summary.total_fees, 1_000);
    }

    #[test]
    fn coinbase_may_claim_subsidy_plus_fees_but_no_more() {
        let p = params();
        let kp = keypair(3);
        let map = single_utxo_set(&kp, 50 * COIN, AssetId::STR);
        let lookup = lookup_in(&map);
        let subsidy = p.subsidy(1, AssetId::STR);

        let spend = signed_spend(&kp, &[op(0x99, 1)], 50 * COIN - 1_000, AssetId::STR);
        let over = vec![coinbase(subsidy + 1_001, AssetId::STR), spend];
        assert!(matches!(
            validate_transactions(&over, &p, 1, Some(&lookup)).unwrap_err(),
            TransactionError::ExcessCoinbase { .. }
        ));
    }

    #[test]
    fn double_spend_within_block_rejected() {
        let p = params();
        let kp = keypair(4);
        let map = single_utxo_set(&kp, 10_000, AssetId::DRM);
        let lookup = lookup_in(&map);

        // Both spends reference (0x99.., 1); the second differs only in
        // lock time so the txids are distinct.
        let a = signed_spend(&kp, &[op(0x99, 1)], p.dust_floor(AssetId::DRM), AssetId::DRM);
        let mut b = a.clone();
        b.lock_time = 7;
        sign_input(&mut b, 0, &kp).unwrap();

        let txs = vec![coinbase(p.subsidy(1, AssetId::STR), AssetId::STR), a, b];
        assert!(matches!(
            validate_transactions(&txs, &p, 1, Some(&lookup)).unwrap_err(),
            TransactionError::DuplicateSpend(_)
        ));
    }

    #[test]
    fn conservation_violation_rejected() {
        let p = params();
        let kp = keypair(5);
        let map = single_utxo_set(&kp, 100 * COIN, AssetId::DRM);
        let lookup = lookup_in(&map);

        let spend = signed_spend(&kp, &[op(0x99, 1)], 101 * COIN, AssetId::DRM);
        let txs = vec![coinbase(p.subsidy(1, AssetId::STR), AssetId::STR), spend];
        assert!(matches!(
            validate_transactions(&txs, &p, 1, Some(&lookup)).unwrap_err(),
            TransactionError::Overspend { .. }
        ));
    }

    #[test]
    fn missing_utxo_rejected() {
        let p = params();
        let kp = keypair(6);
        let map = HashMap::new();
        let lookup = lookup_in(&map);

        let spend = signed_spend(&kp, &[op(0x99, 1)], 1_000, AssetId::STR);
        let txs = vec![coinbase(p.subsidy(1, AssetId::STR), AssetId::STR), spend];
        assert!(matches!(
            validate_transactions(&txs, &p, 1, Some(&lookup)).unwrap_err(),
            TransactionError::UnknownUtxo(_)
        ));
    }

    #[test]
    fn missing_lookup_rejected() {
        let p = params();
        let kp = keypair(7);
        let spend = signed_spend(&kp, &[op(0x99, 1)], 1_000, AssetId::STR);
        let txs = vec![coinbase(p.subsidy(1, AssetId::STR), AssetId::STR), spend];
        assert_eq!(
            validate_transactions(&txs, &p, 1, None).unwrap_err(),
            TransactionError::MissingLookup
        );
    }

    #[test]
    fn bad_signature_rejected() {
        let p = params();
        let kp = keypair(8);
        let other = keypair(9);
        let map = single_utxo_set(&other, 50 * COIN, AssetId::STR); // owned by `other`
        let lookup = lookup_in(&map);

        let spend = signed_spend(&kp, &[op(0x99, 1)], 1_000, AssetId::STR);
        let txs = vec![coinbase(p.subsidy(1, AssetId::STR), AssetId::STR), spend];
        assert!(matches!(
            validate_transactions(&txs, &p, 1, Some(&lookup)).unwrap_err(),
            TransactionError::InvalidSignature { index: 0 }
        ));
    }

    #[test]
    fn dust_output_rejected_even_when_signed() {
        let p = params();
        let kp = keypair(10);
        let map = single_utxo_set(&kp, 50 * COIN, AssetId::STR);
        let lookup = lookup_in(&map);

        let spend = signed_spend(&kp, &[op(0x99, 1)], p.dust_floor(AssetId::STR) - 1, AssetId::STR);
        let txs = vec![coinbase(p.subsidy(1, AssetId::STR), AssetId::STR), spend];
        assert!(matches!(
            validate_transactions(&txs, &p, 1, Some(&lookup)).unwrap_err(),
            TransactionError::DustOutput { .. }
        ));
    }

    #[test]
    fn asset_mismatch_between_input_and_utxo_rejected() {
        let p = params();
        let kp = keypair(11);
        let map = single_utxo_set(&kp, 50 * COIN, AssetId::DRM); // UTXO is DRM
        let lookup = lookup_in(&map);

        // Spend claims STR.
        let spend = signed_spend(&kp, &[op(0x99, 1)], 1_000, AssetId::STR);
        let txs = vec![coinbase(p.subsidy(1, AssetId::STR), AssetId::STR), spend];
        assert!(matches!(
            validate_transactions(&txs, &p, 1, Some(&lookup)).unwrap_err(),
            TransactionError::AssetMismatch(_)
        ));
    }

    #[test]
    fn zero_fee_tie_is_accepted() {
        let p = params();
        let kp = keypair(12);
        let map = single_utxo_set(&kp, 50 * COIN, AssetId::STR);
        let lookup = lookup_in(&map);

        let spend = signed_spend(&kp, &[op(0x99, 1)], 50 * COIN, AssetId::STR);
        let txs = vec![coinbase(p.subsidy(1, AssetId::STR), AssetId::STR), spend];
        let summary = validate_transactions(&txs, &p, 1, Some(&lookup)).unwrap();
        assert_eq!(summary.total_fees, 0);
    }

    #[test]
    fn oversized_transaction_rejected() {
        let p = params();
        let kp = keypair(13);
        let map = single_utxo_set(&kp, p.max_money_out, AssetId::STR);
        let lookup = lookup_in(&map);

        // ~48 bytes per output: 25_000 outputs exceed the 1 MB cap.
        let mut spend = signed_spend(&kp, &[op(0x99, 1)], 1_000, AssetId::STR);
        spend.outputs = (0..25_000)
            .map(|_| TxOut {
                value: 1_000,
                script_pubkey: vec![0x02; 32],
                asset: AssetId::STR,
            })
            .collect();
        let txs = vec![coinbase(p.subsidy(1, AssetId::STR), AssetId::STR), spend];
        assert!(matches!(
            validate_transactions(&txs, &p, 1, Some(&lookup)).unwrap_err(),
            TransactionError::OversizedTransaction { .. }
        ));
    }

    // ------------------------------------------------------------------
    // Standalone transaction validation (mempool path)
    // ------------------------------------------------------------------

    #[test]
    fn standalone_valid_spend_returns_fee() {
        let p = params();
        let kp = keypair(14);
        let map = single_utxo_set(&kp, 50 * COIN, AssetId::STR);
        let lookup = lookup_in(&map);

        let spend = signed_spend(&kp, &[op(0x99, 1)], 50 * COIN - 2_500, AssetId::STR);
        let v = validate_transaction(&spend, &p, &lookup).unwrap();
        assert_eq!(v.fee, 2_500);
        assert_eq!(v.total_input, 50 * COIN);
        assert_eq!(v.total_output, 50 * COIN - 2_500);
    }

    #[test]
    fn standalone_rejects_coinbase() {
        let p = params();
        let map = HashMap::new();
        let lookup = lookup_in(&map);
        assert!(matches!(
            validate_transaction(&coinbase(1, AssetId::STR), &p, &lookup).unwrap_err(),
            TransactionError::InvalidCoinbase(_)
        ));
    }

    #[test]
    fn standalone_rejects_duplicate_inputs() {
        let p = params();
        let kp = keypair(15);
        let map = single_utxo_set(&kp, 50 * COIN, AssetId::STR);
        let lookup = lookup_in(&map);

        let spend = signed_spend(&kp, &[op(0x99, 1), op(0x99, 1)], 1_000, AssetId::STR);
        assert!(matches!(
            validate_transaction(&spend, &p, &lookup).unwrap_err(),
            TransactionError::DuplicateSpend(_)
        ));
    }

    #[test]
    fn standalone_rejects_unknown_utxo() {
        let p = params();
        let kp = keypair(16);
        let map = HashMap::new();
        let lookup = lookup_in(&map);
        let spend = signed_spend(&kp, &[op(0x99, 1)], 1_000, AssetId::STR);
        assert!(matches!(
            validate_transaction(&spend, &p, &lookup).unwrap_err(),
            TransactionError::UnknownUtxo(_)
        ));
    }

    // ------------------------------------------------------------------
    // Block-level wrapper
    // ------------------------------------------------------------------

    fn block_with(p: &Params, txs: Vec<Transaction>, time: u32) -> Block {
        let header = mine(
            BlockHeader {
                version: 1,
                prev_hash: Hash256::ZERO,
                merkle_root: merkle::block_merkle_root(&txs),
                time,
                bits: p.genesis_bits,
                nonce: 0,
            },
            p,
        );
        Block {
            header,
            transactions: txs,
        }
    }

    #[test]
    fn block_accepts_coinbase_only() {
        let p = params();
        let block = block_with(&p, vec![coinbase(50 * COIN, AssetId::STR)], 1_000);
        validate_block(&block, &p, 1, None, &ValidationOptions::new(999, 1_000)).unwrap();
    }

    #[test]
    fn block_rejects_merkle_mismatch() {
        let p = params();
        let mut block = block_with(&p, vec![coinbase(50 * COIN, AssetId::STR)], 1_000);
        block.header.merkle_root = Hash256([0xEE; 32]);
        block.header = mine(block.header, &p);
        assert_eq!(
            validate_block(&block, &p, 1, None, &ValidationOptions::new(999, 1_000)).unwrap_err(),
            BlockError::MerkleMismatch
        );
    }

    #[test]
    fn block_state_root_requirements() {
        let p = params();
        let block = block_with(&p, vec![coinbase(50 * COIN, AssetId::STR)], 1_000);

        let mut opts = ValidationOptions::new(999, 1_000);
        opts.require_state_root = true;
        assert_eq!(
            validate_block(&block, &p, 1, None, &opts).unwrap_err(),
            BlockError::Header(HeaderError::MissingStateRoot)
        );

        opts.state_root = Hash256([0x07; 32]);
        validate_block(&block, &p, 1, None, &opts).unwrap();

        opts.expected_state_root = Hash256([0x08; 32]);
        assert_eq!(
            validate_block(&block, &p, 1, None, &opts).unwrap_err(),
            BlockError::Header(HeaderError::StateRootMismatch)
        );

        opts.expected_state_root = Hash256([0x07; 32]);
        validate_block(&block, &p, 1, None, &opts).unwrap();
    }
}
