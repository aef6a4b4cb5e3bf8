//! Fee-rate-ordered admission buffer for unconfirmed transactions.
//!
//! The mempool feeds the miner and relays: entries are indexed by txid,
//! by spent outpoint (conflict detection), and by fee rate (eviction and
//! template selection). Admission optionally revalidates against an
//! attached consensus context. Replacement follows opt-in sequence
//! signalling: every conflicting entry must be replaceable and strictly
//! outbid.
//!
//! A single mutex serializes all public operations; the `on_accept`
//! callback runs outside the lock so subscribers may reenter.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::constants::SEQUENCE_RBF_THRESHOLD;
use crate::error::MempoolError;
use crate::params::Params;
use crate::policy::FeePolicy;
use crate::types::{Hash256, OutPoint, Transaction, TxOut};
use crate::validation;

/// Consensus context for admission-time validation.
pub struct ValidationContext {
    pub params: Params,
    /// Height the next block would be mined at.
    pub height: u32,
    /// UTXO lookup into the active chain state.
    pub lookup: Box<dyn Fn(&OutPoint) -> Option<TxOut> + Send + Sync>,
}

/// Subscriber invoked with a copy of every accepted transaction.
pub type AcceptCallback = Arc<dyn Fn(Transaction) + Send + Sync>;

/// A pooled transaction with precomputed admission metadata.
#[derive(Clone, Debug)]
pub struct MempoolEntry {
    pub tx: Transaction,
    pub txid: Hash256,
    /// Fee in lepta.
    pub fee: u64,
    /// Canonical serialized size in bytes.
    pub size: usize,
    /// Whether any input signalled opt-in replaceability.
    pub replaceable: bool,
    fee_rate: u64,
    arrival: Instant,
    /// Monotonic admission counter; tie-breaks equal fee rates.
    seq: u64,
}

impl MempoolEntry {
    /// Fee rate in lepta per kilobyte.
    pub fn fee_rate(&self) -> u64 {
        self.fee_rate
    }
}

/// Fee rate in lepta per kB, computed in u128 to avoid overflow.
fn compute_fee_rate(fee: u64, size: usize) -> u64 {
    let rate = u128::from(fee) * 1_000 / (size.max(1) as u128);
    rate.min(u128::from(u64::MAX)) as u64
}

struct Inner {
    entries: HashMap<Hash256, MempoolEntry>,
    /// Ascending (fee_rate, seq, txid): first element is the eviction
    /// victim (lowest fee rate, oldest arrival).
    by_fee_rate: BTreeSet<(u64, u64, Hash256)>,
    /// Outpoint → txid of the pool transaction spending it.
    spent: HashMap<OutPoint, Hash256>,
    arrival: VecDeque<Hash256>,
    total_bytes: usize,
    next_seq: u64,
    policy: FeePolicy,
    context: Option<ValidationContext>,
    on_accept: Option<AcceptCallback>,
}

impl Inner {
    fn remove_entry(&mut self, txid: &Hash256) -> Option<MempoolEntry> {
        let entry = self.entries.remove(txid)?;
        self.by_fee_rate.remove(&(entry.fee_rate, entry.seq, entry.txid));
        for input in &entry.tx.inputs {
            if self.spent.get(&input.prevout) == Some(txid) {
                self.spent.remove(&input.prevout);
            }
        }
        self.arrival.retain(|h| h != txid);
        self.total_bytes -= entry.size;
        Some(entry)
    }

    fn evict_lowest(&mut self) -> Option<Hash256> {
        let &(_, _, victim) = self.by_fee_rate.iter().next()?;
        self.remove_entry(&victim);
        Some(victim)
    }

    fn evict_expired(&mut self) {
        let now = Instant::now();
        let expired: Vec<Hash256> = self
            .entries
            .values()
            .filter(|e| now.duration_since(e.arrival) > self.policy.max_age)
            .map(|e| e.txid)
            .collect();
        for txid in expired {
            self.remove_entry(&txid);
        }
    }

    fn enforce_byte_budget(&mut self) {
        while self.total_bytes > self.policy.target_bytes {
            if self.evict_lowest().is_none() {
                break;
            }
        }
    }
}

/// Bounded, fee-rate-ordered pool of unconfirmed transactions.
pub struct Mempool {
    inner: Mutex<Inner>,
}

impl Mempool {
    pub fn new(policy: FeePolicy) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                by_fee_rate: BTreeSet::new(),
                spent: HashMap::new(),
                arrival: VecDeque::new(),
                total_bytes: 0,
                next_seq: 0,
                policy,
                context: None,
                on_accept: None,
            }),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(FeePolicy::default())
    }

    /// Attach a consensus context; later admissions revalidate against it.
    pub fn set_validation_context(&self, context: ValidationContext) {
        self.inner.lock().context = Some(context);
    }

    /// Register the accepted-transaction subscriber.
    pub fn set_on_accept(&self, callback: AcceptCallback) {
        self.inner.lock().on_accept = Some(callback);
    }

    /// Admit a transaction paying `fee`.
    ///
    /// Runs the fee policy, optional consensus validation, conflict and
    /// replacement handling, expiry, and eviction. Returns the txid on
    /// success.
    pub fn accept(&self, tx: Transaction, fee: u64) -> Result<Hash256, MempoolError> {
        let (txid, callback, tx_copy) = {
            let mut inner = self.inner.lock();

            let size = tx.size();
            let txid = tx.txid();
            if inner.entries.contains_key(&txid) {
                return Err(MempoolError::AlreadyExists(txid.to_string()));
            }

            inner.policy.check(size, fee)?;

            if let Some(context) = &inner.context {
                let lookup = |op: &OutPoint| (context.lookup)(op);
                validation::validate_transaction(&tx, &context.params, &lookup)?;
            }

            let fee_rate = compute_fee_rate(fee, size);
            let replaceable = tx
                .inputs
                .iter()
                .any(|input| input.sequence < SEQUENCE_RBF_THRESHOLD);

            // Conflict detection and replacement.
            let conflicts: Vec<Hash256> = {
                let mut seen = HashSet::new();
                tx.inputs
                    .iter()
                    .filter_map(|input| inner.spent.get(&input.prevout).copied())
                    .filter(|h| seen.insert(*h))
                    .collect()
            };
            for conflict in &conflicts {
                let existing = &inner.entries[conflict];
                if !existing.replaceable {
                    return Err(MempoolError::NotReplaceable(conflict.to_string()));
                }
                if fee_rate <= existing.fee_rate {
                    return Err(MempoolError::ReplacementUnderpriced {
                        new: fee_rate,
                        existing: existing.fee_rate,
                    });
                }
            }
            for conflict in &conflicts {
                inner.remove_entry(conflict);
            }

            inner.evict_expired();
            while inner.entries.len() >= inner.policy.max_entries {
                if inner.evict_lowest().is_none() {
                    break;
                }
            }

            let seq = inner.next_seq;
            inner.next_seq += 1;
            for input in &tx.inputs {
                inner.spent.insert(input.prevout, txid);
            }
            inner.by_fee_rate.insert((fee_rate, seq, txid));
            inner.arrival.push_back(txid);
            inner.total_bytes += size;
            inner.entries.insert(
                txid,
                MempoolEntry {
                    tx: tx.clone(),
                    txid,
                    fee,
                    size,
                    replaceable,
                    fee_rate,
                    arrival: Instant::now(),
                    seq,
                },
            );

            inner.enforce_byte_budget();

            (txid, inner.on_accept.clone(), tx)
        };

        // Subscribers run without the pool lock held.
        if let Some(callback) = callback {
            callback(tx_copy);
        }
        Ok(txid)
    }

    /// Whether a transaction is currently pooled.
    pub fn exists(&self, txid: &Hash256) -> bool {
        self.inner.lock().entries.contains_key(txid)
    }

    /// Whether any pool transaction spends the outpoint.
    pub fn spends(&self, outpoint: &OutPoint) -> bool {
        self.inner.lock().spent.contains_key(outpoint)
    }

    /// Copy of all pooled transactions, sorted by txid.
    ///
    /// The ordering is stable and independent of insertion order, so
    /// block templates built from a snapshot are deterministic.
    pub fn snapshot(&self) -> Vec<Transaction> {
        let inner = self.inner.lock();
        let mut txs: Vec<(Hash256, Transaction)> = inner
            .entries
            .values()
            .map(|e| (e.txid, e.tx.clone()))
            .collect();
        txs.sort_by(|a, b| a.0.cmp(&b.0));
        txs.into_iter().map(|(_, tx)| tx).collect()
    }

    /// Drop every transaction included in a connected block, plus any
    /// pool entry that spends an outpoint the block consumed.
    pub fn remove_for_block(&self, txs: &[Transaction]) {
        let mut inner = self.inner.lock();

        for tx in txs {
            inner.remove_entry(&tx.txid());
        }

        // Anything still spending a now-consumed outpoint is conflicted.
        let consumed: Vec<Hash256> = txs
            .iter()
            .flat_map(|tx| tx.inputs.iter())
            .filter(|input| !input.prevout.is_null())
            .filter_map(|input| inner.spent.get(&input.prevout).copied())
            .collect();
        for txid in consumed {
            inner.remove_entry(&txid);
        }
    }

    /// Fee rate at the given percentile of the pool's distribution, in
    /// lepta per kB. Falls back to the policy minimum when empty.
    pub fn estimate_fee_rate(&self, percentile: usize) -> u64 {
        let inner = self.inner.lock();
        if inner.entries.is_empty() {
            return inner.policy.min_fee_rate;
        }
        let mut rates: Vec<u64> = inner.entries.values().map(|e| e.fee_rate).collect();
        rates.sort_unstable();
        let idx = rates.len() * percentile.min(99) / 100;
        rates[idx]
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Approximate serialized bytes currently pooled.
    pub fn total_bytes(&self) -> usize {
        self.inner.lock().total_bytes
    }
}
