//! Persistent UTXO set with a bounded cache and transactional staging.
//!
//! [`Chainstate`] is the authoritative record of spendable outputs. It
//! owns an in-memory map mirrored to a pluggable [`CoinsBackend`], plus a
//! bounded lookaside cache for validation-time reads. Block connection
//! stages mutations through `begin`/`commit`/`rollback`: staged changes
//! are applied to memory immediately, recorded in a change log with their
//! pre-images, and only reach the backend as one atomic batch on commit.
//!
//! All public calls serialize on an internal mutex; at most one caller
//! may drive a staging transaction at a time.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::constants::DEFAULT_CACHE_ENTRIES;
use crate::error::StoreError;
use crate::types::{AssetId, OutPoint, TxOut};

/// One mutation in a backend write batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchOp {
    Put { outpoint: OutPoint, output: TxOut },
    Delete { outpoint: OutPoint },
}

/// Capability set a persistence backend must provide.
///
/// Two concrete backends exist: the flat-file snapshot backend below and
/// the RocksDB backend in `stater-node`.
pub trait CoinsBackend: Send {
    /// Load every persisted entry. Called once when the chain state opens;
    /// corrupt data must surface as [`StoreError::Corrupt`], never as a
    /// silently truncated set.
    fn read_all(&mut self) -> Result<Vec<(OutPoint, TxOut)>, StoreError>;

    /// Apply a batch of mutations atomically. When `sync` is set, the call
    /// must not return before the backing store acknowledges durability.
    fn write_batch(&mut self, batch: &[BatchOp], sync: bool) -> Result<(), StoreError>;

    /// Force buffered state to durable storage.
    fn flush(&mut self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Release resources. Called on drop paths that can still fail.
    fn close(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Volatile backend for tests: persists into its own map only.
#[derive(Default)]
pub struct MemoryBackend {
    entries: HashMap<OutPoint, TxOut>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CoinsBackend for MemoryBackend {
    fn read_all(&mut self) -> Result<Vec<(OutPoint, TxOut)>, StoreError> {
        Ok(self.entries.iter().map(|(k, v)| (*k, v.clone())).collect())
    }

    fn write_batch(&mut self, batch: &[BatchOp], _sync: bool) -> Result<(), StoreError> {
        for op in batch {
            match op {
                BatchOp::Put { outpoint, output } => {
                    self.entries.insert(*outpoint, output.clone());
                }
                BatchOp::Delete { outpoint } => {
                    self.entries.remove(outpoint);
                }
            }
        }
        Ok(())
    }
}

/// Flat-file snapshot backend.
///
/// On-disk layout: `[count: u32]` then per entry `[hash: 32][index: u32]`
/// `[value: u64][scriptSize: u32][scriptPubKey]`, all little-endian.
/// Every batch rewrites the snapshot through a temp file and rename, so a
/// crash leaves either the old or the new set, never a torn one.
#[derive(Debug)]
pub struct FlatFileBackend {
    path: PathBuf,
    entries: HashMap<OutPoint, TxOut>,
}

impl FlatFileBackend {
    /// Open the snapshot at `path`, loading it if present.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read(&path) {
            Ok(bytes) => Self::parse(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(StoreError::Io(e.to_string())),
        };
        Ok(Self { path, entries })
    }

    fn take<'a>(bytes: &'a [u8], offset: &mut usize, len: usize) -> Result<&'a [u8], StoreError> {
        let end = offset
            .checked_add(len)
            .filter(|&end| end <= bytes.len())
            .ok_or_else(|| StoreError::Corrupt(format!("truncated at byte {offset}")))?;
        let slice = &bytes[*offset..end];
        *offset = end;
        Ok(slice)
    }

    fn parse(bytes: &[u8]) -> Result<HashMap<OutPoint, TxOut>, StoreError> {
        let mut entries = HashMap::new();
        let mut offset = 0usize;

        let count =
            u32::from_le_bytes(Self::take(bytes, &mut offset, 4)?.try_into().expect("4 bytes"));
        for _ in 0..count {
            let hash: [u8; 32] = Self::take(bytes, &mut offset, 32)?
                .try_into()
                .expect("32 bytes");
            let index =
                u32::from_le_bytes(Self::take(bytes, &mut offset, 4)?.try_into().expect("4 bytes"));
            let value =
                u64::from_le_bytes(Self::take(bytes, &mut offset, 8)?.try_into().expect("8 bytes"));
            let script_size =
                u32::from_le_bytes(Self::take(bytes, &mut offset, 4)?.try_into().expect("4 bytes"))
                    as usize;
            let script_pubkey = Self::take(bytes, &mut offset, script_size)?.to_vec();
            entries.insert(
                OutPoint {
                    txid: hash.into(),
                    index,
                },
                TxOut {
                    value,
                    script_pubkey,
                    asset: AssetId::STR,
                },
            );
        }
        if offset != bytes.len() {
            return Err(StoreError::Corrupt(format!(
                "{} trailing bytes",
                bytes.len() - offset
            )));
        }
        Ok(entries)
    }

    fn persist(&self, sync: bool) -> Result<(), StoreError> {
        let mut out = Vec::with_capacity(4 + self.entries.len() * 80);
        out.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
        for (outpoint, txout) in &self.entries {
            out.extend_from_slice(outpoint.txid.as_bytes());
            out.extend_from_slice(&outpoint.index.to_le_bytes());
            out.extend_from_slice(&txout.value.to_le_bytes());
            out.extend_from_slice(&(txout.script_pubkey.len() as u32).to_le_bytes());
            out.extend_from_slice(&txout.script_pubkey);
        }

        let tmp = self.path.with_extension("tmp");
        let io = |e: std::io::Error| StoreError::Io(e.to_string());
        let mut file = fs::File::create(&tmp).map_err(io)?;
        file.write_all(&out).map_err(io)?;
        if sync {
            file.sync_all().map_err(io)?;
        }
        drop(file);
        fs::rename(&tmp, &self.path).map_err(io)?;
        Ok(())
    }
}

impl CoinsBackend for FlatFileBackend {
    fn read_all(&mut self) -> Result<Vec<(OutPoint, TxOut)>, StoreError> {
        Ok(self.entries.iter().map(|(k, v)| (*k, v.clone())).collect())
    }

    fn write_batch(&mut self, batch: &[BatchOp], sync: bool) -> Result<(), StoreError> {
        for op in batch {
            match op {
                BatchOp::Put { outpoint, output } => {
                    self.entries.insert(*outpoint, output.clone());
                }
                BatchOp::Delete { outpoint } => {
                    self.entries.remove(outpoint);
                }
            }
        }
        self.persist(sync)
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        self.persist(true)
    }
}

/// Pre- and post-image of one staged mutation, for rollback.
#[derive(Clone, Debug)]
struct ChangeLogEntry {
    outpoint: OutPoint,
    old: Option<TxOut>,
    new: Option<TxOut>,
}

struct Inner {
    backend: Box<dyn CoinsBackend>,
    /// Authoritative set, mirrored to the backend.
    utxos: HashMap<OutPoint, TxOut>,
    /// Bounded lookaside cache over `utxos`.
    cache: HashMap<OutPoint, TxOut>,
    max_cache_entries: usize,
    sync_writes: bool,
    in_transaction: bool,
    pending: Vec<ChangeLogEntry>,
    /// Outpoints touched by the in-flight transaction. Never evicted
    /// before commit or rollback.
    hot: HashSet<OutPoint>,
}

impl Inner {
    fn maybe_evict(&mut self) {
        if self.cache.len() <= self.max_cache_entries {
            return;
        }
        // Deterministic victim selection: sorted key order, skipping
        // entries the in-flight transaction touched.
        let target = self.max_cache_entries / 2;
        let mut victims: Vec<OutPoint> = self
            .cache
            .keys()
            .filter(|op| !self.hot.contains(*op))
            .copied()
            .collect();
        victims.sort_unstable();
        for victim in victims {
            if self.cache.len() <= target {
                break;
            }
            self.cache.remove(&victim);
        }
    }

    fn rollback_pending(&mut self) {
        for entry in self.pending.drain(..).rev() {
            match entry.old {
                Some(old) => {
                    self.utxos.insert(entry.outpoint, old.clone());
                    self.cache.insert(entry.outpoint, old);
                }
                None => {
                    self.utxos.remove(&entry.outpoint);
                    self.cache.remove(&entry.outpoint);
                }
            }
        }
        self.in_transaction = false;
        self.hot.clear();
    }
}

/// Persistent set of unspent outputs with begin/commit/rollback staging.
pub struct Chainstate {
    inner: Mutex<Inner>,
}

impl Chainstate {
    /// Open the chain state over a backend, loading the persisted set.
    pub fn open(
        backend: Box<dyn CoinsBackend>,
        max_cache_entries: usize,
        sync_writes: bool,
    ) -> Result<Self, StoreError> {
        let mut backend = backend;
        let utxos: HashMap<OutPoint, TxOut> = backend.read_all()?.into_iter().collect();
        Ok(Self {
            inner: Mutex::new(Inner {
                backend,
                utxos,
                cache: HashMap::new(),
                max_cache_entries: max_cache_entries.max(1),
                sync_writes,
                in_transaction: false,
                pending: Vec::new(),
                hot: HashSet::new(),
            }),
        })
    }

    /// Ephemeral chain state for tests and tooling.
    pub fn in_memory() -> Self {
        Self::open(Box::new(MemoryBackend::new()), DEFAULT_CACHE_ENTRIES, false)
            .expect("memory backend cannot fail to open")
    }

    /// Whether the outpoint is currently unspent.
    pub fn have(&self, outpoint: &OutPoint) -> bool {
        let inner = self.inner.lock();
        inner.cache.contains_key(outpoint) || inner.utxos.contains_key(outpoint)
    }

    /// Look up an unspent output, promoting it into the cache.
    pub fn get(&self, outpoint: &OutPoint) -> Option<TxOut> {
        let mut inner = self.inner.lock();
        if let Some(hit) = inner.cache.get(outpoint) {
            return Some(hit.clone());
        }
        let found = inner.utxos.get(outpoint)?.clone();
        inner.cache.insert(*outpoint, found.clone());
        inner.maybe_evict();
        Some(found)
    }

    /// Create an unspent output.
    ///
    /// Inside a staging transaction the change is memory-only until
    /// commit; outside, it is persisted immediately.
    pub fn add(&self, outpoint: OutPoint, output: TxOut) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if inner.in_transaction {
            let old = inner.utxos.get(&outpoint).cloned();
            inner.pending.push(ChangeLogEntry {
                outpoint,
                old,
                new: Some(output.clone()),
            });
            inner.hot.insert(outpoint);
        } else {
            let sync = inner.sync_writes;
            inner.backend.write_batch(
                &[BatchOp::Put {
                    outpoint,
                    output: output.clone(),
                }],
                sync,
            )?;
        }
        inner.utxos.insert(outpoint, output.clone());
        inner.cache.insert(outpoint, output);
        inner.maybe_evict();
        Ok(())
    }

    /// Remove an unspent output. Fails if it is absent.
    pub fn spend(&self, outpoint: &OutPoint) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let Some(old) = inner.utxos.get(outpoint).cloned() else {
            return Err(StoreError::MissingUtxo(outpoint.to_string()));
        };
        if inner.in_transaction {
            inner.pending.push(ChangeLogEntry {
                outpoint: *outpoint,
                old: Some(old),
                new: None,
            });
            inner.hot.insert(*outpoint);
        } else {
            let sync = inner.sync_writes;
            inner
                .backend
                .write_batch(&[BatchOp::Delete { outpoint: *outpoint }], sync)?;
        }
        inner.utxos.remove(outpoint);
        inner.cache.remove(outpoint);
        Ok(())
    }

    /// Start a staging transaction, clearing any stale change log.
    pub fn begin(&self) {
        let mut inner = self.inner.lock();
        inner.pending.clear();
        inner.hot.clear();
        inner.in_transaction = true;
    }

    /// Flush the change log to the backend as one atomic batch.
    ///
    /// A backend failure rolls the staged changes back before the error
    /// is reported, so memory never diverges from durable state.
    pub fn commit(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if !inner.in_transaction {
            return Ok(());
        }

        let batch: Vec<BatchOp> = inner
            .pending
            .iter()
            .map(|entry| match &entry.new {
                Some(output) => BatchOp::Put {
                    outpoint: entry.outpoint,
                    output: output.clone(),
                },
                None => BatchOp::Delete {
                    outpoint: entry.outpoint,
                },
            })
            .collect();

        if !batch.is_empty() {
            let sync = inner.sync_writes;
            if let Err(e) = inner.backend.write_batch(&batch, sync) {
                inner.rollback_pending();
                return Err(e);
            }
        }

        inner.pending.clear();
        inner.hot.clear();
        inner.in_transaction = false;
        Ok(())
    }

    /// Undo the staged changes in reverse order without touching the
    /// backend.
    pub fn rollback(&self) {
        let mut inner = self.inner.lock();
        if !inner.in_transaction {
            return;
        }
        inner.rollback_pending();
    }

    /// Force durability of the full set.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.inner.lock().backend.flush()
    }

    /// Number of entries currently resident in the lookaside cache.
    pub fn cached_entries(&self) -> usize {
        self.inner.lock().cache.len()
    }

    /// Number of unspent outputs.
    pub fn utxo_count(&self) -> usize {
        self.inner.lock().utxos.len()
    }

    /// Whether a staging transaction is active.
    pub fn in_transaction(&self) -> bool {
        self.inner.lock().in_transaction
    }
}
