//! RocksDB chain state backend.
//!
//! Key layout: `outpoint.txid || outpoint.index (LE)`, 36 bytes. Value
//! layout: `value (LE u64) || scriptPubKey`. All mutations go through an
//! atomic [`WriteBatch`]; durable writes use RocksDB's synchronous mode.

use std::path::Path;

use rocksdb::{DB, IteratorMode, Options, WriteBatch, WriteOptions};

use stater_core::chainstate::{BatchOp, CoinsBackend};
use stater_core::error::StoreError;
use stater_core::types::{AssetId, OutPoint, TxOut};

const KEY_LEN: usize = 36;
const VALUE_PREFIX_LEN: usize = 8;

/// RocksDB-backed [`CoinsBackend`].
pub struct RocksCoinsBackend {
    db: DB,
}

impl RocksCoinsBackend {
    /// Open or create a database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path.as_ref()).map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self { db })
    }

    fn encode_key(outpoint: &OutPoint) -> [u8; KEY_LEN] {
        let mut key = [0u8; KEY_LEN];
        key[..32].copy_from_slice(outpoint.txid.as_bytes());
        key[32..].copy_from_slice(&outpoint.index.to_le_bytes());
        key
    }

    fn encode_value(output: &TxOut) -> Vec<u8> {
        let mut value = Vec::with_capacity(VALUE_PREFIX_LEN + output.script_pubkey.len());
        value.extend_from_slice(&output.value.to_le_bytes());
        value.extend_from_slice(&output.script_pubkey);
        value
    }

    fn decode_entry(key: &[u8], value: &[u8]) -> Result<(OutPoint, TxOut), StoreError> {
        if key.len() != KEY_LEN {
            return Err(StoreError::Corrupt(format!(
                "utxo key is {} bytes, expected {KEY_LEN}",
                key.len()
            )));
        }
        if value.len() < VALUE_PREFIX_LEN {
            return Err(StoreError::Corrupt(format!(
                "utxo value is {} bytes, expected at least {VALUE_PREFIX_LEN}",
                value.len()
            )));
        }
        let txid: [u8; 32] = key[..32].try_into().expect("32-byte prefix");
        let index = u32::from_le_bytes(key[32..].try_into().expect("4-byte suffix"));
        let amount = u64::from_le_bytes(value[..8].try_into().expect("8-byte prefix"));
        Ok((
            OutPoint {
                txid: txid.into(),
                index,
            },
            TxOut {
                value: amount,
                script_pubkey: value[8..].to_vec(),
                asset: AssetId::STR,
            },
        ))
    }
}

impl CoinsBackend for RocksCoinsBackend {
    fn read_all(&mut self) -> Result<Vec<(OutPoint, TxOut)>, StoreError> {
        let mut entries = Vec::new();
        for item in self.db.iterator(IteratorMode::Start) {
            let (key, value) = item.map_err(|e| StoreError::Backend(e.to_string()))?;
            entries.push(Self::decode_entry(&key, &value)?);
        }
        Ok(entries)
    }

    fn write_batch(&mut self, batch: &[BatchOp], sync: bool) -> Result<(), StoreError> {
        let mut write = WriteBatch::default();
        for op in batch {
            match op {
                BatchOp::Put { outpoint, output } => {
                    write.put(Self::encode_key(outpoint), Self::encode_value(output));
                }
                BatchOp::Delete { outpoint } => {
                    write.delete(Self::encode_key(outpoint));
                }
            }
        }
        let mut opts = WriteOptions::default();
        opts.set_sync(sync);
        self.db
            .write_opt(write, &opts)
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        self.db
            .flush()
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}
