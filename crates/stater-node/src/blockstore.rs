//! Append-only block storage with a height index sidecar.
//!
//! Record layout: `[size: u32][checksum: 32][payload]` where the payload
//! is the 80-byte header, a `u32` transaction count, then each
//! transaction as `[txSize: u32][txBytes]`. The checksum is SHA-256 over
//! the payload; a mismatch on read is corruption, never silently
//! repaired. The sidecar `<path>.idx` stores `[count: u32]` followed by
//! `[height: u32][offset: u64]` records and is rewritten every
//! [`FLUSH_THRESHOLD`] appends.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use stater_core::error::StoreError;
use stater_core::types::Block;
use stater_core::wire;

/// Appends between automatic index flushes.
const FLUSH_THRESHOLD: usize = 100;

/// Upper bound on a stored block record.
const MAX_RECORD_SIZE: u32 = 100 * 1024 * 1024;

/// Upper bound on transactions per stored block.
const MAX_TX_COUNT: u32 = 100_000;

/// Upper bound on one stored transaction.
const MAX_TX_SIZE: u32 = 10 * 1024 * 1024;

/// Upper bound on index entries loaded from the sidecar.
const MAX_INDEX_ENTRIES: u32 = 10_000_000;

/// Append-only block file plus height→offset index.
#[derive(Debug)]
pub struct BlockStore {
    path: PathBuf,
    index: HashMap<u32, u64>,
    dirty: usize,
}

impl BlockStore {
    /// Open the store at `path`, loading the index sidecar if present.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let index = Self::load_index(&path)?;
        Ok(Self {
            path,
            index,
            dirty: 0,
        })
    }

    fn index_path(path: &Path) -> PathBuf {
        let mut p = path.as_os_str().to_owned();
        p.push(".idx");
        PathBuf::from(p)
    }

    fn load_index(path: &Path) -> Result<HashMap<u32, u64>, StoreError> {
        let bytes = match fs::read(Self::index_path(path)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(StoreError::Io(e.to_string())),
        };

        let corrupt = |what: &str| StoreError::Corrupt(format!("block index: {what}"));
        if bytes.len() < 4 {
            return Err(corrupt("missing count"));
        }
        let count = u32::from_le_bytes(bytes[..4].try_into().expect("4 bytes"));
        if count > MAX_INDEX_ENTRIES {
            return Err(corrupt("count exceeds maximum"));
        }
        let expected = 4 + count as usize * 12;
        if bytes.len() != expected {
            return Err(corrupt("length does not match count"));
        }

        let mut index = HashMap::with_capacity(count as usize);
        for record in bytes[4..].chunks_exact(12) {
            let height = u32::from_le_bytes(record[..4].try_into().expect("4 bytes"));
            let offset = u64::from_le_bytes(record[4..].try_into().expect("8 bytes"));
            index.insert(height, offset);
        }
        Ok(index)
    }

    fn flush_index(&self) -> Result<(), StoreError> {
        let io = |e: std::io::Error| StoreError::Io(e.to_string());
        let mut out = Vec::with_capacity(4 + self.index.len() * 12);
        out.extend_from_slice(&(self.index.len() as u32).to_le_bytes());
        for (height, offset) in &self.index {
            out.extend_from_slice(&height.to_le_bytes());
            out.extend_from_slice(&offset.to_le_bytes());
        }
        fs::write(Self::index_path(&self.path), out).map_err(io)
    }

    /// Append a block at `height`.
    pub fn write_block(&mut self, height: u32, block: &Block) -> Result<(), StoreError> {
        let io = |e: std::io::Error| StoreError::Io(e.to_string());

        let mut payload = Vec::with_capacity(128);
        payload.extend_from_slice(&wire::serialize_header(&block.header));
        payload.extend_from_slice(&(block.transactions.len() as u32).to_le_bytes());
        for tx in &block.transactions {
            let bytes = wire::serialize_tx(tx);
            payload.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            payload.extend_from_slice(&bytes);
        }

        let checksum: [u8; 32] = Sha256::digest(&payload).into();

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(io)?;
        let offset = file.metadata().map_err(io)?.len();

        file.write_all(&(payload.len() as u32).to_le_bytes()).map_err(io)?;
        file.write_all(&checksum).map_err(io)?;
        file.write_all(&payload).map_err(io)?;

        self.index.insert(height, offset);
        self.dirty += 1;
        if self.dirty >= FLUSH_THRESHOLD {
            self.flush_index()?;
            self.dirty = 0;
        }
        Ok(())
    }

    /// Read the block stored at `height`, verifying its checksum.
    pub fn read_block(&self, height: u32) -> Result<Block, StoreError> {
        let io = |e: std::io::Error| StoreError::Io(e.to_string());
        let corrupt = |what: String| StoreError::Corrupt(what);

        let offset = *self
            .index
            .get(&height)
            .ok_or_else(|| StoreError::UnknownKey(format!("no block at height {height}")))?;

        let mut file = File::open(&self.path).map_err(io)?;
        file.seek(SeekFrom::Start(offset)).map_err(io)?;

        let mut size_bytes = [0u8; 4];
        file.read_exact(&mut size_bytes).map_err(io)?;
        let size = u32::from_le_bytes(size_bytes);
        if size == 0 || size > MAX_RECORD_SIZE {
            return Err(corrupt(format!("record size {size} out of range")));
        }

        let mut stored_checksum = [0u8; 32];
        file.read_exact(&mut stored_checksum).map_err(io)?;

        let mut payload = vec![0u8; size as usize];
        file.read_exact(&mut payload).map_err(io)?;

        let computed: [u8; 32] = Sha256::digest(&payload).into();
        if computed != stored_checksum {
            return Err(corrupt("checksum mismatch".to_string()));
        }

        Self::parse_payload(&payload)
    }

    fn parse_payload(payload: &[u8]) -> Result<Block, StoreError> {
        let corrupt = |what: &str| StoreError::Corrupt(format!("block record: {what}"));

        if payload.len() < 84 {
            return Err(corrupt("too small for header"));
        }
        let header = wire::deserialize_header(&payload[..80])
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let tx_count = u32::from_le_bytes(payload[80..84].try_into().expect("4 bytes"));
        if tx_count > MAX_TX_COUNT {
            return Err(corrupt("transaction count exceeds maximum"));
        }

        let mut offset = 84usize;
        let mut transactions = Vec::new();
        for _ in 0..tx_count {
            if offset + 4 > payload.len() {
                return Err(corrupt("truncated transaction size"));
            }
            let tx_size =
                u32::from_le_bytes(payload[offset..offset + 4].try_into().expect("4 bytes"));
            offset += 4;
            if tx_size == 0 || tx_size > MAX_TX_SIZE {
                return Err(corrupt("transaction size out of range"));
            }
            let end = offset + tx_size as usize;
            if end > payload.len() {
                return Err(corrupt("truncated transaction data"));
            }
            let tx = wire::deserialize_tx(&payload[offset..end])
                .map_err(|e| StoreError::Corrupt(e.to_string()))?;
            transactions.push(tx);
            offset = end;
        }
        if offset != payload.len() {
            return Err(corrupt("trailing bytes"));
        }

        Ok(Block {
            header,
            transactions,
        })
    }

    /// Persist the index sidecar if it has unflushed appends.
    pub fn sync(&mut self) -> Result<(), StoreError> {
        if self.dirty > 0 {
            self.flush_index()?;
            self.dirty = 0;
        }
        Ok(())
    }

    /// Whether a block is stored at `height`.
    pub fn contains(&self, height: u32) -> bool {
        self.index.contains_key(&height)
    }

    /// Highest indexed height, if any block is stored.
    pub fn max_height(&self) -> Option<u32> {
        self.index.keys().max().copied()
    }

    /// Number of indexed blocks.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

impl Drop for BlockStore {
    fn drop(&mut self) {
        // Index loss is recoverable but costly; flush on the way out.
        let _ = self.sync();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stater_core::types::{AssetId, BlockHeader, Hash256, OutPoint, Transaction, TxIn, TxOut};

    fn sample_block(seed: u8, tx_count: usize) -> Block {
        let transactions = (0..tx_count)
            .map(|i| Transaction {
                version: 1,
                inputs: vec![TxIn {
                    prevout: OutPoint::null(),
                    script_sig: vec![seed, i as u8],
                    sequence: u32::MAX,
                    asset: AssetId::STR,
                }],
                outputs: vec![TxOut {
                    value: 50 + i as u64,
                    script_pubkey: vec![seed; 32],
                    asset: AssetId::STR,
                }],
                lock_time: i as u32,
            })
            .collect();
        Block {
            header: BlockHeader {
                version: 1,
                prev_hash: Hash256([seed; 32]),
                merkle_root: Hash256([seed.wrapping_add(1); 32]),
                time: 1_000 + u32::from(seed),
                bits: 0x207f_ffff,
                nonce: u32::from(seed),
            },
            transactions,
        }
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = BlockStore::open(dir.path().join("blocks.dat")).unwrap();

        let block = sample_block(0x11, 3);
        store.write_block(0, &block).unwrap();
        assert_eq!(store.read_block(0).unwrap(), block);
    }

    #[test]
    fn multiple_blocks_indexed_by_height() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = BlockStore::open(dir.path().join("blocks.dat")).unwrap();

        for h in 0..5u32 {
            store.write_block(h, &sample_block(h as u8, 1 + h as usize)).unwrap();
        }
        assert_eq!(store.len(), 5);
        assert_eq!(store.max_height(), Some(4));
        for h in 0..5u32 {
            assert_eq!(store.read_block(h).unwrap(), sample_block(h as u8, 1 + h as usize));
        }
    }

    #[test]
    fn unknown_height_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlockStore::open(dir.path().join("blocks.dat")).unwrap();
        assert!(store.read_block(7).is_err());
    }

    #[test]
    fn index_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocks.dat");

        {
            let mut store = BlockStore::open(&path).unwrap();
            store.write_block(0, &sample_block(1, 1)).unwrap();
            store.write_block(1, &sample_block(2, 2)).unwrap();
            store.sync().unwrap();
        }

        let store = BlockStore::open(&path).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.read_block(1).unwrap(), sample_block(2, 2));
    }

    #[test]
    fn drop_flushes_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocks.dat");
        {
            let mut store = BlockStore::open(&path).unwrap();
            store.write_block(0, &sample_block(3, 1)).unwrap();
            // No explicit sync.
        }
        let store = BlockStore::open(&path).unwrap();
        assert!(store.contains(0));
    }

    #[test]
    fn corrupted_payload_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocks.dat");
        {
            let mut store = BlockStore::open(&path).unwrap();
            store.write_block(0, &sample_block(4, 1)).unwrap();
            store.sync().unwrap();
        }

        // Flip one payload byte near the end of the file.
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        fs::write(&path, bytes).unwrap();

        let store = BlockStore::open(&path).unwrap();
        assert!(matches!(
            store.read_block(0).unwrap_err(),
            StoreError::Corrupt(_)
        ));
    }

    #[test]
    fn corrupt_index_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocks.dat");
        fs::write(BlockStore::index_path(&path), [1, 0, 0, 0, 9]).unwrap();
        assert!(matches!(
            BlockStore::open(&path).unwrap_err(),
            StoreError::Corrupt(_)
        ));
    }
}
