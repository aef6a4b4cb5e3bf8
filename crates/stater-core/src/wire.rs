//! Canonical wire codec for transactions and block headers.
//!
//! Everything is little-endian. Variable-length byte strings carry a u32
//! length prefix. The layouts here are normative: transaction and block
//! hashes are tagged hashes of exactly these bytes, so any deviation is a
//! consensus fault.
//!
//! The in-memory asset tag on [`TxIn`]/[`TxOut`] is deliberately absent
//! from the wire; decoding assigns [`AssetId::STR`]. Asset agreement is
//! enforced against the referenced UTXOs during validation.

use crate::error::DecodeError;
use crate::types::{AssetId, BlockHeader, Hash256, OutPoint, Transaction, TxIn, TxOut};

// --- Writers ---

fn write_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn write_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn write_var_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    write_u32(out, bytes.len() as u32);
    out.extend_from_slice(bytes);
}

// --- Reader ---

/// Cursor over an input buffer. Every read checks bounds and reports the
/// failing offset.
struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or(DecodeError::UnexpectedEof(self.offset))?;
        let slice = &self.data[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn read_u32(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes(bytes.try_into().expect("4-byte slice")))
    }

    fn read_u64(&mut self) -> Result<u64, DecodeError> {
        let bytes = self.take(8)?;
        Ok(u64::from_le_bytes(bytes.try_into().expect("8-byte slice")))
    }

    fn read_hash(&mut self) -> Result<Hash256, DecodeError> {
        let bytes = self.take(32)?;
        Ok(Hash256(bytes.try_into().expect("32-byte slice")))
    }

    fn read_var_bytes(&mut self) -> Result<Vec<u8>, DecodeError> {
        let len = self.read_u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    fn finish(self) -> Result<(), DecodeError> {
        let remaining = self.data.len() - self.offset;
        if remaining != 0 {
            return Err(DecodeError::TrailingBytes(remaining));
        }
        Ok(())
    }
}

// --- Transactions ---

/// Serialize a transaction to its canonical byte form.
pub fn serialize_tx(tx: &Transaction) -> Vec<u8> {
    let mut out = Vec::with_capacity(64 + tx.inputs.len() * 108 + tx.outputs.len() * 48);
    write_u32(&mut out, tx.version);
    write_u32(&mut out, tx.inputs.len() as u32);
    for input in &tx.inputs {
        out.extend_from_slice(input.prevout.txid.as_bytes());
        write_u32(&mut out, input.prevout.index);
        write_var_bytes(&mut out, &input.script_sig);
        write_u32(&mut out, input.sequence);
    }
    write_u32(&mut out, tx.outputs.len() as u32);
    for output in &tx.outputs {
        write_u64(&mut out, output.value);
        write_var_bytes(&mut out, &output.script_pubkey);
    }
    write_u32(&mut out, tx.lock_time);
    out
}

/// Decode a transaction from canonical bytes.
///
/// Fails if any declared length is not honored or if bytes remain after
/// the lock time.
pub fn deserialize_tx(data: &[u8]) -> Result<Transaction, DecodeError> {
    let mut r = Reader::new(data);

    let version = r.read_u32()?;

    let input_count = r.read_u32()?;
    let mut inputs = Vec::new();
    for _ in 0..input_count {
        let txid = r.read_hash()?;
        let index = r.read_u32()?;
        let script_sig = r.read_var_bytes()?;
        let sequence = r.read_u32()?;
        inputs.push(TxIn {
            prevout: OutPoint { txid, index },
            script_sig,
            sequence,
            asset: AssetId::STR,
        });
    }

    let output_count = r.read_u32()?;
    let mut outputs = Vec::new();
    for _ in 0..output_count {
        let value = r.read_u64()?;
        let script_pubkey = r.read_var_bytes()?;
        outputs.push(TxOut {
            value,
            script_pubkey,
            asset: AssetId::STR,
        });
    }

    let lock_time = r.read_u32()?;
    r.finish()?;

    Ok(Transaction {
        version,
        inputs,
        outputs,
        lock_time,
    })
}

// --- Block headers ---

/// Serialize a block header to its canonical 80-byte form.
pub fn serialize_header(header: &BlockHeader) -> [u8; 80] {
    let mut out = [0u8; 80];
    out[0..4].copy_from_slice(&header.version.to_le_bytes());
    out[4..36].copy_from_slice(header.prev_hash.as_bytes());
    out[36..68].copy_from_slice(header.merkle_root.as_bytes());
    out[68..72].copy_from_slice(&header.time.to_le_bytes());
    out[72..76].copy_from_slice(&header.bits.to_le_bytes());
    out[76..80].copy_from_slice(&header.nonce.to_le_bytes());
    out
}

/// Decode a block header from exactly 80 bytes.
pub fn deserialize_header(data: &[u8]) -> Result<BlockHeader, DecodeError> {
    if data.len() != 80 {
        return Err(DecodeError::BadHeaderLength(data.len()));
    }
    let mut r = Reader::new(data);
    let header = BlockHeader {
        version: r.read_u32()?,
        prev_hash: r.read_hash()?,
        merkle_root: r.read_hash()?,
        time: r.read_u32()?,
        bits: r.read_u32()?,
        nonce: r.read_u32()?,
    };
    r.finish()?;
    Ok(header)
}
