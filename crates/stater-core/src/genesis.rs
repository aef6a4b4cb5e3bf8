//! Deterministic genesis block derivation.
//!
//! The genesis block is computed from the parameter set alone so every
//! node on a network agrees on it without a hardcoded blob. Its coinbase
//! pays the initial subsidy to an unspendable commitment over the genesis
//! message (a tagged hash, not a real public key).

use crate::difficulty;
use crate::error::GenesisError;
use crate::hash::{TAG_GENESIS, tagged_hash};
use crate::merkle;
use crate::params::Params;
use crate::types::{AssetId, Block, BlockHeader, Hash256, OutPoint, Transaction, TxIn, TxOut};

/// Build the genesis block for a parameter set.
///
/// A zero `genesis_nonce` means "search for one"; any non-zero nonce must
/// already satisfy the proof of work or the parameters are rejected.
pub fn create_genesis_block(params: &Params) -> Result<Block, GenesisError> {
    let coinbase = genesis_coinbase(params);
    let merkle_root = merkle::block_merkle_root(std::slice::from_ref(&coinbase));

    let mut header = BlockHeader {
        version: 1,
        prev_hash: Hash256::ZERO,
        merkle_root,
        time: params.genesis_time,
        bits: params.genesis_bits,
        nonce: params.genesis_nonce,
    };

    if !difficulty::check_proof_of_work(&header.hash(), header.bits, params) {
        if params.genesis_nonce != 0 {
            return Err(GenesisError::BadNonce);
        }
        header = mine_genesis(header, params)?;
    }

    Ok(Block {
        header,
        transactions: vec![coinbase],
    })
}

/// The unspendable script commitment carrying the genesis message.
pub fn genesis_commitment(params: &Params) -> Hash256 {
    tagged_hash(TAG_GENESIS, params.genesis_message.as_bytes())
}

fn genesis_coinbase(params: &Params) -> Transaction {
    // scriptSig carries the message itself, truncated into the coinbase
    // data bounds; the output commits to its hash.
    let mut data = params.genesis_message.as_bytes().to_vec();
    data.truncate(100);
    if data.len() < 2 {
        data.resize(2, 0);
    }

    Transaction {
        version: 1,
        inputs: vec![TxIn {
            prevout: OutPoint::null(),
            script_sig: data,
            sequence: u32::MAX,
            asset: AssetId::STR,
        }],
        outputs: vec![TxOut {
            value: params.subsidy(0, AssetId::STR),
            script_pubkey: genesis_commitment(params).as_bytes().to_vec(),
            asset: AssetId::STR,
        }],
        lock_time: 0,
    }
}

fn mine_genesis(mut header: BlockHeader, params: &Params) -> Result<BlockHeader, GenesisError> {
    for nonce in 1..u32::MAX {
        header.nonce = nonce;
        if difficulty::check_proof_of_work(&header.hash(), header.bits, params) {
            return Ok(header);
        }
    }
    Err(GenesisError::NonceExhausted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::COIN;

    #[test]
    fn regtest_genesis_is_deterministic() {
        let p = Params::regtest();
        let a = create_genesis_block(&p).unwrap();
        let b = create_genesis_block(&p).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn genesis_satisfies_its_own_target() {
        let p = Params::regtest();
        let genesis = create_genesis_block(&p).unwrap();
        assert!(difficulty::check_proof_of_work(
            &genesis.header.hash(),
            genesis.header.bits,
            &p
        ));
    }

    #[test]
    fn genesis_commits_to_its_coinbase() {
        let p = Params::regtest();
        let genesis = create_genesis_block(&p).unwrap();
        assert_eq!(
            genesis.header.merkle_root,
            merkle::block_merkle_root(&genesis.transactions)
        );
        assert_eq!(genesis.transactions.len(), 1);
        assert!(genesis.transactions[0].is_coinbase());
    }

    #[test]
    fn genesis_pays_initial_subsidy() {
        let p = Params::regtest();
        let genesis = create_genesis_block(&p).unwrap();
        assert_eq!(genesis.transactions[0].outputs[0].value, 50 * COIN);
        assert_eq!(
            genesis.transactions[0].outputs[0].script_pubkey,
            genesis_commitment(&p).as_bytes().to_vec()
        );
    }

    #[test]
    fn different_messages_produce_different_chains() {
        let a = Params::regtest();
        let mut b = Params::regtest();
        b.genesis_message = "another network".to_string();
        let ga = create_genesis_block(&a).unwrap();
        let gb = create_genesis_block(&b).unwrap();
        assert_ne!(ga.header.hash(), gb.header.hash());
    }

    #[test]
    fn bad_supplied_nonce_is_rejected() {
        let mut p = Params::mainnet();
        // Pick a nonce that is all but certain to fail the mainnet target.
        p.genesis_nonce = 1;
        let genesis = create_genesis_block(&p);
        if let Ok(block) = genesis {
            // The one-in-billions case: the nonce actually worked.
            assert!(difficulty::check_proof_of_work(
                &block.header.hash(),
                block.header.bits,
                &p
            ));
        } else {
            assert_eq!(genesis.unwrap_err(), GenesisError::BadNonce);
        }
    }
}
