//! Schnorr signature verification for transaction inputs.
//!
//! Outputs commit to a 32-byte x-only secp256k1 public key; inputs carry a
//! 64-byte BIP-340 Schnorr signature. The signed message is the canonical
//! transaction serialization with every `script_sig` cleared, so the
//! signature cannot depend on itself and all inputs of a transaction sign
//! the same skeleton.
//!
//! The underlying BIP-340 rules (even-Y lifting of the public key, even-Y
//! nonce point, rejection of out-of-range scalars) are enforced by
//! libsecp256k1.

use std::sync::LazyLock;

use secp256k1::schnorr::Signature;
use secp256k1::{All, Keypair, Secp256k1, XOnlyPublicKey};

use crate::constants::{SCRIPT_PUBKEY_LEN, SIGNATURE_LEN};
use crate::error::CryptoError;
use crate::types::{Transaction, TxOut};
use crate::wire;

static SECP: LazyLock<Secp256k1<All>> = LazyLock::new(Secp256k1::new);

/// The message every input of `tx` signs: the canonical serialization with
/// all `script_sig` fields emptied.
pub fn signing_message(tx: &Transaction) -> Vec<u8> {
    let mut skeleton = tx.clone();
    for input in &mut skeleton.inputs {
        input.script_sig.clear();
    }
    wire::serialize_tx(&skeleton)
}

/// Verify the signature of one input against the output it spends.
///
/// Fails when the signature is not 64 bytes, the script pubkey is not a
/// 32-byte x-only key, the key does not lift to a curve point, or the
/// BIP-340 verification equation does not hold.
pub fn verify_input(tx: &Transaction, input_index: usize, utxo: &TxOut) -> Result<(), CryptoError> {
    let input = tx
        .inputs
        .get(input_index)
        .ok_or(CryptoError::InputIndexOutOfBounds {
            index: input_index,
            len: tx.inputs.len(),
        })?;

    if input.script_sig.len() != SIGNATURE_LEN {
        return Err(CryptoError::BadSignatureLength(input.script_sig.len()));
    }
    if utxo.script_pubkey.len() != SCRIPT_PUBKEY_LEN {
        return Err(CryptoError::BadPubKeyLength(utxo.script_pubkey.len()));
    }

    let pubkey = XOnlyPublicKey::from_slice(&utxo.script_pubkey)
        .map_err(|_| CryptoError::InvalidPublicKey)?;
    let signature =
        Signature::from_slice(&input.script_sig).map_err(|_| CryptoError::VerificationFailed)?;

    let message = signing_message(tx);
    SECP.verify_schnorr(&signature, &message, &pubkey)
        .map_err(|_| CryptoError::VerificationFailed)
}

/// Sign one input of `tx`, replacing its `script_sig` with a 64-byte
/// Schnorr signature.
///
/// Wallet-side helper; consensus only verifies. Deterministic (no
/// auxiliary randomness), which keeps test vectors stable.
pub fn sign_input(
    tx: &mut Transaction,
    input_index: usize,
    keypair: &Keypair,
) -> Result<(), CryptoError> {
    if input_index >= tx.inputs.len() {
        return Err(CryptoError::InputIndexOutOfBounds {
            index: input_index,
            len: tx.inputs.len(),
        });
    }
    let message = signing_message(tx);
    let signature = SECP.sign_schnorr_no_aux_rand(&message, keypair);
    tx.inputs[input_index].script_sig = signature.as_ref().to_vec();
    Ok(())
}

/// The 32-byte x-only script pubkey paying to `keypair`.
pub fn script_pubkey_for(keypair: &Keypair) -> Vec<u8> {
    XOnlyPublicKey::from_keypair(keypair).0.serialize().to_vec()
}

/// Build a keypair from fixed secret bytes. Test and tooling helper.
pub fn keypair_from_secret(secret: &[u8; 32]) -> Result<Keypair, CryptoError> {
    let sk = secp256k1::SecretKey::from_slice(secret).map_err(|_| CryptoError::InvalidPublicKey)?;
    Ok(Keypair::from_secret_key(&SECP, &sk))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AssetId, Hash256, OutPoint, TxIn};

    fn keypair(seed: u8) -> Keypair {
        keypair_from_secret(&[seed; 32]).unwrap()
    }

    fn utxo_for(kp: &Keypair) -> TxOut {
        TxOut {
            value: 30,
            script_pubkey: script_pubkey_for(kp),
            asset: AssetId::STR,
        }
    }

    fn unsigned_tx() -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![TxIn {
                prevout: OutPoint {
                    txid: Hash256([0x99; 32]),
                    index: 1,
                },
                script_sig: vec![],
                sequence: u32::MAX,
                asset: AssetId::STR,
            }],
            outputs: vec![TxOut {
                value: 29,
                script_pubkey: vec![0x02; 32],
                asset: AssetId::STR,
            }],
            lock_time: 0,
        }
    }

    // --- Sign and verify ---

    #[test]
    fn sign_then_verify_succeeds() {
        let kp = keypair(0x01);
        let mut tx = unsigned_tx();
        sign_input(&mut tx, 0, &kp).unwrap();
        assert_eq!(tx.inputs[0].script_sig.len(), 64);
        verify_input(&tx, 0, &utxo_for(&kp)).unwrap();
    }

    #[test]
    fn signing_is_deterministic() {
        let kp = keypair(0x02);
        let mut a = unsigned_tx();
        let mut b = unsigned_tx();
        sign_input(&mut a, 0, &kp).unwrap();
        sign_input(&mut b, 0, &kp).unwrap();
        assert_eq!(a.inputs[0].script_sig, b.inputs[0].script_sig);
    }

    #[test]
    fn wrong_key_fails() {
        let kp = keypair(0x03);
        let other = keypair(0x04);
        let mut tx = unsigned_tx();
        sign_input(&mut tx, 0, &kp).unwrap();
        assert_eq!(
            verify_input(&tx, 0, &utxo_for(&other)).unwrap_err(),
            CryptoError::VerificationFailed
        );
    }

    #[test]
    fn tampered_output_fails() {
        let kp = keypair(0x05);
        let mut tx = unsigned_tx();
        sign_input(&mut tx, 0, &kp).unwrap();
        tx.outputs[0].value += 1;
        assert_eq!(
            verify_input(&tx, 0, &utxo_for(&kp)).unwrap_err(),
            CryptoError::VerificationFailed
        );
    }

    #[test]
    fn tampered_signature_fails() {
        let kp = keypair(0x06);
        let mut tx = unsigned_tx();
        sign_input(&mut tx, 0, &kp).unwrap();
        tx.inputs[0].script_sig[10] ^= 0x01;
        assert_eq!(
            verify_input(&tx, 0, &utxo_for(&kp)).unwrap_err(),
            CryptoError::VerificationFailed
        );
    }

    // --- Structural rejections ---

    #[test]
    fn short_signature_rejected() {
        let kp = keypair(0x07);
        let mut tx = unsigned_tx();
        tx.inputs[0].script_sig = vec![0u8; 63];
        assert_eq!(
            verify_input(&tx, 0, &utxo_for(&kp)).unwrap_err(),
            CryptoError::BadSignatureLength(63)
        );
    }

    #[test]
    fn bad_pubkey_length_rejected() {
        let kp = keypair(0x08);
        let mut tx = unsigned_tx();
        sign_input(&mut tx, 0, &kp).unwrap();
        let utxo = TxOut {
            value: 30,
            script_pubkey: vec![0xAA; 33],
            asset: AssetId::STR,
        };
        assert_eq!(
            verify_input(&tx, 0, &utxo).unwrap_err(),
            CryptoError::BadPubKeyLength(33)
        );
    }

    #[test]
    fn off_curve_pubkey_rejected() {
        // The field-prime-minus-one x coordinate with all-FF bytes does not
        // decode as a valid x-only key.
        let kp = keypair(0x09);
        let mut tx = unsigned_tx();
        sign_input(&mut tx, 0, &kp).unwrap();
        let utxo = TxOut {
            value: 30,
            script_pubkey: vec![0xFF; 32],
            asset: AssetId::STR,
        };
        assert_eq!(
            verify_input(&tx, 0, &utxo).unwrap_err(),
            CryptoError::InvalidPublicKey
        );
    }

    #[test]
    fn input_index_out_of_bounds() {
        let kp = keypair(0x0A);
        let tx = unsigned_tx();
        assert_eq!(
            verify_input(&tx, 5, &utxo_for(&kp)).unwrap_err(),
            CryptoError::InputIndexOutOfBounds { index: 5, len: 1 }
        );
    }

    // --- Message semantics ---

    #[test]
    fn message_excludes_script_sigs() {
        let mut tx = unsigned_tx();
        let before = signing_message(&tx);
        tx.inputs[0].script_sig = vec![0xAB; 64];
        assert_eq!(signing_message(&tx), before);
    }

    #[test]
    fn message_commits_to_prevouts() {
        let mut tx = unsigned_tx();
        let before = signing_message(&tx);
        tx.inputs[0].prevout.index = 2;
        assert_ne!(signing_message(&tx), before);
    }
}
