//! Transaction identity, standalone validation and the signed builder

use crate::constants::*;
use crate::crypto::{self, Keypair};
use crate::types::*;
use std::collections::HashSet;

/// Canonical serialization of a transaction, the bytes its id hashes
pub fn canonical(tx: &Transaction) -> String {
    serde_json::to_string(tx).expect("serialize transaction")
}

/// Canonical serialization of a transaction's outputs, the bytes every
/// input signature covers
pub fn canonical_outputs(tx: &Transaction) -> String {
    serde_json::to_string(&tx.outputs).expect("serialize outputs")
}

/// Transaction id: double SHA-256 of the canonical serialization
pub fn tx_id(tx: &Transaction) -> String {
    hex::encode(crypto::dsha256(canonical(tx).as_bytes()))
}

/// A coinbase has no inputs and exactly one amount output
pub fn is_coinbase(tx: &Transaction) -> bool {
    tx.inputs.is_empty()
        && tx.outputs.len() == 1
        && matches!(tx.outputs[0].value, TxValue::Amount(_))
}

/// Build the coinbase paying `amount` to the miner's keyhash
pub fn coinbase(amount: u64, keyhash: String) -> Transaction {
    Transaction {
        version: TX_VERSION,
        inputs: vec![],
        outputs: vec![TxOutput {
            value: TxValue::Amount(amount),
            keyhash,
        }],
    }
}

/// Validate a non-coinbase transaction against a UTXO snapshot.
///
/// The transaction is valid iff:
/// 1. It carries the expected version and at least one output.
/// 2. Every input's outpoint exists in the snapshot and is not claimed
///    twice within the transaction.
/// 3. Every input's public key hashes to the outpoint's owner keyhash.
/// 4. Every input's signature verifies over the canonical outputs.
/// 5. The numeric input total covers the numeric output total; data
///    payloads count for nothing on either side.
///
/// Returns the decision and the fee (input total minus output total).
pub fn validate_transaction(tx: &Transaction, utxo: &UtxoSet) -> (ValidationResult, u64) {
    if tx.version != TX_VERSION {
        return (
            ValidationResult::Invalid(format!("unsupported transaction version {}", tx.version)),
            0,
        );
    }
    if tx.outputs.is_empty() {
        return (
            ValidationResult::Invalid("transaction has no outputs".to_string()),
            0,
        );
    }

    let signed_payload = canonical_outputs(tx);
    let mut claimed: HashSet<OutPoint> = HashSet::new();
    let mut total_in = 0u64;

    for input in &tx.inputs {
        let outpoint = input.outpoint();
        if !claimed.insert(outpoint.clone()) {
            return (
                ValidationResult::Invalid(format!(
                    "outpoint {}:{} claimed twice",
                    outpoint.tx_id, outpoint.v_out
                )),
                0,
            );
        }

        let Some(prev) = utxo.get(&outpoint) else {
            return (
                ValidationResult::Invalid(format!(
                    "outpoint {}:{} is not spendable",
                    outpoint.tx_id, outpoint.v_out
                )),
                0,
            );
        };

        match crypto::keyhash(&input.key) {
            Ok(hash) if hash == prev.keyhash => {}
            _ => {
                return (
                    ValidationResult::Invalid(format!(
                        "public key does not own outpoint {}:{}",
                        outpoint.tx_id, outpoint.v_out
                    )),
                    0,
                );
            }
        }

        if !crypto::verify(&input.key, signed_payload.as_bytes(), &input.signature) {
            return (
                ValidationResult::Invalid(format!(
                    "signature check failed for outpoint {}:{}",
                    outpoint.tx_id, outpoint.v_out
                )),
                0,
            );
        }

        total_in += prev.value.amount();
    }

    let total_out: u64 = tx.outputs.iter().map(|o| o.value.amount()).sum();
    if total_in < total_out {
        return (
            ValidationResult::Invalid(format!(
                "outputs {total_out} exceed inputs {total_in}"
            )),
            0,
        );
    }

    (ValidationResult::Valid, total_in - total_out)
}

/// Assemble a signed transaction spending the given outpoints with the
/// given wallets. Each input signs the canonical serialization of the
/// final output list.
pub fn build_transaction(inputs: &[(OutPoint, &Keypair)], outputs: Vec<TxOutput>) -> Transaction {
    let mut tx = Transaction {
        version: TX_VERSION,
        inputs: Vec::with_capacity(inputs.len()),
        outputs,
    };
    let signed_payload = canonical_outputs(&tx);
    for (outpoint, wallet) in inputs {
        tx.inputs.push(TxInput {
            tx_id: outpoint.tx_id.clone(),
            v_out: outpoint.v_out,
            key: wallet.public_hex(),
            signature: wallet.sign(signed_payload.as_bytes()),
        });
    }
    tx
}
