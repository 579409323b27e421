//! Core data types for the proof-of-work chain

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Outpoint: a `(tx_id, v_out)` pair uniquely identifying an output
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub tx_id: String,
    pub v_out: u32,
}

/// Transaction input: a claimed outpoint, the claimant's public key and a
/// signature over the canonical serialization of the transaction's outputs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub tx_id: String,
    pub v_out: u32,
    pub key: String,
    pub signature: String,
}

impl TxInput {
    pub fn outpoint(&self) -> OutPoint {
        OutPoint {
            tx_id: self.tx_id.clone(),
            v_out: self.v_out,
        }
    }
}

/// What an output carries: a satoshi amount or an arbitrary data payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxValue {
    #[serde(rename = "amount")]
    Amount(u64),
    #[serde(rename = "data")]
    Data(String),
}

impl TxValue {
    /// The numeric amount, or zero for data payloads
    pub fn amount(&self) -> u64 {
        match self {
            TxValue::Amount(n) => *n,
            TxValue::Data(_) => 0,
        }
    }
}

/// Transaction output: an amount or payload assigned to a new owner's keyhash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    #[serde(flatten)]
    pub value: TxValue,
    pub keyhash: String,
}

/// Transaction: versioned ordered inputs and outputs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u32,
    #[serde(default)]
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

/// Block header; the hash input is the concatenated textual representation
/// of the fields in declaration order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: u32,
    pub parent_hash: String,
    pub merkle_root: String,
    pub time: u64,
    pub target: String,
    pub nonce: u64,
}

/// Block: a header plus an ordered transaction list, coinbase first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

/// UTXO set: every output produced by the chain that no input has spent
pub type UtxoSet = HashMap<OutPoint, TxOutput>;

/// Validation decision carrying the rejection reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Valid,
    Invalid(String),
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }
}
