//! Miner-local pool of validated, not-yet-mined transactions

use crate::transaction::validate_transaction;
use crate::types::*;
use std::collections::HashSet;
use tracing::debug;

/// A pooled transaction with the fee computed at admission time
#[derive(Debug, Clone)]
pub struct PoolEntry {
    pub id: String,
    pub tx: Transaction,
    pub fee: u64,
}

/// Insertion-ordered transaction pool, idempotent by transaction id
#[derive(Debug, Default)]
pub struct TxPool {
    entries: Vec<PoolEntry>,
    ids: HashSet<String>,
}

impl TxPool {
    pub fn new() -> TxPool {
        TxPool::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Insert a validated transaction; returns false if it was already
    /// pooled
    pub fn insert(&mut self, id: String, tx: Transaction, fee: u64) -> bool {
        if !self.ids.insert(id.clone()) {
            return false;
        }
        self.entries.push(PoolEntry { id, tx, fee });
        true
    }

    /// Insertion-ordered copy for the mining worker
    pub fn snapshot(&self) -> Vec<PoolEntry> {
        self.entries.clone()
    }

    /// Drop every entry whose id appears in `ids` (the transactions an
    /// accepted block consumed)
    pub fn remove_ids(&mut self, ids: &[String]) {
        let consumed: HashSet<&String> = ids.iter().collect();
        self.entries.retain(|e| !consumed.contains(&e.id));
        self.ids.retain(|id| !consumed.contains(id));
    }

    /// Revalidate every entry against a replacement UTXO set, keeping the
    /// insertion order of the survivors and refreshing their fees
    pub fn refilter(&mut self, utxo: &UtxoSet) {
        let entries = std::mem::take(&mut self.entries);
        self.ids.clear();
        for entry in entries {
            match validate_transaction(&entry.tx, utxo) {
                (ValidationResult::Valid, fee) => {
                    self.ids.insert(entry.id.clone());
                    self.entries.push(PoolEntry { fee, ..entry });
                }
                (ValidationResult::Invalid(reason), _) => {
                    debug!(id = %entry.id, %reason, "dropping pooled transaction after chain update");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::TX_VERSION;
    use crate::crypto::Keypair;
    use crate::transaction::{build_transaction, tx_id};

    fn data_tx(payload: &str) -> Transaction {
        Transaction {
            version: TX_VERSION,
            inputs: vec![],
            outputs: vec![TxOutput {
                value: TxValue::Data(payload.to_string()),
                keyhash: "aa".repeat(20),
            }],
        }
    }

    fn pooled(pool: &mut TxPool, tx: Transaction, fee: u64) -> String {
        let id = tx_id(&tx);
        assert!(pool.insert(id.clone(), tx, fee));
        id
    }

    #[test]
    fn insert_is_idempotent_by_id() {
        let mut pool = TxPool::new();
        let tx = data_tx("a");
        let id = tx_id(&tx);
        assert!(pool.insert(id.clone(), tx.clone(), 0));
        assert!(!pool.insert(id.clone(), tx, 0));
        assert_eq!(pool.len(), 1);
        assert!(pool.contains(&id));
    }

    #[test]
    fn snapshot_preserves_insertion_order() {
        let mut pool = TxPool::new();
        let first = pooled(&mut pool, data_tx("a"), 0);
        let second = pooled(&mut pool, data_tx("b"), 0);
        let snap = pool.snapshot();
        assert_eq!(snap[0].id, first);
        assert_eq!(snap[1].id, second);
    }

    #[test]
    fn remove_ids_clears_consumed_entries() {
        let mut pool = TxPool::new();
        let keep = pooled(&mut pool, data_tx("keep"), 0);
        let gone = pooled(&mut pool, data_tx("gone"), 0);
        pool.remove_ids(std::slice::from_ref(&gone));
        assert_eq!(pool.len(), 1);
        assert!(pool.contains(&keep));
        assert!(!pool.contains(&gone));
    }

    #[test]
    fn refilter_drops_entries_spending_vanished_outpoints() {
        let wallet = Keypair::generate();
        let outpoint = OutPoint {
            tx_id: "bb".repeat(32),
            v_out: 0,
        };
        let mut utxo = UtxoSet::new();
        utxo.insert(
            outpoint.clone(),
            TxOutput {
                value: TxValue::Amount(1000),
                keyhash: wallet.keyhash(),
            },
        );

        let spend = build_transaction(
            &[(outpoint.clone(), &wallet)],
            vec![TxOutput {
                value: TxValue::Amount(400),
                keyhash: wallet.keyhash(),
            }],
        );
        let mut pool = TxPool::new();
        let spend_id = pooled(&mut pool, spend, 600);
        let anchor_id = pooled(&mut pool, data_tx("anchor"), 0);

        // Against the funded set both survive
        pool.refilter(&utxo);
        assert_eq!(pool.len(), 2);

        // After the outpoint disappears only the data anchor remains
        utxo.remove(&outpoint);
        pool.refilter(&utxo);
        assert_eq!(pool.len(), 1);
        assert!(pool.contains(&anchor_id));
        assert!(!pool.contains(&spend_id));
    }
}
