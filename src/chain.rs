//! Blockchain state: UTXO maintenance, block and chain validation, and
//! longest-valid-chain election

use crate::block::{header_hash, merkle_root};
use crate::constants::*;
use crate::error::{ChainError, Result};
use crate::pow;
use crate::transaction::{is_coinbase, tx_id, validate_transaction};
use crate::types::*;

/// The chain a participant holds, together with the UTXO set its blocks
/// produce. The set is always derivable by replaying the blocks from the
/// genesis parent.
#[derive(Debug, Clone, Default)]
pub struct Blockchain {
    pub blocks: Vec<Block>,
    pub utxo: UtxoSet,
}

/// Apply a transaction to a UTXO set: consume its inputs, produce its
/// outputs at `(tx_id, index)`
pub fn apply_transaction(tx: &Transaction, utxo: &mut UtxoSet) {
    for input in &tx.inputs {
        utxo.remove(&input.outpoint());
    }
    let id = tx_id(tx);
    for (index, output) in tx.outputs.iter().enumerate() {
        utxo.insert(
            OutPoint {
                tx_id: id.clone(),
                v_out: index as u32,
            },
            output.clone(),
        );
    }
}

impl Blockchain {
    pub fn new() -> Blockchain {
        Blockchain::default()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Hash of the last block, or the genesis parent for an empty chain
    pub fn tip_hash(&self) -> String {
        self.blocks
            .last()
            .map(|b| header_hash(&b.header))
            .unwrap_or_else(|| GENESIS_HASH.to_string())
    }

    /// Validate a block as the next link of this chain.
    ///
    /// 1. The header hash satisfies the header's own target.
    /// 2. The parent hash matches the current tip (the genesis parent for
    ///    an empty chain).
    /// 3. The merkle root matches the transactions.
    /// 4. Exactly one coinbase, placed first.
    /// 5. Every other transaction validates left to right, so outputs
    ///    produced earlier in the block are spendable later in it.
    /// 6. The coinbase amount equals the block reward plus the fees.
    pub fn validate_block(&self, block: &Block) -> ValidationResult {
        let hash = header_hash(&block.header);
        match pow::meets_target(&hash, &block.header.target) {
            Ok(true) => {}
            Ok(false) => {
                return ValidationResult::Invalid(format!(
                    "header hash {hash} misses target {}",
                    block.header.target
                ));
            }
            Err(err) => return ValidationResult::Invalid(err.to_string()),
        }

        let expected_parent = self.tip_hash();
        if block.header.parent_hash != expected_parent {
            return ValidationResult::Invalid(format!(
                "parent hash {} does not extend tip {expected_parent}",
                block.header.parent_hash
            ));
        }

        let expected_root = merkle_root(&block.transactions);
        if block.header.merkle_root != expected_root {
            return ValidationResult::Invalid(format!(
                "merkle root {} does not match transactions",
                block.header.merkle_root
            ));
        }

        let coinbase_count = block.transactions.iter().filter(|t| is_coinbase(t)).count();
        if coinbase_count != 1 {
            return ValidationResult::Invalid(format!(
                "expected exactly one coinbase, found {coinbase_count}"
            ));
        }
        if !is_coinbase(&block.transactions[0]) {
            return ValidationResult::Invalid("coinbase must come first".to_string());
        }

        let mut scratch = self.utxo.clone();
        apply_transaction(&block.transactions[0], &mut scratch);

        let mut fees = 0u64;
        for (index, tx) in block.transactions.iter().enumerate().skip(1) {
            let (result, fee) = validate_transaction(tx, &scratch);
            if let ValidationResult::Invalid(reason) = result {
                return ValidationResult::Invalid(format!("transaction {index}: {reason}"));
            }
            fees += fee;
            apply_transaction(tx, &mut scratch);
        }

        let paid = block.transactions[0].outputs[0].value.amount();
        if paid != BLOCK_REWARD + fees {
            return ValidationResult::Invalid(format!(
                "coinbase pays {paid}, expected {}",
                BLOCK_REWARD + fees
            ));
        }

        ValidationResult::Valid
    }

    /// Append an already-accepted block, updating the UTXO set.
    /// Returns the ids of the block's transactions.
    pub fn append_block(&mut self, block: Block) -> Vec<String> {
        let mut ids = Vec::with_capacity(block.transactions.len());
        for tx in &block.transactions {
            ids.push(tx_id(tx));
            apply_transaction(tx, &mut self.utxo);
        }
        self.blocks.push(block);
        ids
    }

    /// Replay a block list from the genesis parent, validating each block.
    /// Returns the chain with its reconstructed UTXO set.
    pub fn rebuild(blocks: Vec<Block>) -> Result<Blockchain> {
        let mut chain = Blockchain::new();
        for (index, block) in blocks.into_iter().enumerate() {
            match chain.validate_block(&block) {
                ValidationResult::Valid => {
                    chain.append_block(block);
                }
                ValidationResult::Invalid(reason) => {
                    return Err(ChainError::InvalidChain(format!("block {index}: {reason}")));
                }
            }
        }
        Ok(chain)
    }

    /// Whether the held blocks replay cleanly from the genesis parent
    pub fn is_valid(&self) -> bool {
        Blockchain::rebuild(self.blocks.clone()).is_ok()
    }
}

/// Longest-valid-chain election: the longest candidate that replays
/// cleanly wins; ties keep the locally held chain, and if nothing
/// validates the local chain stays as it is.
pub fn elect<'a>(
    local: &'a [Block],
    candidates: impl IntoIterator<Item = &'a [Block]>,
) -> &'a [Block] {
    let mut best = local;
    let mut best_valid = Blockchain::rebuild(local.to_vec()).is_ok();
    for candidate in candidates {
        let longer = candidate.len() > best.len();
        if (longer || !best_valid) && Blockchain::rebuild(candidate.to_vec()).is_ok() {
            best = candidate;
            best_valid = true;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;
    use crate::mining::{assemble_candidate, solve};
    use crate::transaction::{build_transaction, coinbase};
    use std::sync::atomic::AtomicBool;

    const EASY: &str = "20ffffff";

    fn mine_next(chain: &Blockchain, keyhash: &str, txs: &[(Transaction, u64)]) -> Block {
        let entries: Vec<crate::mempool::PoolEntry> = txs
            .iter()
            .map(|(tx, fee)| crate::mempool::PoolEntry {
                id: tx_id(tx),
                tx: tx.clone(),
                fee: *fee,
            })
            .collect();
        let mut block = assemble_candidate(&entries, keyhash, &chain.tip_hash(), EASY);
        assert!(solve(&mut block, &AtomicBool::new(false)).unwrap());
        block
    }

    fn grown_chain(wallet: &Keypair, blocks: usize) -> Blockchain {
        let mut chain = Blockchain::new();
        for _ in 0..blocks {
            let block = mine_next(&chain, &wallet.keyhash(), &[]);
            assert!(chain.validate_block(&block).is_valid());
            chain.append_block(block);
        }
        chain
    }

    #[test]
    fn empty_chain_accepts_only_genesis_parent() {
        let wallet = Keypair::generate();
        let chain = Blockchain::new();
        assert_eq!(chain.tip_hash(), GENESIS_HASH);

        let good = mine_next(&chain, &wallet.keyhash(), &[]);
        assert!(chain.validate_block(&good).is_valid());

        let mut orphan = good.clone();
        orphan.header.parent_hash = "11".repeat(32);
        // Re-solve so only the parent linkage is at fault
        assert!(solve(&mut orphan, &AtomicBool::new(false)).unwrap());
        assert!(!chain.validate_block(&orphan).is_valid());
    }

    #[test]
    fn rejects_merkle_mismatch() {
        let wallet = Keypair::generate();
        let chain = Blockchain::new();
        let mut block = mine_next(&chain, &wallet.keyhash(), &[]);
        block.header.merkle_root = ZERO_HASH.to_string();
        assert!(solve(&mut block, &AtomicBool::new(false)).unwrap());
        assert!(!chain.validate_block(&block).is_valid());
    }

    #[test]
    fn rejects_missed_target() {
        let wallet = Keypair::generate();
        let chain = Blockchain::new();
        let mut block = mine_next(&chain, &wallet.keyhash(), &[]);
        // A practically unreachable target
        block.header.target = "03ffffff".to_string();
        assert!(!chain.validate_block(&block).is_valid());
    }

    #[test]
    fn rejects_second_coinbase() {
        let wallet = Keypair::generate();
        let chain = Blockchain::new();
        let mut block = mine_next(&chain, &wallet.keyhash(), &[]);
        block
            .transactions
            .push(coinbase(0, wallet.keyhash()));
        block.header.merkle_root = merkle_root(&block.transactions);
        assert!(solve(&mut block, &AtomicBool::new(false)).unwrap());
        assert!(!chain.validate_block(&block).is_valid());
    }

    #[test]
    fn rejects_wrong_coinbase_amount() {
        let wallet = Keypair::generate();
        let chain = Blockchain::new();
        let mut block = mine_next(&chain, &wallet.keyhash(), &[]);
        block.transactions[0] = coinbase(BLOCK_REWARD + 1, wallet.keyhash());
        block.header.merkle_root = merkle_root(&block.transactions);
        assert!(solve(&mut block, &AtomicBool::new(false)).unwrap());
        assert!(!chain.validate_block(&block).is_valid());
    }

    #[test]
    fn append_block_maintains_utxo() {
        let wallet = Keypair::generate();
        let chain = grown_chain(&wallet, 1);
        assert_eq!(chain.utxo.len(), 1);
        let (outpoint, output) = chain.utxo.iter().next().unwrap();
        assert_eq!(outpoint.v_out, 0);
        assert_eq!(output.value.amount(), BLOCK_REWARD);
        assert_eq!(output.keyhash, wallet.keyhash());
    }

    #[test]
    fn spending_moves_the_outpoint() {
        let wallet = Keypair::generate();
        let recipient = Keypair::generate();
        let mut chain = grown_chain(&wallet, 1);

        let funding = chain.utxo.keys().next().unwrap().clone();
        let tx = build_transaction(
            &[(funding.clone(), &wallet)],
            vec![TxOutput {
                value: TxValue::Amount(100_000_000),
                keyhash: recipient.keyhash(),
            }],
        );
        let fee = BLOCK_REWARD - 100_000_000;
        let block = mine_next(&chain, &wallet.keyhash(), &[(tx.clone(), fee)]);
        assert!(chain.validate_block(&block).is_valid());
        chain.append_block(block);

        assert!(!chain.utxo.contains_key(&funding));
        let spent_to = OutPoint {
            tx_id: tx_id(&tx),
            v_out: 0,
        };
        assert_eq!(chain.utxo[&spent_to].keyhash, recipient.keyhash());
        // New coinbase pays reward + fee
        let coinbase_amount = chain.blocks[1].transactions[0].outputs[0].value.amount();
        assert_eq!(coinbase_amount, BLOCK_REWARD + fee);
    }

    #[test]
    fn outputs_created_earlier_in_a_block_are_spendable_later() {
        let alice = Keypair::generate();
        let bob = Keypair::generate();
        let mut chain = grown_chain(&alice, 1);

        let funding = chain.utxo.keys().next().unwrap().clone();
        let first = build_transaction(
            &[(funding, &alice)],
            vec![TxOutput {
                value: TxValue::Amount(500),
                keyhash: bob.keyhash(),
            }],
        );
        let first_fee = BLOCK_REWARD - 500;
        let second = build_transaction(
            &[(
                OutPoint {
                    tx_id: tx_id(&first),
                    v_out: 0,
                },
                &bob,
            )],
            vec![TxOutput {
                value: TxValue::Data("receipt".to_string()),
                keyhash: bob.keyhash(),
            }],
        );
        let second_fee = 500;

        let block = mine_next(
            &chain,
            &alice.keyhash(),
            &[(first, first_fee), (second, second_fee)],
        );
        assert!(chain.validate_block(&block).is_valid());
        chain.append_block(block);
    }

    #[test]
    fn rebuild_replays_to_the_same_utxo() {
        let wallet = Keypair::generate();
        let chain = grown_chain(&wallet, 3);
        let rebuilt = Blockchain::rebuild(chain.blocks.clone()).unwrap();
        assert_eq!(rebuilt.utxo, chain.utxo);
        assert_eq!(rebuilt.tip_hash(), chain.tip_hash());
        assert!(chain.is_valid());
    }

    #[test]
    fn rebuild_rejects_tampered_history() {
        let wallet = Keypair::generate();
        let chain = grown_chain(&wallet, 3);
        let mut blocks = chain.blocks;
        blocks[1].transactions[0] = coinbase(BLOCK_REWARD * 2, wallet.keyhash());
        assert!(Blockchain::rebuild(blocks).is_err());
    }

    #[test]
    fn election_prefers_longest_valid_chain() {
        let a = Keypair::generate();
        let b = Keypair::generate();
        let three = grown_chain(&a, 3);
        let four = grown_chain(&b, 4);

        let winner = elect(&three.blocks, [four.blocks.as_slice()]);
        assert_eq!(winner.len(), 4);
    }

    #[test]
    fn election_ties_keep_the_local_chain() {
        let a = Keypair::generate();
        let b = Keypair::generate();
        let local = grown_chain(&a, 3);
        let other = grown_chain(&b, 3);

        let winner = elect(&local.blocks, [other.blocks.as_slice()]);
        assert_eq!(winner[0].transactions[0].outputs[0].keyhash, a.keyhash());
    }

    #[test]
    fn election_skips_invalid_candidates() {
        let a = Keypair::generate();
        let b = Keypair::generate();
        let local = grown_chain(&a, 2);
        let mut forged = grown_chain(&b, 5).blocks;
        forged[0].transactions[0] = coinbase(BLOCK_REWARD * 10, b.keyhash());

        let winner = elect(&local.blocks, [forged.as_slice()]);
        assert_eq!(winner.len(), 2);
    }
}
