//! Block hashing and merkle root computation

use crate::constants::*;
use crate::crypto;
use crate::transaction::canonical;
use crate::types::*;

/// Raw double-SHA256 digest of a header's textual representation
pub fn header_hash_bytes(header: &BlockHeader) -> [u8; 32] {
    let text = format!(
        "{}{}{}{}{}{}",
        header.version,
        header.parent_hash,
        header.merkle_root,
        header.time,
        header.target,
        header.nonce
    );
    crypto::dsha256(text.as_bytes())
}

/// Lowercase-hex hash of a block header
pub fn header_hash(header: &BlockHeader) -> String {
    hex::encode(header_hash_bytes(header))
}

/// Lowercase-hex hash identifying a block
pub fn block_hash(block: &Block) -> String {
    header_hash(&block.header)
}

/// Merkle root over the block's transactions.
///
/// Leaves are the double-SHA256 digests of each transaction's canonical
/// serialization; adjacent digests are paired (the last duplicated when
/// the level is odd), each pair hashed as a concatenation, until one
/// digest remains. The root of an empty list is the all-zeros hash.
pub fn merkle_root(transactions: &[Transaction]) -> String {
    if transactions.is_empty() {
        return ZERO_HASH.to_string();
    }

    let mut level: Vec<[u8; 32]> = transactions
        .iter()
        .map(|tx| crypto::dsha256(canonical(tx).as_bytes()))
        .collect();

    while level.len() > 1 {
        if level.len() % 2 == 1 {
            level.push(level[level.len() - 1]);
        }
        level = level
            .chunks(2)
            .map(|pair| {
                let mut joined = [0u8; 64];
                joined[..32].copy_from_slice(&pair[0]);
                joined[32..].copy_from_slice(&pair[1]);
                crypto::sha256(&joined)
            })
            .collect();
    }

    hex::encode(level[0])
}
