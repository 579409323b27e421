//! Pluggable vote strategy: how a miner judges a foreign candidate block

use crate::chain::Blockchain;
use crate::types::Block;
use tracing::debug;

/// Strategy chosen at miner startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Honest,
    Selfish,
}

impl Strategy {
    pub fn verifier(self) -> Box<dyn BlockVerifier> {
        match self {
            Strategy::Honest => Box::new(HonestVerifier),
            Strategy::Selfish => Box::new(SelfishVerifier),
        }
    }
}

/// Decides the vote a miner casts on a candidate block
pub trait BlockVerifier: Send {
    fn verify(&self, chain: &Blockchain, block: &Block) -> bool;
}

/// Votes according to the chain engine's block validation
pub struct HonestVerifier;

impl BlockVerifier for HonestVerifier {
    fn verify(&self, chain: &Blockchain, block: &Block) -> bool {
        match chain.validate_block(block) {
            crate::types::ValidationResult::Valid => true,
            crate::types::ValidationResult::Invalid(reason) => {
                debug!(%reason, "rejecting candidate block");
                false
            }
        }
    }
}

/// Votes no on every foreign block, without looking at it
pub struct SelfishVerifier;

impl BlockVerifier for SelfishVerifier {
    fn verify(&self, _chain: &Blockchain, _block: &Block) -> bool {
        false
    }
}
