//! # powchain
//!
//! An educational Bitcoin-inspired proof-of-work blockchain. A central
//! coordinator drives a round-based mining protocol over TCP: miners
//! compete on a hashcash puzzle over their transaction pools, broadcast
//! candidate solutions, vote on each other's proposals, and append the
//! consensus winner to a shared chain.
//!
//! The library splits into the chain engine (types, validation, UTXO
//! maintenance, mining) and the two protocol roles built on top of it
//! ([`coordinator::Coordinator`] and [`miner::MinerNode`]). Communication
//! is star-topology: every miner talks only to the coordinator, over
//! length-delimited JSON frames.

pub mod block;
pub mod chain;
pub mod constants;
pub mod coordinator;
pub mod crypto;
pub mod error;
pub mod mempool;
pub mod miner;
pub mod mining;
pub mod pow;
pub mod transaction;
pub mod types;
pub mod verifier;
pub mod wire;

pub use constants::*;
pub use error::{ChainError, Result};
pub use types::*;
