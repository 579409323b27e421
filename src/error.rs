//! Error types for the chain engine and the wire protocol

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("invalid block: {0}")]
    InvalidBlock(String),

    #[error("invalid chain: {0}")]
    InvalidChain(String),

    #[error("no consensus reached this round")]
    ConsensusFailure,

    #[error("a mining round is already in progress")]
    RoundInProgress,

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("poisoned lock: {0}")]
    Lock(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoding error: {0}")]
    Codec(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ChainError>;
