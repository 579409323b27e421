//! Length-delimited JSON framing and the typed protocol messages

use crate::constants::MAX_FRAME_BYTES;
use crate::error::{ChainError, Result};
use crate::types::{Block, Transaction};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// Messages the coordinator sends to miners
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoordinatorMessage {
    /// Forward a user-built transaction for pool admission
    Transaction { transaction: Transaction },
    /// Start a mining round against the latched target
    Mine { target: String },
    /// Request a vote on a candidate block
    Verify { block: Block },
    /// Round outcome for the voted candidate
    Verdict { accept: bool, block: Block },
    /// Install a chain (join sync or integrity broadcast)
    Chain { blockchain: Vec<Block> },
    /// Request the miner's keypair
    Keys,
    /// Graceful shutdown
    CloseConnection,
}

/// Messages miners send to the coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MinerMessage {
    /// Announce a solved candidate block
    Solution { block: Block },
    /// Vote reply for the candidate under vote
    Verify { accept: bool },
    /// Counter-propose the local chain
    Chain { blockchain: Vec<Block> },
    /// Ship the keypair to the coordinator (educational only)
    Keys {
        #[serde(rename = "priv")]
        priv_key: String,
        #[serde(rename = "pub")]
        pub_key: String,
    },
}

/// Write one message as a 4-byte big-endian length followed by its JSON
pub fn write_frame<W: Write, M: Serialize>(writer: &mut W, message: &M) -> Result<()> {
    let data = serde_json::to_vec(message)?;
    let len = data.len() as u32;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(&data)?;
    writer.flush()?;
    Ok(())
}

/// Read one length-delimited message
pub fn read_frame<R: Read, M: DeserializeOwned>(reader: &mut R) -> Result<M> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len == 0 || len > MAX_FRAME_BYTES {
        return Err(ChainError::MalformedMessage(format!(
            "frame length {len} out of bounds"
        )));
    }
    let mut data = vec![0u8; len];
    reader.read_exact(&mut data)?;
    serde_json::from_slice(&data).map_err(|e| ChainError::MalformedMessage(e.to_string()))
}
