//! Hashcash target handling and the round difficulty schedule
//!
//! A target travels as an eight-hex-digit string: two digits of exponent
//! followed by six of mantissa. Its numeric value is
//! `mantissa * 256^(exponent - 3)`, and a header satisfies the puzzle when
//! its hash, read as a 256-bit big-endian integer, is at most that value.

use crate::constants::*;
use crate::error::{ChainError, Result};

/// Expand a compact target string into a 32-byte big-endian bound
pub fn expand_target(target: &str) -> Result<[u8; 32]> {
    if target.len() != 8 || !target.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ChainError::InvalidBlock(format!(
            "malformed target {target:?}"
        )));
    }
    let exponent = u8::from_str_radix(&target[..2], 16)
        .map_err(|e| ChainError::InvalidBlock(format!("malformed target exponent: {e}")))?;
    let mantissa = u32::from_str_radix(&target[2..], 16)
        .map_err(|e| ChainError::InvalidBlock(format!("malformed target mantissa: {e}")))?;

    if !(MIN_TARGET_EXPONENT..=MAX_TARGET_EXPONENT).contains(&exponent) {
        return Err(ChainError::InvalidBlock(format!(
            "target exponent {exponent} out of range"
        )));
    }

    // The three mantissa bytes sit so the most significant lands at
    // byte 32 - exponent of the big-endian bound.
    let mut bound = [0u8; 32];
    let bytes = mantissa.to_be_bytes();
    let msb = (32 - exponent) as usize;
    bound[msb] = bytes[1];
    bound[msb + 1] = bytes[2];
    bound[msb + 2] = bytes[3];
    Ok(bound)
}

/// Check a lowercase-hex header hash against a compact target
pub fn meets_target(hash: &str, target: &str) -> Result<bool> {
    let bound = expand_target(target)?;
    let bytes = hex::decode(hash)
        .map_err(|e| ChainError::InvalidBlock(format!("malformed header hash: {e}")))?;
    let hash_bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| ChainError::InvalidBlock("header hash is not 32 bytes".to_string()))?;
    Ok(hash_bytes <= bound)
}

/// Target for the next round given the number of connected miners.
///
/// More miners means a smaller exponent and a harder puzzle:
/// `exponent = 32 - (base + floor(log4(miners + 1)))`, mantissa fixed.
/// The same string is latched by the coordinator for the whole round.
pub fn round_target(miners: usize, base_difficulty: u32) -> String {
    let scale = (miners as u32 + 1).ilog(4);
    let exponent = 32u32
        .saturating_sub(base_difficulty + scale)
        .max(MIN_TARGET_EXPONENT as u32);
    format!("{exponent:02x}{TARGET_MANTISSA}")
}
