//! Protocol and consensus constants shared by the coordinator and miners

/// Transaction format version accepted by validation
pub const TX_VERSION: u32 = 1;

/// Block header format version
pub const BLOCK_VERSION: u32 = 1;

/// Block reward: 3.125 BTC in satoshis
pub const BLOCK_REWARD: u64 = 312_500_000;

/// The all-zeros hash: parent of the first block and merkle root of an
/// empty transaction list
pub const ZERO_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Parent hash every participant agrees the chain starts from
pub const GENESIS_HASH: &str = ZERO_HASH;

/// Default TCP port the coordinator listens on
pub const COORDINATOR_PORT: u16 = 65432;

/// Default base difficulty fed into the round target schedule
pub const BASE_DIFFICULTY: u32 = 2;

/// Number of hashes a mining worker tries between cancel-flag checks
pub const NONCE_BATCH: u64 = 1 << 14;

/// Upper bound on a single wire frame
pub const MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

/// Mantissa used by every target the coordinator hands out
pub const TARGET_MANTISSA: &str = "ffffff";

/// Smallest target exponent the expansion accepts
pub const MIN_TARGET_EXPONENT: u8 = 3;

/// Largest target exponent the expansion accepts
pub const MAX_TARGET_EXPONENT: u8 = 32;
