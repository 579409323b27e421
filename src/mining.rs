//! Candidate assembly and the cancelable mining worker

use crate::block::{header_hash_bytes, merkle_root};
use crate::constants::*;
use crate::error::Result;
use crate::mempool::PoolEntry;
use crate::pow::expand_target;
use crate::transaction::coinbase;
use crate::types::*;
use crate::wire::{self, MinerMessage};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

fn unix_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Assemble an unsolved candidate block: the coinbase paying reward plus
/// pooled fees comes first, then every pool entry in insertion order
pub fn assemble_candidate(
    entries: &[PoolEntry],
    miner_keyhash: &str,
    parent_hash: &str,
    target: &str,
) -> Block {
    let reward = BLOCK_REWARD + entries.iter().map(|e| e.fee).sum::<u64>();
    let mut transactions = vec![coinbase(reward, miner_keyhash.to_string())];
    transactions.extend(entries.iter().map(|e| e.tx.clone()));

    let header = BlockHeader {
        version: BLOCK_VERSION,
        parent_hash: parent_hash.to_string(),
        merkle_root: merkle_root(&transactions),
        time: unix_time(),
        target: target.to_string(),
        nonce: 0,
    };
    Block {
        header,
        transactions,
    }
}

/// Iterate the nonce until the header hash meets its target, checking the
/// cancel flag once per batch and re-stamping the time when the nonce
/// wraps around. Returns false when canceled.
pub fn solve(block: &mut Block, cancel: &AtomicBool) -> Result<bool> {
    let bound = expand_target(&block.header.target)?;
    loop {
        for _ in 0..NONCE_BATCH {
            if header_hash_bytes(&block.header) <= bound {
                return Ok(true);
            }
            block.header.nonce = block.header.nonce.wrapping_add(1);
            if block.header.nonce == 0 {
                block.header.time = unix_time();
                if cancel.load(Ordering::Relaxed) {
                    return Ok(false);
                }
            }
        }
        if cancel.load(Ordering::Relaxed) {
            return Ok(false);
        }
    }
}

/// Handle to the mining thread a miner spawns per `mine` command
#[derive(Debug)]
pub struct MiningWorker {
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl MiningWorker {
    /// Start mining over a pool snapshot; on success the solution is sent
    /// to the coordinator through the shared connection writer
    pub fn spawn(
        entries: Vec<PoolEntry>,
        miner_keyhash: String,
        parent_hash: String,
        target: String,
        writer: Arc<Mutex<TcpStream>>,
    ) -> MiningWorker {
        let cancel = Arc::new(AtomicBool::new(false));
        let cancel_flag = Arc::clone(&cancel);
        let handle = thread::spawn(move || {
            let mut block = assemble_candidate(&entries, &miner_keyhash, &parent_hash, &target);
            match solve(&mut block, &cancel_flag) {
                Ok(true) => {
                    debug!(
                        nonce = block.header.nonce,
                        "solution found, announcing to coordinator"
                    );
                    let Ok(mut guard) = writer.lock() else {
                        return;
                    };
                    if let Err(err) =
                        wire::write_frame(&mut *guard, &MinerMessage::Solution { block })
                    {
                        warn!(%err, "failed to announce solution");
                    }
                }
                Ok(false) => debug!("mining canceled"),
                Err(err) => warn!(%err, "mining aborted"),
            }
        });
        MiningWorker { cancel, handle }
    }

    /// Signal the worker to stop at its next cancel check
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancel and wait for the thread to exit
    pub fn stop(self) {
        self.cancel();
        let _ = self.handle.join();
    }
}
