//! Miner node: holds a chain copy, a UTXO set, a wallet and a transaction
//! pool, and reacts to the coordinator's messages

use crate::block::header_hash;
use crate::chain::{elect, Blockchain};
use crate::crypto::Keypair;
use crate::error::{ChainError, Result};
use crate::mempool::TxPool;
use crate::mining::MiningWorker;
use crate::transaction::{is_coinbase, tx_id, validate_transaction};
use crate::types::*;
use crate::verifier::{BlockVerifier, Strategy};
use crate::wire::{self, CoordinatorMessage, MinerMessage};
use std::io::ErrorKind;
use std::net::TcpStream;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct MinerConfig {
    /// Coordinator address, e.g. `127.0.0.1:65432`
    pub addr: String,
    pub strategy: Strategy,
}

/// Everything a miner mutates, guarded by one mutex
#[derive(Debug, Default)]
pub struct MinerState {
    pub chain: Blockchain,
    pub pool: TxPool,
    pub worker: Option<MiningWorker>,
}

pub struct MinerNode {
    keypair: Keypair,
    verifier: Box<dyn BlockVerifier>,
    state: Arc<Mutex<MinerState>>,
    reader: TcpStream,
    writer: Arc<Mutex<TcpStream>>,
}

impl MinerNode {
    /// Connect to the coordinator with a freshly generated wallet
    pub fn connect(config: &MinerConfig) -> Result<MinerNode> {
        let reader = TcpStream::connect(&config.addr)?;
        let writer = Arc::new(Mutex::new(reader.try_clone()?));
        let keypair = Keypair::generate();
        info!(addr = %config.addr, keyhash = %keypair.keyhash(), "connected to coordinator");
        Ok(MinerNode {
            keypair,
            verifier: config.strategy.verifier(),
            state: Arc::new(Mutex::new(MinerState::default())),
            reader,
            writer,
        })
    }

    /// Shared handle onto the node's chain, pool and worker
    pub fn state(&self) -> Arc<Mutex<MinerState>> {
        Arc::clone(&self.state)
    }

    pub fn keyhash(&self) -> String {
        self.keypair.keyhash()
    }

    fn send(&self, message: &MinerMessage) -> Result<()> {
        let mut guard = self.writer.lock().map_err(|_| ChainError::Lock("writer"))?;
        wire::write_frame(&mut *guard, message)
    }

    fn lock_state(&self) -> Result<std::sync::MutexGuard<'_, MinerState>> {
        self.state.lock().map_err(|_| ChainError::Lock("state"))
    }

    /// Handle coordinator messages until the connection closes or the
    /// coordinator says goodbye, then tear the worker down
    pub fn run(mut self) -> Result<()> {
        loop {
            let message: CoordinatorMessage = match wire::read_frame(&mut self.reader) {
                Ok(message) => message,
                Err(ChainError::Io(err)) if err.kind() == ErrorKind::UnexpectedEof => {
                    info!("coordinator closed the connection");
                    break;
                }
                Err(err) => {
                    warn!(%err, "dropping connection");
                    break;
                }
            };

            match message {
                CoordinatorMessage::Transaction { transaction } => self.on_transaction(transaction)?,
                CoordinatorMessage::Mine { target } => self.on_mine(target)?,
                CoordinatorMessage::Verify { block } => self.on_verify(block)?,
                CoordinatorMessage::Verdict { accept, block } => self.on_verdict(accept, block)?,
                CoordinatorMessage::Chain { blockchain } => self.on_chain(blockchain)?,
                CoordinatorMessage::Keys => self.on_keys()?,
                CoordinatorMessage::CloseConnection => {
                    info!("coordinator requested shutdown");
                    break;
                }
            }
        }

        let worker = self.lock_state()?.worker.take();
        if let Some(worker) = worker {
            worker.stop();
        }
        Ok(())
    }

    /// Admit a forwarded transaction to the pool if it validates against
    /// the local UTXO set; drop it silently otherwise
    fn on_transaction(&self, tx: Transaction) -> Result<()> {
        let mut state = self.lock_state()?;
        if is_coinbase(&tx) {
            debug!("dropping coinbase-shaped transaction");
            return Ok(());
        }
        match validate_transaction(&tx, &state.chain.utxo) {
            (ValidationResult::Valid, fee) => {
                let id = tx_id(&tx);
                if state.pool.insert(id.clone(), tx, fee) {
                    debug!(%id, fee, "transaction admitted to pool");
                } else {
                    debug!(%id, "transaction already pooled");
                }
            }
            (ValidationResult::Invalid(reason), _) => {
                debug!(%reason, "dropping invalid transaction");
            }
        }
        Ok(())
    }

    /// Start a mining worker over a pool snapshot; ignored when one is
    /// already running
    fn on_mine(&self, target: String) -> Result<()> {
        let mut state = self.lock_state()?;
        if state.worker.as_ref().is_some_and(|w| !w.is_finished()) {
            debug!("mining worker already running, ignoring mine command");
            return Ok(());
        }
        debug!(%target, pool = state.pool.len(), "starting mining worker");
        let entries = state.pool.snapshot();
        let parent = state.chain.tip_hash();
        state.worker = Some(MiningWorker::spawn(
            entries,
            self.keypair.keyhash(),
            parent,
            target,
            Arc::clone(&self.writer),
        ));
        Ok(())
    }

    /// Vote on a candidate block according to the configured strategy
    fn on_verify(&self, block: Block) -> Result<()> {
        let accept = {
            let state = self.lock_state()?;
            self.verifier.verify(&state.chain, &block)
        };
        debug!(accept, "voting on candidate block");
        self.send(&MinerMessage::Verify { accept })
    }

    /// Apply an accepted round outcome: append the block, clear consumed
    /// pool entries, then cancel and discard the worker. A rejection is
    /// ignored; an in-flight worker keeps mining and the coordinator may
    /// issue a fresh `mine` later.
    fn on_verdict(&self, accept: bool, block: Block) -> Result<()> {
        if !accept {
            debug!("round verdict: candidate rejected");
            return Ok(());
        }
        let worker = {
            let mut state = self.lock_state()?;
            let hash = header_hash(&block.header);
            if state.chain.tip_hash() == hash {
                debug!(%hash, "verdict block already at tip");
            } else {
                let ids = state.chain.append_block(block);
                state.pool.remove_ids(&ids);
                info!(%hash, height = state.chain.len(), "block appended to chain");
            }
            state.worker.take()
        };
        if let Some(worker) = worker {
            worker.stop();
        }
        Ok(())
    }

    /// Run the longest-valid-chain election against the incoming
    /// candidate and install the winner; when the local chain holds and
    /// is strictly longer and valid, counter-propose it
    fn on_chain(&self, blocks: Vec<Block>) -> Result<()> {
        let counter = {
            let mut state = self.lock_state()?;
            let local = state.chain.blocks.clone();
            let winner = elect(&local, [blocks.as_slice()]);
            if winner != local.as_slice() {
                if let Ok(new_chain) = Blockchain::rebuild(winner.to_vec()) {
                    info!(height = new_chain.len(), "installing elected chain");
                    state.chain = new_chain;
                    let MinerState { chain, pool, .. } = &mut *state;
                    pool.refilter(&chain.utxo);
                }
                None
            } else if local.len() > blocks.len() && state.chain.is_valid() {
                debug!(height = local.len(), "countering with longer local chain");
                Some(local)
            } else {
                debug!("keeping the local chain");
                None
            }
        };
        if let Some(blockchain) = counter {
            self.send(&MinerMessage::Chain { blockchain })?;
        }
        Ok(())
    }

    fn on_keys(&self) -> Result<()> {
        self.send(&MinerMessage::Keys {
            priv_key: self.keypair.secret_hex(),
            pub_key: self.keypair.public_hex(),
        })
    }
}
