//! Coordinator: accepts miner connections, drives the mining round state
//! machine, tallies votes and broadcasts verdicts and chain updates.
//!
//! All round transitions happen under a single round lock, so observers
//! see exactly one phase at a time. Lock order is round, then chain, then
//! the miners map, then an individual connection writer.

use crate::chain::{elect, Blockchain};
use crate::constants::*;
use crate::error::{ChainError, Result};
use crate::pow::round_target;
use crate::types::{Block, Transaction};
use crate::wire::{self, CoordinatorMessage, MinerMessage};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Listen address; use port 0 for an ephemeral port
    pub addr: String,
    pub base_difficulty: u32,
    /// Whether solutions still queued when a candidate wins are dropped
    /// or kept for the next round
    pub drop_pending_on_accept: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        CoordinatorConfig {
            addr: format!("127.0.0.1:{COORDINATOR_PORT}"),
            base_difficulty: BASE_DIFFICULTY,
            drop_pending_on_accept: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Collecting,
    Voting,
}

#[derive(Debug, Clone)]
struct Candidate {
    proposer: u64,
    block: Block,
}

/// Mining round state, serialized under one mutex
struct Round {
    phase: Phase,
    queue: VecDeque<Candidate>,
    active: Option<Candidate>,
    yes: usize,
    no: usize,
    voted: HashSet<u64>,
    /// Votes still owed for concluded candidates, per miner. A vote that
    /// arrives while its sender has stale debt is discarded; connection
    /// FIFO ordering makes this exact.
    stale: HashMap<u64, u32>,
    outcome: Option<Block>,
}

impl Round {
    fn new() -> Round {
        Round {
            phase: Phase::Idle,
            queue: VecDeque::new(),
            active: None,
            yes: 0,
            no: 0,
            voted: HashSet::new(),
            stale: HashMap::new(),
            outcome: None,
        }
    }
}

struct Shared {
    config: CoordinatorConfig,
    miners: Mutex<HashMap<u64, Arc<Mutex<TcpStream>>>>,
    chain: Mutex<Blockchain>,
    keys: Mutex<BTreeMap<u64, (String, String)>>,
    round: Mutex<Round>,
    round_idle: Condvar,
    shutdown: AtomicBool,
}

pub struct Coordinator {
    shared: Arc<Shared>,
    local_addr: SocketAddr,
    acceptor: Option<JoinHandle<()>>,
}

impl Coordinator {
    /// Bind the listen socket and start accepting miners
    pub fn start(config: CoordinatorConfig) -> Result<Coordinator> {
        let listener = TcpListener::bind(&config.addr)?;
        let local_addr = listener.local_addr()?;
        let shared = Arc::new(Shared {
            config,
            miners: Mutex::new(HashMap::new()),
            chain: Mutex::new(Blockchain::new()),
            keys: Mutex::new(BTreeMap::new()),
            round: Mutex::new(Round::new()),
            round_idle: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });
        let accept_shared = Arc::clone(&shared);
        let acceptor = thread::spawn(move || accept_loop(listener, accept_shared));
        info!(%local_addr, "coordinator listening");
        Ok(Coordinator {
            shared,
            local_addr,
            acceptor: Some(acceptor),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn miner_count(&self) -> usize {
        self.shared.miners.lock().map(|m| m.len()).unwrap_or(0)
    }

    /// Copy of the coordinator's chain
    pub fn chain(&self) -> Result<Blockchain> {
        Ok(self
            .shared
            .chain
            .lock()
            .map_err(|_| ChainError::Lock("chain"))?
            .clone())
    }

    /// Keypairs acquired from miners, in connection order
    pub fn keys(&self) -> Result<Vec<(String, String)>> {
        Ok(self
            .shared
            .keys
            .lock()
            .map_err(|_| ChainError::Lock("keys"))?
            .values()
            .cloned()
            .collect())
    }

    /// Forward a user-built transaction to every miner
    pub fn submit_transaction(&self, transaction: Transaction) {
        broadcast(
            &self.shared,
            &CoordinatorMessage::Transaction { transaction },
        );
    }

    /// Ask every miner to ship its keypair
    pub fn acquire_keys(&self) {
        broadcast(&self.shared, &CoordinatorMessage::Keys);
    }

    /// Run one mining round: latch a target from the current miner count,
    /// broadcast `mine`, and block until the round returns to idle.
    /// Returns the accepted block, or `None` when no candidate reached a
    /// strict majority.
    pub fn mine(&self) -> Result<Option<Block>> {
        let miner_count = self.miner_count();
        if miner_count == 0 {
            warn!("no miners connected, nothing to mine");
            return Ok(None);
        }
        let target = round_target(miner_count, self.shared.config.base_difficulty);

        {
            let mut round = self
                .shared
                .round
                .lock()
                .map_err(|_| ChainError::Lock("round"))?;
            if round.phase != Phase::Idle {
                return Err(ChainError::RoundInProgress);
            }
            round.phase = Phase::Collecting;
            round.outcome = None;
        }

        info!(%target, miners = miner_count, "starting mining round");
        broadcast(&self.shared, &CoordinatorMessage::Mine { target });

        // Solutions retained from an earlier round go straight to a vote
        {
            let mut round = self
                .shared
                .round
                .lock()
                .map_err(|_| ChainError::Lock("round"))?;
            if round.phase == Phase::Collecting && !round.queue.is_empty() {
                next_candidate(&self.shared, &mut round);
            }
        }

        let mut round = self
            .shared
            .round
            .lock()
            .map_err(|_| ChainError::Lock("round"))?;
        while round.phase != Phase::Idle {
            round = self
                .shared
                .round_idle
                .wait(round)
                .map_err(|_| ChainError::Lock("round"))?;
        }
        Ok(round.outcome.take())
    }

    /// Validate the local chain and broadcast it; miners holding longer
    /// valid chains counter-propose and the longest one wins
    pub fn integrity(&self) -> Result<()> {
        let blocks = {
            let chain = self
                .shared
                .chain
                .lock()
                .map_err(|_| ChainError::Lock("chain"))?;
            info!(height = chain.len(), valid = chain.is_valid(), "chain integrity check");
            chain.blocks.clone()
        };
        broadcast(&self.shared, &CoordinatorMessage::Chain { blockchain: blocks });
        Ok(())
    }

    /// Broadcast a graceful shutdown and stop accepting connections
    pub fn shutdown(mut self) {
        broadcast(&self.shared, &CoordinatorMessage::CloseConnection);
        self.shared.shutdown.store(true, Ordering::Relaxed);
        // Wake the acceptor so it observes the flag
        let _ = TcpStream::connect(self.local_addr);
        if let Some(handle) = self.acceptor.take() {
            let _ = handle.join();
        }
        if let Ok(mut miners) = self.shared.miners.lock() {
            miners.clear();
        }
        info!("coordinator shut down");
    }
}

fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    let mut next_id = 0u64;
    for incoming in listener.incoming() {
        if shared.shutdown.load(Ordering::Relaxed) {
            break;
        }
        let stream = match incoming {
            Ok(stream) => stream,
            Err(err) => {
                warn!(%err, "accept failed");
                continue;
            }
        };
        let writer = match stream.try_clone() {
            Ok(clone) => Arc::new(Mutex::new(clone)),
            Err(err) => {
                warn!(%err, "could not clone connection");
                continue;
            }
        };
        next_id += 1;
        let id = next_id;

        // Join sync: bring the new miner up to the current chain
        let blocks = shared
            .chain
            .lock()
            .map(|c| c.blocks.clone())
            .unwrap_or_default();
        if !blocks.is_empty() {
            if let Ok(mut guard) = writer.lock() {
                if let Err(err) =
                    wire::write_frame(&mut *guard, &CoordinatorMessage::Chain { blockchain: blocks })
                {
                    warn!(miner = id, %err, "join sync failed");
                }
            }
        }

        if let Ok(mut miners) = shared.miners.lock() {
            miners.insert(id, Arc::clone(&writer));
        }
        info!(miner = id, "miner connected");

        let reader_shared = Arc::clone(&shared);
        thread::spawn(move || read_loop(id, stream, reader_shared));
    }
}

fn read_loop(id: u64, mut stream: TcpStream, shared: Arc<Shared>) {
    loop {
        let message: MinerMessage = match wire::read_frame(&mut stream) {
            Ok(message) => message,
            Err(err) => {
                debug!(miner = id, %err, "connection closed");
                break;
            }
        };
        match message {
            MinerMessage::Solution { block } => on_solution(&shared, id, block),
            MinerMessage::Verify { accept } => on_vote(&shared, id, accept),
            MinerMessage::Chain { blockchain } => on_miner_chain(&shared, id, blockchain),
            MinerMessage::Keys { priv_key, pub_key } => {
                if let Ok(mut keys) = shared.keys.lock() {
                    keys.insert(id, (priv_key, pub_key));
                }
                debug!(miner = id, "keypair acquired");
            }
        }
    }
    disconnect(&shared, id);
}

/// A solution is enqueued first-come-first-served; the first one in a
/// collecting round opens the vote
fn on_solution(shared: &Arc<Shared>, proposer: u64, block: Block) {
    let Ok(mut round) = shared.round.lock() else {
        return;
    };
    match round.phase {
        Phase::Idle => debug!(miner = proposer, "solution outside a round, ignoring"),
        Phase::Collecting => {
            round.queue.push_back(Candidate { proposer, block });
            info!(miner = proposer, "first solution received, opening vote");
            next_candidate(shared, &mut round);
        }
        Phase::Voting => {
            debug!(miner = proposer, "solution enqueued behind active candidate");
            round.queue.push_back(Candidate { proposer, block });
        }
    }
}

fn on_vote(shared: &Arc<Shared>, id: u64, accept: bool) {
    let Ok(mut round) = shared.round.lock() else {
        return;
    };
    if let Some(debt) = round.stale.get_mut(&id) {
        if *debt > 0 {
            *debt -= 1;
            debug!(miner = id, "discarding vote for a concluded candidate");
            return;
        }
    }
    if round.phase != Phase::Voting {
        debug!(miner = id, "vote outside voting phase, ignoring");
        return;
    }
    if !round.voted.insert(id) {
        debug!(miner = id, "duplicate vote, ignoring");
        return;
    }
    if accept {
        round.yes += 1;
    } else {
        round.no += 1;
    }
    debug!(miner = id, accept, yes = round.yes, no = round.no, "vote recorded");
    resolve(shared, &mut round);
}

/// Run the longest-valid-chain election against a miner's counter-proposal
/// and rebroadcast the winner when it replaces the local chain
fn on_miner_chain(shared: &Arc<Shared>, id: u64, blocks: Vec<Block>) {
    let adopted = {
        let Ok(mut chain) = shared.chain.lock() else {
            return;
        };
        let local = chain.blocks.clone();
        let winner = elect(&local, [blocks.as_slice()]);
        if winner == local.as_slice() {
            debug!(miner = id, "keeping the local chain");
            None
        } else if let Ok(new_chain) = Blockchain::rebuild(winner.to_vec()) {
            info!(miner = id, height = new_chain.len(), "adopting elected chain");
            *chain = new_chain;
            Some(chain.blocks.clone())
        } else {
            None
        }
    };
    if let Some(blockchain) = adopted {
        broadcast(shared, &CoordinatorMessage::Chain { blockchain });
    }
}

fn disconnect(shared: &Arc<Shared>, id: u64) {
    if let Ok(mut miners) = shared.miners.lock() {
        miners.remove(&id);
    }
    info!(miner = id, "miner disconnected");

    let Ok(mut round) = shared.round.lock() else {
        return;
    };
    round.stale.remove(&id);
    match round.phase {
        Phase::Idle => {}
        // A shrinking electorate can settle the vote
        Phase::Voting => resolve(shared, &mut round),
        Phase::Collecting => {
            if connected(shared) == 0 {
                warn!("all miners left mid-round");
                finish_round(shared, &mut round, None);
            }
        }
    }
}

fn connected(shared: &Shared) -> usize {
    shared.miners.lock().map(|m| m.len()).unwrap_or(0)
}

/// Evaluate the tally against the currently connected electorate
fn resolve(shared: &Arc<Shared>, round: &mut MutexGuard<'_, Round>) {
    if round.phase != Phase::Voting {
        return;
    }
    let electorate = connected(shared);
    if electorate == 0 {
        warn!("all miners left mid-vote");
        finish_round(shared, round, None);
        return;
    }
    let majority = electorate / 2;
    if round.yes > majority {
        conclude_accept(shared, round);
    } else if round.no >= electorate - majority || round.voted.len() >= electorate {
        conclude_reject(shared, round);
    }
}

/// Start voting on the next queued candidate: the proposer counts as an
/// implicit yes and every other miner is asked to verify
fn next_candidate(shared: &Arc<Shared>, round: &mut MutexGuard<'_, Round>) {
    let Some(candidate) = round.queue.pop_front() else {
        info!("candidate queue exhausted without consensus");
        finish_round(shared, round, None);
        return;
    };
    round.phase = Phase::Voting;
    round.yes = 1;
    round.no = 0;
    round.voted = HashSet::from([candidate.proposer]);
    debug!(proposer = candidate.proposer, "requesting votes on candidate");
    broadcast_except(
        shared,
        candidate.proposer,
        &CoordinatorMessage::Verify {
            block: candidate.block.clone(),
        },
    );
    round.active = Some(candidate);
    resolve(shared, round);
}

/// Charge stale-vote debt to every miner that was asked to verify the
/// concluded candidate but had not voted yet
fn charge_stale_votes(shared: &Shared, round: &mut Round, proposer: u64) {
    let Ok(miners) = shared.miners.lock() else {
        return;
    };
    for id in miners.keys() {
        if *id != proposer && !round.voted.contains(id) {
            *round.stale.entry(*id).or_insert(0) += 1;
        }
    }
}

fn conclude_accept(shared: &Arc<Shared>, round: &mut MutexGuard<'_, Round>) {
    let Some(candidate) = round.active.take() else {
        return;
    };
    charge_stale_votes(shared, round, candidate.proposer);
    info!(
        proposer = candidate.proposer,
        yes = round.yes,
        no = round.no,
        "candidate accepted"
    );
    broadcast(
        shared,
        &CoordinatorMessage::Verdict {
            accept: true,
            block: candidate.block.clone(),
        },
    );
    if let Ok(mut chain) = shared.chain.lock() {
        if chain.tip_hash() != crate::block::block_hash(&candidate.block) {
            chain.append_block(candidate.block.clone());
        }
    }
    if shared.config.drop_pending_on_accept {
        round.queue.clear();
    }
    finish_round(shared, round, Some(candidate.block));
}

fn conclude_reject(shared: &Arc<Shared>, round: &mut MutexGuard<'_, Round>) {
    let Some(candidate) = round.active.take() else {
        return;
    };
    charge_stale_votes(shared, round, candidate.proposer);
    info!(
        proposer = candidate.proposer,
        yes = round.yes,
        no = round.no,
        "candidate rejected"
    );
    broadcast(
        shared,
        &CoordinatorMessage::Verdict {
            accept: false,
            block: candidate.block,
        },
    );
    next_candidate(shared, round);
}

fn finish_round(shared: &Arc<Shared>, round: &mut MutexGuard<'_, Round>, outcome: Option<Block>) {
    round.phase = Phase::Idle;
    round.active = None;
    round.outcome = outcome;
    shared.round_idle.notify_all();
}

/// Send a message to every connected miner, dropping the ones whose
/// connection fails
fn broadcast(shared: &Shared, message: &CoordinatorMessage) {
    broadcast_except(shared, 0, message);
}

fn broadcast_except(shared: &Shared, skip: u64, message: &CoordinatorMessage) {
    let writers: Vec<(u64, Arc<Mutex<TcpStream>>)> = {
        let Ok(miners) = shared.miners.lock() else {
            return;
        };
        miners
            .iter()
            .filter(|(id, _)| **id != skip)
            .map(|(id, w)| (*id, Arc::clone(w)))
            .collect()
    };

    let mut failed = Vec::new();
    for (id, writer) in writers {
        let Ok(mut guard) = writer.lock() else {
            continue;
        };
        if let Err(err) = wire::write_frame(&mut *guard, message) {
            warn!(miner = id, %err, "send failed, dropping miner");
            failed.push(id);
        }
    }
    if !failed.is_empty() {
        if let Ok(mut miners) = shared.miners.lock() {
            for id in failed {
                miners.remove(&id);
            }
        }
    }
}
