//! Coordinator process: listens for miners and takes round commands from
//! standard input. The full interactive interface (transaction creator,
//! chain viewer) lives outside this binary.

use clap::Parser;
use powchain::block::block_hash;
use powchain::coordinator::{Coordinator, CoordinatorConfig};
use std::io::BufRead;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(about = "Proof-of-work blockchain coordinator")]
struct Args {
    /// Port to listen on
    #[arg(long, default_value_t = powchain::COORDINATOR_PORT)]
    port: u16,

    /// Base difficulty fed into the round target schedule
    #[arg(long, default_value_t = powchain::BASE_DIFFICULTY)]
    base_difficulty: u32,
}

fn main() -> powchain::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let coordinator = Coordinator::start(CoordinatorConfig {
        addr: format!("127.0.0.1:{}", args.port),
        base_difficulty: args.base_difficulty,
        ..CoordinatorConfig::default()
    })?;

    println!("coordinator listening on {}", coordinator.local_addr());
    println!("commands: mine, integrity, keys, chain, exit");

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        match line.trim() {
            "mine" => match coordinator.mine() {
                Ok(Some(block)) => println!("block accepted: {}", block_hash(&block)),
                Ok(None) => println!("no block mined this round"),
                Err(err) => eprintln!("mine failed: {err}"),
            },
            "integrity" => {
                if let Err(err) = coordinator.integrity() {
                    eprintln!("integrity failed: {err}");
                }
            }
            "keys" => {
                coordinator.acquire_keys();
                println!("requested keypairs from {} miners", coordinator.miner_count());
            }
            "chain" => match coordinator.chain() {
                Ok(chain) => println!("chain height: {}, tip: {}", chain.len(), chain.tip_hash()),
                Err(err) => eprintln!("chain unavailable: {err}"),
            },
            "exit" => break,
            "" => {}
            other => println!("unknown command {other:?}; try mine, integrity, keys, chain, exit"),
        }
    }

    coordinator.shutdown();
    Ok(())
}
