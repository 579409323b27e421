//! Miner process: connects to the coordinator and mines until told to
//! disconnect. `--selfish` switches the vote strategy.

use clap::Parser;
use powchain::miner::{MinerConfig, MinerNode};
use powchain::verifier::Strategy;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(about = "Proof-of-work blockchain miner")]
struct Args {
    /// Coordinator address
    #[arg(long, default_value_t = format!("127.0.0.1:{}", powchain::COORDINATOR_PORT))]
    addr: String,

    /// Vote no on every foreign block
    #[arg(long)]
    selfish: bool,
}

fn main() -> powchain::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let strategy = if args.selfish {
        Strategy::Selfish
    } else {
        Strategy::Honest
    };

    let node = MinerNode::connect(&MinerConfig {
        addr: args.addr,
        strategy,
    })?;
    node.run()
}
