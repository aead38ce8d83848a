use clap::{Parser, Subcommand};

use gn_watch::models::DispatchMode;

#[derive(Parser)]
#[command(name = "gn-watch")]
#[command(about = "Watch a GN contract's activity and send GN transactions")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Poll the contract and print every new snapshot until Ctrl-C
    Watch,
    /// Run a single ingestion cycle and print the snapshot
    Stats,
    /// Probe every configured RPC endpoint
    Endpoints,
    /// Send one `gn` call
    Gn,
    /// Send a turbo burst (on-chain `turboGN` or a batch of `gn` calls)
    Turbo {
        #[arg(short, long)]
        count: Option<usize>,
        #[arg(short, long, value_enum)]
        mode: Option<DispatchMode>,
    },
}
