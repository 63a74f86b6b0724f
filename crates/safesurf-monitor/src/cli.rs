use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "safesurf", version, about = "SafeSurf: site risk monitor")]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true)]
    pub config: Option<String>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run the monitoring process.
    Monitor,
    /// Run a page context that shows alerts for one destination.
    Page {
        #[arg(short, long)]
        destination: u64,
    },
    /// Report a completed navigation to a running monitor.
    Navigate {
        #[arg(short, long)]
        destination: u64,
        url: String,
    },
    /// Check a single URL once and print its status.
    Status { url: String },
    /// Check that the backend is reachable.
    Ping,
    Check {
        /// Output format: human (default) or json
        #[arg(long, default_value = "human")]
        format: String,
    },
    Version,
}
