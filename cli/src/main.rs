//! Entry-point for the `phonepilot` binary.

use clap::Parser;
use phonepilot_cli::Cli;
use phonepilot_cli::run_main;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run_main(cli))
}
