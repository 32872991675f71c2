use anyhow::Result;
use clap::Parser;
use saldos::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.init_logging();
    cli.run().await
}
