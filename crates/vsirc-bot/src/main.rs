use anyhow::Result;
use clap::Parser;
use vsirc_bot::bootstrap_helpers::init_tracing;
use vsirc_bot::{run_bot, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    run_bot(cli.into_config()).await
}
