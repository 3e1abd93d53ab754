//! cli entrypoint for fmcsync.

mod app;

use anyhow::Result;
use clap::Parser;

/// main entrypoint for the async cli.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = app::Cli::parse();
    app::init_tracing(cli.verbose);
    app::run(cli).await
}
