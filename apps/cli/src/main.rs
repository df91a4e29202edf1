//! slmforge CLI: turn heterogeneous content into supervised training data.
//!
//! Runs the configured connectors, cleans and segments their output, builds
//! task-specific examples and hands them to the training step.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
