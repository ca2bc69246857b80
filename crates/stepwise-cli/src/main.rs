//! Stepwise CLI: the `stepwise` binary.
//!
//! Drives the workflow engine over a local SQLite database in the data
//! directory (`~/.stepwise/` unless overridden).

mod cli;
mod state;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info,stepwise=debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let state = AppState::init(cli.data_dir.clone()).await?;

    match cli.command {
        Commands::Template { command } => {
            cli::template::handle_template_command(command, &state, cli.json).await?;
        }
        Commands::Workflow { command } => {
            cli::workflow::handle_workflow_command(command, &state, cli.json).await?;
        }
        Commands::Checkpoint { command } => {
            cli::checkpoint::handle_checkpoint_command(command, &state, cli.json).await?;
        }
    }

    Ok(())
}
