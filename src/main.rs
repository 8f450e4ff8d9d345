mod artwork;
mod cli;
mod client;
mod config;
mod daemon;
mod models;
mod reconciler;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{App, Cli, Commands};
use models::TransportCommand;

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let app = App::new(cli.config.as_deref(), cli.base_url)?;

    // Host media integrations (MPRIS) are not Send, so everything runs on one
    // thread inside a LocalSet; network requests are still concurrent tasks.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let local = tokio::task::LocalSet::new();

    local.block_on(&runtime, async move {
        match cli.command.unwrap_or(Commands::Run) {
            Commands::Run => app.run().await,
            Commands::Status => app.status().await,
            Commands::PlayPause => app.transport(TransportCommand::PlayPause).await,
            Commands::Play { uri: Some(uri) } => app.play(&uri).await,
            Commands::Play { uri: None } => app.transport(TransportCommand::Resume).await,
            Commands::Pause => app.transport(TransportCommand::Pause).await,
            Commands::Next => app.transport(TransportCommand::Next).await,
            Commands::Previous => app.transport(TransportCommand::Prev).await,
            Commands::Seek { position } => app.seek(&position).await,
            Commands::Shuffle => app.shuffle().await,
            Commands::Queue { uri } => app.queue(&uri).await,
            Commands::Volume { level } => app.volume(level).await,
        }
    })
}
