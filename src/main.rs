use anyhow::Result;
use clap::{Parser, Subcommand};

mod args;
mod auth;
mod collect;
mod config;
mod gateway;
mod mutate;
mod pool;
mod progress;
mod snapshot;
mod store;
mod ui;

use crate::args::CLIArgs;
use crate::config::AppPaths;

const BANNER: &str = r"
           _     _
  __ _  __| |___| |_ ___  _ __
 / _` |/ _` / __| __/ _ \| '_ \
| (_| | (_| \__ \ || (_) | |_) |
 \__,_|\__,_|___/\__\___/| .__/
  emergency stop for SEM |_|
";

#[derive(Debug, Parser)]
#[command(
    name = "adstop",
    about = "Emergency stop for all managed Google Ads campaigns",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Only collect campaign ids
    Collect(CLIArgs<collect::CollectArgs>),
    /// Pause campaigns
    Pause(CLIArgs<mutate::PauseArgs>),
    /// Unpause campaigns
    Unpause(CLIArgs<mutate::UnpauseArgs>),
    /// Set up authentication only
    Setup(CLIArgs<auth::SetupArgs>),
    /// Organization token management
    Auth(auth::AuthArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    println!("{BANNER}");
    let paths = AppPaths::resolve()?;

    match cli.command {
        Commands::Collect(cmd) => collect::run(cmd.base, cmd.args, &paths).await?,
        Commands::Pause(cmd) => mutate::run_pause(cmd.base, cmd.args, &paths).await?,
        Commands::Unpause(cmd) => mutate::run_unpause(cmd.base, cmd.args, &paths).await?,
        Commands::Setup(_) => auth::run_setup(&paths).await?,
        Commands::Auth(args) => auth::run(args, &paths).await?,
    }

    Ok(())
}
