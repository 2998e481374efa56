//! cloudkit CLI - thin example binary over the cloud registry and facade
//!
//! Exercises the two built-in adapters end to end: logging in, listing
//! directories, and moving bytes in and out of a provider. Persistence is
//! the caller's job here exactly as it is the library's: every command
//! that needs a live session takes its `--token`/`--hint` back from a
//! prior `login`.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod connect;
mod output;

use commands::auth::AuthCommand;
use commands::cloud::CloudCommand;
use commands::completions::CompletionsCommand;
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "cloudkit", version, about = "Example client for the cloudkit provider engine")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Authenticate with a provider
    #[command(subcommand)]
    Auth(AuthCommand),
    /// List, fetch, and upload items
    #[command(subcommand)]
    Cloud(CloudCommand),
    /// Generate shell completions
    Completions(CompletionsCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    let format = if cli.json { OutputFormat::Json } else { OutputFormat::Human };

    match cli.command {
        Commands::Auth(cmd) => cmd.execute(format).await,
        Commands::Cloud(cmd) => cmd.execute(format).await,
        Commands::Completions(cmd) => cmd.execute(format).await,
    }
}
