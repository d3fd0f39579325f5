//! Relay CLI application
//!
//! Routes prompts across the configured LLM providers, picking the most
//! reliable model and falling back on failure.
//!
//! # Installation
//!
//! ```bash
//! cargo install --path crates/relay-cli
//! ```
//!
//! Providers and models come from `relay.toml` (see `relay.example.toml`);
//! credentials are read from the environment variable named by each
//! provider's `api_key_env`.

mod app;
mod args;
mod commands;
mod router;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use args::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG takes precedence; --verbose raises the fallback level
    let fallback = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    router::route(cli).await
}
