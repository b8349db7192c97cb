// SPDX-FileCopyrightText: 2026 SmsGate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SmsGate binary entry point.
//!
//! Runs the HTTP gateway with its consumers (`serve`), the consumers alone
//! (`consume`), or the local rate-limited mock provider (`mock-provider`).

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod serve;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Credit-billed asynchronous SMS delivery gateway.
#[derive(Parser, Debug)]
#[command(name = "smsgate", version, about)]
struct Cli {
    /// Explicit configuration file (defaults to the XDG hierarchy).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Start the HTTP gateway and the queue consumers.
    Serve,
    /// Run only the queue consumers.
    Consume,
    /// Run the local mock delivery provider.
    MockProvider,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => smsgate_config::load_and_validate_path(path),
        None => smsgate_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            smsgate_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let result = match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve::run_serve(config).await,
        Commands::Consume => serve::run_consume(config).await,
        Commands::MockProvider => serve::run_mock_provider(config).await,
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
