// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Courier - one messaging layer for email, Telegram, WhatsApp and web chat.
//!
//! This is the binary entry point.

mod ingest;
mod serve;
mod shutdown;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use courier_config::CourierConfig;
use courier_core::{CourierError, Store};
use courier_storage::SqliteStore;

/// Courier - one messaging layer for email, Telegram, WhatsApp and web chat.
#[derive(Parser, Debug)]
#[command(name = "courier", version, about, long_about = None)]
struct Cli {
    /// Configuration file. Defaults to the standard search locations.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Listen on every active channel until interrupted.
    Serve,
    /// Store a raw `.eml` file as if it arrived on an email channel.
    Ingest {
        /// Id of the receiving email channel.
        #[arg(long)]
        channel: String,
        /// Path to the RFC 5322 message.
        file: PathBuf,
    },
    /// Validate the configuration and exit.
    CheckConfig,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match courier_config::load_and_validate(cli.config.as_deref()) {
        Ok(config) => config,
        Err(errors) => {
            courier_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(cli.command, config).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(command: Commands, config: CourierConfig) -> Result<(), CourierError> {
    match command {
        Commands::Serve => {
            init_tracing(&config.log.level);
            serve::run_serve(config).await
        }
        Commands::Ingest { channel, file } => {
            init_tracing(&config.log.level);
            let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&config.storage).await?);
            let message = ingest::ingest_file(&config, store, &channel, &file).await?;
            println!("{}", message.id);
            Ok(())
        }
        Commands::CheckConfig => {
            println!("{}", config_summary(&config));
            Ok(())
        }
    }
}

/// `RUST_LOG` wins over the configured level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("courier={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

fn config_summary(config: &CourierConfig) -> String {
    let mut out = format!(
        "configuration ok: {} channel(s), database {}",
        config.channels.len(),
        config.storage.database_path
    );
    for channel in &config.channels {
        let state = if channel.active { "active" } else { "inactive" };
        out.push_str(&format!("\n  {} ({}, {state})", channel.id, channel.platform));
    }
    out
}
