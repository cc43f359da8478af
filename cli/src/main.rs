// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # storage-bridge
//!
//! API server for storage bridges.
//!
//! ## Commands
//!
//! - `storage-bridge serve` - Run the HTTP API and the background job runner
//! - `storage-bridge config show|validate|generate` - Configuration management

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use bridge_core::domain::node_config::BridgeNodeConfig;
use storage_bridge::commands::{self, ConfigCommand, ServeArgs};
use storage_bridge::logging::init_logging;

/// storage-bridge - Provision and manage storage bridges
#[derive(Parser)]
#[command(name = "storage-bridge")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "BRIDGE_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); defaults to the configured level
    #[arg(long, global = true, env = "BRIDGE_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the API server
    #[command(name = "serve")]
    Serve(ServeArgs),

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve(args)) => {
            let config = BridgeNodeConfig::load_or_default(cli.config)?;
            let logging = &config.spec.observability.logging;
            init_logging(cli.log_level.as_deref().unwrap_or(&logging.level), &logging.format)?;
            commands::serve::run(config, args).await
        }
        Some(Commands::Config { command }) => {
            init_logging(cli.log_level.as_deref().unwrap_or("warn"), "text")?;
            commands::config::handle_command(command, cli.config).await
        }
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}
