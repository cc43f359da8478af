// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use bridge_core::domain::node_config::BridgeNodeConfig;

pub const MINIMAL_TEMPLATE: &str = include_str!("../../templates/config-minimal.yaml");
pub const EXAMPLES_TEMPLATE: &str = include_str!("../../templates/config-with-examples.yaml");

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./bridge-config.yaml)
        #[arg(short, long, default_value = "./bridge-config.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(output, examples).await,
    }
}

fn or_unset(value: Option<&str>) -> String {
    value.map(str::to_string).unwrap_or_else(|| "(not set)".dimmed().to_string())
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = BridgeNodeConfig::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        match &config_override {
            Some(path) => println!("  1. --config flag: {}", path.display()),
            None => println!("  1. --config flag: {}", "(not set)".dimmed()),
        }
        println!(
            "  2. BRIDGE_CONFIG_PATH: {}",
            or_unset(std::env::var("BRIDGE_CONFIG_PATH").ok().as_deref())
        );
        println!("  3. ./bridge-config.yaml");
        println!("  4. ~/.storage-bridge/config.yaml");
        println!("  5. /etc/storage-bridge/config.yaml");
        println!();
    }

    let spec = &config.spec;
    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Node:".bold());
    println!("  Name: {}", config.metadata.name);
    println!("  API: {}:{}", spec.network.bind_address, spec.network.port);
    println!();

    println!("{}", "Storage:".bold());
    println!("  Backend: {:?}", spec.storage.backend);
    // Connection strings may carry credentials
    println!(
        "  URL: {}",
        if spec.storage.url.is_some() { "(set)".to_string() } else { or_unset(None) }
    );
    println!();

    println!("{}", "Bridges:".bold());
    println!("  Namespace parent: {}", spec.bridge.namespace_parent);
    println!("  Image: {}", spec.bridge.image);
    println!("  Storage URL: {}", or_unset(spec.bridge.storage_url.as_deref()));
    println!("  Network: {}", or_unset(spec.bridge.network.as_deref()));
    println!();

    println!("{}", "Key issuer:".bold());
    match &spec.cloudapi {
        Some(cloudapi) => {
            println!("  URL: {}", cloudapi.url);
            println!("  Account: {}", cloudapi.account);
            println!("  Key: {} ({})", cloudapi.key_id, cloudapi.key_path);
        }
        None => println!("  {}", "(not configured)".yellow()),
    }
    println!();

    println!("{}", "DNS:".bold());
    match &spec.cloudflare {
        Some(cloudflare) => {
            println!("  Zone: {}", cloudflare.zone_id);
            println!("  API: {}", cloudflare.api_url);
            println!("  TTL: {}", spec.bridge.dns_ttl);
        }
        None => println!("  {}", "(disabled)".dimmed()),
    }
    println!();

    println!("{}", "Accounts:".bold());
    println!("  Allowed: {}", spec.accounts.allowed.len());
    println!("  Admins: {}", spec.accounts.admins.len());
    println!();

    println!("{}", "Jobs:".bold());
    println!(
        "  Attempts: {} (backoff {}ms..{}ms)",
        spec.jobs.max_attempts, spec.jobs.initial_backoff_ms, spec.jobs.max_backoff_ms
    );
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config =
        BridgeNodeConfig::load_or_default(config_path).context("Failed to load configuration")?;

    config.validate().context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    let sample = if with_examples { EXAMPLES_TEMPLATE } else { MINIMAL_TEMPLATE };

    std::fs::write(&output, sample)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!("{}", format!("✓ Configuration generated: {}", output.display()).green());

    Ok(())
}
