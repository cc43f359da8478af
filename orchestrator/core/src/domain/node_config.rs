// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Node Configuration Types
//
// Kubernetes-style manifest (apiVersion/kind/metadata/spec) describing one
// bridge orchestrator node:
// - persistence backend
// - bridge defaults (namespace parent, image, storage url)
// - the container runtime, key issuer and DNS provider endpoints
// - the account allow-list
// - background job retry policy
// - network and observability settings

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::account::parse_account_list;
use crate::domain::bridge::AccountId;
use crate::domain::job::RetryPolicy;
use crate::domain::repository::{PostgresConfig, StorageBackend};

pub const API_VERSION: &str = "storage-bridge/v1";
pub const KIND: &str = "BridgeNodeConfig";

/// Top-level node configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeNodeConfig {
    /// API version (must be "storage-bridge/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "BridgeNodeConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: BridgeNodeSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeNodeSpec {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub bridge: BridgeSettings,

    #[serde(default)]
    pub docker: DockerConfig,

    /// Key issuer endpoint; required to serve
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloudapi: Option<CloudApiConfig>,

    /// DNS provider; DNS steps are skipped when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloudflare: Option<CloudflareConfig>,

    #[serde(default)]
    pub accounts: AccountsConfig,

    #[serde(default)]
    pub jobs: JobsConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendKind {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackendKind,

    /// Postgres connection string
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackendKind::Memory,
            url: None,
            max_connections: default_max_connections(),
        }
    }
}

impl StorageConfig {
    pub fn to_backend(&self) -> anyhow::Result<StorageBackend> {
        match self.backend {
            StorageBackendKind::Memory => Ok(StorageBackend::InMemory),
            StorageBackendKind::Postgres => {
                let url = self
                    .url
                    .clone()
                    .ok_or_else(|| {
                        anyhow::anyhow!("spec.storage.url is required for the postgres backend")
                    })?;
                Ok(StorageBackend::PostgreSQL(PostgresConfig {
                    connection_string: url,
                    max_connections: self.max_connections,
                }))
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeSettings {
    /// Parent zone every bridge namespace is created under
    #[serde(default = "default_namespace_parent")]
    pub namespace_parent: String,

    /// Gateway image both containers run
    #[serde(default = "default_image")]
    pub image: String,

    /// Storage endpoint handed to the gateway containers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_url: Option<String>,

    /// Docker network to attach the containers to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,

    #[serde(default = "default_dns_ttl")]
    pub dns_ttl: u32,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            namespace_parent: default_namespace_parent(),
            image: default_image(),
            storage_url: None,
            network: None,
            dns_ttl: default_dns_ttl(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DockerConfig {
    /// Default: local socket
    #[serde(skip_serializing_if = "Option::is_none")]
    pub socket_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudApiConfig {
    pub url: String,

    /// Login of the account the signing key belongs to
    pub account: String,

    /// Fingerprint of the signing key
    pub key_id: String,

    /// PEM-encoded RSA private key used to sign requests
    pub key_path: String,

    /// Optional X-Auth-Token forwarded with every request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudflareConfig {
    pub zone_id: String,

    pub api_token: String,

    #[serde(default = "default_cloudflare_url")]
    pub api_url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountsConfig {
    /// Accounts seeded at startup. Accepts a comma-separated string or a list.
    #[serde(default, deserialize_with = "deserialize_account_list")]
    pub allowed: Vec<String>,

    /// Subset seeded with `is_admin`
    #[serde(default, deserialize_with = "deserialize_account_list")]
    pub admins: Vec<String>,
}

impl AccountsConfig {
    /// Every seeded account with its admin flag. Admins are implicitly allowed.
    pub fn seed(&self) -> Vec<(AccountId, bool)> {
        let mut seeded: Vec<(AccountId, bool)> = Vec::new();
        for id in self.allowed.iter().chain(self.admins.iter()) {
            let account = AccountId::new(id.as_str());
            if seeded.iter().any(|(a, _)| a == &account) {
                continue;
            }
            let is_admin = self.admins.iter().any(|a| a == id);
            seeded.push((account, is_admin));
        }
        seeded
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AccountListValue {
    List(Vec<String>),
    Csv(String),
}

fn deserialize_account_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<AccountListValue>::deserialize(deserializer)?;
    Ok(match value {
        None => Vec::new(),
        Some(AccountListValue::List(list)) => list
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Some(AccountListValue::Csv(csv)) => {
            parse_account_list(&csv).into_iter().map(|a| a.0).collect()
        }
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl JobsConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Network bind address (e.g. "0.0.0.0" or "127.0.0.1")
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// HTTP API port
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_api_port(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("json" or "text")
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Prometheus exporter port
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

// Default value functions
fn default_max_connections() -> u32 {
    5
}

fn default_namespace_parent() -> String {
    "bridge.localhost".to_string()
}

fn default_image() -> String {
    "storage-bridge/gateway:latest".to_string()
}

fn default_dns_ttl() -> u32 {
    120
}

fn default_cloudflare_url() -> String {
    "https://api.cloudflare.com/client/v4".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    1000
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for BridgeNodeConfig {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "bridge-node".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname,
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: BridgeNodeSpec::default(),
        }
    }
}

impl BridgeNodeConfig {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. BRIDGE_CONFIG_PATH environment variable
    /// 2. ./bridge-config.yaml (working directory)
    /// 3. ~/.storage-bridge/config.yaml (user home)
    /// 4. /etc/storage-bridge/config.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("BRIDGE_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./bridge-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".storage-bridge").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/storage-bridge/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path fails if missing/invalid
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Same as [`Self::apply_env_overrides`] with an explicit variable source.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = var("DATABASE_URL") {
            tracing::info!("Environment override: DATABASE_URL (postgres backend)");
            self.spec.storage.backend = StorageBackendKind::Postgres;
            self.spec.storage.url = Some(url);
        }

        if let Some(parent) = var("ARECORD_PARENT") {
            tracing::info!("Environment override: ARECORD_PARENT={}", parent);
            self.spec.bridge.namespace_parent = parent;
        }

        let sdc = ["SDC_URL", "SDC_ACCOUNT", "SDC_KEY_ID", "SDC_KEY_PATH"].map(|k| var(k));
        if sdc.iter().any(Option::is_some) {
            let [url, account, key_id, key_path] = sdc;
            let cloudapi = self.spec.cloudapi.get_or_insert_with(|| CloudApiConfig {
                url: String::new(),
                account: String::new(),
                key_id: String::new(),
                key_path: String::new(),
                token: None,
            });
            if let Some(url) = url {
                cloudapi.url = url;
            }
            if let Some(account) = account {
                cloudapi.account = account;
            }
            if let Some(key_id) = key_id {
                cloudapi.key_id = key_id;
            }
            if let Some(key_path) = key_path {
                cloudapi.key_path = key_path;
            }
            tracing::info!("Environment override: SDC_* (cloudapi)");
        }

        let zone = var("CF_ZONEID");
        let token = var("CF_API_TOKEN");
        if zone.is_some() || token.is_some() {
            let cloudflare = self.spec.cloudflare.get_or_insert_with(|| CloudflareConfig {
                zone_id: String::new(),
                api_token: String::new(),
                api_url: default_cloudflare_url(),
            });
            if let Some(zone) = zone {
                cloudflare.zone_id = zone;
            }
            if let Some(token) = token {
                cloudflare.api_token = token;
            }
            tracing::info!("Environment override: CF_* (cloudflare)");
        }

        if let Some(accounts) = var("BRIDGE_ACCOUNTS") {
            self.spec.accounts.allowed =
                parse_account_list(&accounts).into_iter().map(|a| a.0).collect();
        }
        if let Some(admins) = var("BRIDGE_ADMINS") {
            self.spec.accounts.admins =
                parse_account_list(&admins).into_iter().map(|a| a.0).collect();
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!("Invalid apiVersion: '{}'. Must be '{}'", self.api_version, API_VERSION);
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        if self.spec.bridge.namespace_parent.trim_start_matches('.').is_empty() {
            anyhow::bail!("spec.bridge.namespace_parent cannot be empty");
        }

        if self.spec.storage.backend == StorageBackendKind::Postgres
            && self.spec.storage.url.as_deref().map_or(true, str::is_empty)
        {
            anyhow::bail!("spec.storage.url is required for the postgres backend");
        }

        if self.spec.jobs.max_attempts == 0 {
            anyhow::bail!("spec.jobs.max_attempts must be at least 1");
        }

        if let Some(cloudflare) = &self.spec.cloudflare {
            if cloudflare.zone_id.is_empty() {
                anyhow::bail!("spec.cloudflare.zone_id cannot be empty");
            }
            if cloudflare.api_token.is_empty() {
                anyhow::bail!("spec.cloudflare.api_token cannot be empty");
            }
        }

        if let Some(cloudapi) = &self.spec.cloudapi {
            if cloudapi.url.is_empty() {
                anyhow::bail!("spec.cloudapi.url cannot be empty");
            }
            if cloudapi.key_id.is_empty() || cloudapi.key_path.is_empty() {
                anyhow::bail!("spec.cloudapi requires key_id and key_path");
            }
        }

        Ok(())
    }
}
