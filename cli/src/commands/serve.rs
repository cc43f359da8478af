// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `storage-bridge serve`
//!
//! Wires the configured backends into the services, seeds the account
//! allow-list, re-queues jobs left unfinished by a previous process and serves
//! the HTTP API until SIGINT/SIGTERM.

use anyhow::{Context, Result};
use clap::Args;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

use bridge_core::application::account_service::{AccountService, StandardAccountService};
use bridge_core::application::bridge_service::StandardBridgeService;
use bridge_core::application::job_runner::JobRunner;
use bridge_core::application::provisioning::{BridgeJobExecutor, DnsSettings};
use bridge_core::domain::node_config::BridgeNodeConfig;
use bridge_core::domain::repository::{
    AccountRepository, BridgeRepository, JobRepository, StorageBackend, UsageRepository,
};
use bridge_core::infrastructure::cloudapi::CloudApiKeyIssuer;
use bridge_core::infrastructure::cloudflare::CloudflareDns;
use bridge_core::infrastructure::db::Database;
use bridge_core::infrastructure::event_bus::EventBus;
use bridge_core::infrastructure::repositories::{
    InMemoryAccountRepository, InMemoryBridgeRepository, InMemoryJobRepository,
    InMemoryUsageRepository,
    PostgresAccountRepository, PostgresBridgeRepository, PostgresJobRepository,
    PostgresUsageRepository,
};
use bridge_core::infrastructure::runtime::DockerBridgeRuntime;
use bridge_core::presentation::api;

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// HTTP API port (overrides spec.network.port)
    #[arg(long, env = "BRIDGE_PORT")]
    pub port: Option<u16>,

    /// HTTP API bind address (overrides spec.network.bind_address)
    #[arg(long, env = "BRIDGE_HOST")]
    pub host: Option<String>,
}

/// Repository set for one storage backend.
pub struct Stores {
    pub bridges: Arc<dyn BridgeRepository>,
    pub accounts: Arc<dyn AccountRepository>,
    pub usage: Arc<dyn UsageRepository>,
    pub jobs: Arc<dyn JobRepository>,
}

impl Stores {
    pub async fn connect(backend: &StorageBackend) -> Result<Self> {
        match backend {
            StorageBackend::InMemory => {
                warn!("Using in-memory storage; bridges and jobs are lost on restart");
                Ok(Self {
                    bridges: Arc::new(InMemoryBridgeRepository::new()),
                    accounts: Arc::new(InMemoryAccountRepository::new()),
                    usage: Arc::new(InMemoryUsageRepository::new()),
                    jobs: Arc::new(InMemoryJobRepository::new()),
                })
            }
            StorageBackend::PostgreSQL(pg) => {
                let db = Database::new(pg).await.context("Failed to connect to PostgreSQL")?;
                let pool = db.get_pool().clone();
                info!("Connected to PostgreSQL");
                Ok(Self {
                    bridges: Arc::new(PostgresBridgeRepository::new(pool.clone())),
                    accounts: Arc::new(PostgresAccountRepository::new(pool.clone())),
                    usage: Arc::new(PostgresUsageRepository::new(pool.clone())),
                    jobs: Arc::new(PostgresJobRepository::new(pool)),
                })
            }
        }
    }
}

fn install_metrics(config: &BridgeNodeConfig) -> Result<()> {
    let metrics = &config.spec.observability.metrics;
    if !metrics.enabled {
        return Ok(());
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], metrics.port));
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    metrics::describe_counter!(
        "bridge_lifecycle_requests_total",
        "Lifecycle requests received, by operation"
    );
    metrics::describe_counter!(
        "bridge_jobs_completed_total",
        "Background jobs finished, by kind and outcome"
    );
    info!("Prometheus metrics served on {}", addr);
    Ok(())
}

pub async fn run(config: BridgeNodeConfig, args: ServeArgs) -> Result<()> {
    config.validate().context("Configuration validation failed")?;
    install_metrics(&config)?;

    let spec = &config.spec;
    let stores = Stores::connect(&spec.storage.to_backend()?).await?;

    let runtime = Arc::new(DockerBridgeRuntime::new(
        spec.bridge.image.clone(),
        spec.docker.socket_path.clone(),
        spec.bridge.network.clone(),
        spec.bridge.storage_url.clone(),
    )?);
    runtime.healthcheck().await?;
    info!("Docker runtime ready (image {})", spec.bridge.image);

    let cloudapi = spec
        .cloudapi
        .as_ref()
        .context(
            "spec.cloudapi is required to serve \
             (or set SDC_URL, SDC_ACCOUNT, SDC_KEY_ID, SDC_KEY_PATH)",
        )?;
    let key_issuer = Arc::new(CloudApiKeyIssuer::from_config(cloudapi)?);

    let dns = spec.cloudflare.as_ref().map(|cloudflare| DnsSettings {
        provider: Arc::new(CloudflareDns::from_config(cloudflare)),
        zone_id: cloudflare.zone_id.clone(),
        ttl: spec.bridge.dns_ttl,
    });
    if dns.is_none() {
        warn!("spec.cloudflare not configured; bridge DNS records will not be managed");
    }

    let event_bus = Arc::new(EventBus::with_default_capacity());
    let executor = Arc::new(BridgeJobExecutor::new(
        stores.bridges.clone(),
        stores.usage.clone(),
        runtime,
        dns.clone(),
        event_bus.clone(),
    ));
    let runner = Arc::new(JobRunner::new(
        stores.jobs.clone(),
        executor,
        spec.jobs.retry_policy(),
        event_bus.clone(),
    ));

    let account_service = Arc::new(StandardAccountService::new(stores.accounts.clone()));
    let bridge_service = Arc::new(StandardBridgeService::new(
        stores.bridges.clone(),
        stores.jobs.clone(),
        stores.usage.clone(),
        key_issuer,
        dns,
        runner.clone(),
        event_bus,
        spec.bridge.namespace_parent.clone(),
    ));

    account_service.seed_accounts(&spec.accounts.seed()).await?;

    let recovered = runner.recover().await?;
    if recovered > 0 {
        info!("Re-queued {} unfinished jobs", recovered);
    }
    let dispatcher = runner.start();

    let app = api::app(bridge_service, account_service);
    let host = args.host.unwrap_or_else(|| spec.network.bind_address.clone());
    let port = args.port.unwrap_or(spec.network.port);
    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("storage-bridge listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    if let Some(dispatcher) = dispatcher {
        dispatcher.abort();
    }
    info!("storage-bridge shutting down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
