// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Background phase of the bridge lifecycle.
//!
//! [`BridgeJobExecutor`] runs one attempt of a [`ProvisioningJob`]. Every step
//! is safe to repeat, so the runner can retry a failed attempt from the top:
//!
//! - container creation is skipped once both ids are stored
//! - DNS only adds addresses that have no record yet, and only while the
//!   bridge is still `STARTING`
//! - removal treats missing containers as already removed and sweeps any
//!   A-records left under the namespace
//!
//! Terminal status writes are compare-and-swap. When another request moved
//! the bridge on in the meantime the job finishes without overwriting it.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::bridge::{Bridge, BridgeStatus};
use crate::domain::dns::{a_records_for, DnsProvider, DnsRecordSpec};
use crate::domain::events::BridgeEvent;
use crate::domain::job::{JobKind, ProvisioningJob};
use crate::domain::repository::{BridgeRepository, UsageRepository};
use crate::domain::runtime::{BridgeContainerSpec, ContainerRuntime, KeyMaterial};
use crate::infrastructure::event_bus::EventBus;

/// Operation tags carried by background failures.
pub mod tags {
    pub const DOCKER_CREATE: &str = "docker-create";
    pub const DOCKER_DELETE: &str = "docker-delete";
    pub const DOCKER_STOP: &str = "docker-stop";
    pub const DOCKER_RESUME: &str = "docker-resume";
    pub const CLOUDFLARE_CREATE: &str = "cloudflare-create";
    pub const CLOUDFLARE_DELETE: &str = "cloudflare-delete";
    pub const CLOUDAPI_DELETE: &str = "cloudapi-delete";
    pub const DB_STOP: &str = "db-stop";
    pub const DB_RESUME: &str = "db-resume";
}

/// DNS zone the per-bridge A-records live in.
#[derive(Clone)]
pub struct DnsSettings {
    pub provider: Arc<dyn DnsProvider>,
    pub zone_id: String,
    pub ttl: u32,
}

/// A failed step, tagged with the operation it belongs to.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{tag}: {message}")]
pub struct StepError {
    pub tag: &'static str,
    pub message: String,
}

impl StepError {
    fn new(tag: &'static str, err: impl std::fmt::Display) -> Self {
        Self {
            tag,
            message: err.to_string(),
        }
    }
}

trait Tagged<T> {
    fn tag(self, tag: &'static str) -> Result<T, StepError>;
}

impl<T, E: std::fmt::Display> Tagged<T> for Result<T, E> {
    fn tag(self, tag: &'static str) -> Result<T, StepError> {
        self.map_err(|e| StepError::new(tag, e))
    }
}

pub struct BridgeJobExecutor {
    bridges: Arc<dyn BridgeRepository>,
    usage: Arc<dyn UsageRepository>,
    runtime: Arc<dyn ContainerRuntime>,
    dns: Option<DnsSettings>,
    event_bus: Arc<EventBus>,
}

impl BridgeJobExecutor {
    pub fn new(
        bridges: Arc<dyn BridgeRepository>,
        usage: Arc<dyn UsageRepository>,
        runtime: Arc<dyn ContainerRuntime>,
        dns: Option<DnsSettings>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            bridges,
            usage,
            runtime,
            dns,
            event_bus,
        }
    }

    /// Run one attempt of `job`.
    pub async fn execute(&self, job: &ProvisioningJob) -> Result<(), StepError> {
        let tag = match job.kind {
            JobKind::Provision => tags::DOCKER_CREATE,
            JobKind::Teardown => tags::DOCKER_DELETE,
            JobKind::Stop => tags::DB_STOP,
            JobKind::Resume => tags::DB_RESUME,
        };
        let Some(bridge) = self
            .bridges
            .get_bridge(job.bridge_id, &job.account_id)
            .await
            .tag(tag)?
        else {
            debug!(
                bridge_id = %job.bridge_id,
                kind = job.kind.as_str(),
                "Bridge no longer exists, nothing to do"
            );
            return Ok(());
        };

        match job.kind {
            JobKind::Provision => self.provision(bridge).await,
            JobKind::Teardown => self.teardown(bridge).await,
            JobKind::Stop => self.stop(bridge).await,
            JobKind::Resume => self.resume(bridge).await,
        }
    }

    async fn provision(&self, bridge: Bridge) -> Result<(), StepError> {
        if bridge.status != BridgeStatus::Starting {
            info!(
                bridge_id = %bridge.bridge_id,
                status = %bridge.status,
                "Skipping provisioning, bridge moved on"
            );
            return Ok(());
        }

        let (container1_id, container2_id) = match bridge.containers() {
            Some((c1, c2)) => (c1.to_string(), c2.to_string()),
            None => {
                let spec = BridgeContainerSpec::from_bridge(&bridge);
                let keys = KeyMaterial::from_bridge(&bridge);
                let (c1, c2) = self
                    .runtime
                    .create_bridge_containers(&spec, &keys)
                    .await
                    .tag(tags::DOCKER_CREATE)?;
                let rows = self
                    .bridges
                    .update_bridge_containers(bridge.bridge_id, &bridge.account_id, &c1, &c2)
                    .await
                    .tag(tags::DOCKER_CREATE)?;
                if rows != 1 {
                    return Err(StepError::new(
                        tags::DOCKER_CREATE,
                        format!("expected 1 row updated when storing containers, got {}", rows),
                    ));
                }
                info!(
                    bridge_id = %bridge.bridge_id,
                    container1_id = %c1,
                    container2_id = %c2,
                    "Bridge containers created"
                );
                self.event_bus.publish(BridgeEvent::ContainersAttached {
                    bridge_id: bridge.bridge_id,
                    container1_id: c1.clone(),
                    container2_id: c2.clone(),
                    attached_at: Utc::now(),
                });
                (c1, c2)
            }
        };

        // Container creation is slow; a delete or stop may have landed meanwhile.
        if !self.still_starting(&bridge, tags::DOCKER_CREATE).await? {
            return Ok(());
        }
        self.ensure_dns(&bridge, &[&container1_id, &container2_id]).await?;
        self.mark_running(&bridge, tags::DOCKER_CREATE).await
    }

    async fn resume(&self, bridge: Bridge) -> Result<(), StepError> {
        if bridge.status != BridgeStatus::Starting {
            info!(
                bridge_id = %bridge.bridge_id,
                status = %bridge.status,
                "Skipping resume, bridge moved on"
            );
            return Ok(());
        }

        let Some((c1, c2)) = bridge.containers() else {
            // Never provisioned, so resuming means provisioning.
            return self.provision(bridge).await;
        };

        self.runtime
            .resume_bridge_containers(c1, c2)
            .await
            .tag(tags::DOCKER_RESUME)?;
        if !self.still_starting(&bridge, tags::DOCKER_RESUME).await? {
            return Ok(());
        }
        // Restarted containers may come back with new addresses.
        self.ensure_dns(&bridge, &[c1, c2]).await?;
        self.mark_running(&bridge, tags::DB_RESUME).await
    }

    async fn stop(&self, bridge: Bridge) -> Result<(), StepError> {
        if bridge.status != BridgeStatus::Stopping {
            info!(
                bridge_id = %bridge.bridge_id,
                status = %bridge.status,
                "Skipping stop, bridge moved on"
            );
            return Ok(());
        }

        if let Some((c1, c2)) = bridge.containers() {
            self.runtime
                .stop_bridge_containers(c1, c2)
                .await
                .tag(tags::DOCKER_STOP)?;
        }

        let rows = self
            .bridges
            .update_bridge_status(
                bridge.bridge_id,
                &bridge.account_id,
                &[BridgeStatus::Stopping],
                BridgeStatus::Stopped,
            )
            .await
            .tag(tags::DB_STOP)?;
        if rows == 1 {
            self.usage
                .stop_usage(bridge.bridge_id, Utc::now())
                .await
                .tag(tags::DB_STOP)?;
            self.event_bus.publish(BridgeEvent::status_changed(
                bridge.bridge_id,
                BridgeStatus::Stopping,
                BridgeStatus::Stopped,
            ));
            info!(bridge_id = %bridge.bridge_id, "Bridge stopped");
        } else {
            info!(bridge_id = %bridge.bridge_id, "Bridge left STOPPING before the stop completed");
        }
        Ok(())
    }

    async fn teardown(&self, bridge: Bridge) -> Result<(), StepError> {
        if bridge.status != BridgeStatus::Removing {
            info!(
                bridge_id = %bridge.bridge_id,
                status = %bridge.status,
                "Skipping teardown, bridge is not REMOVING"
            );
            return Ok(());
        }

        if let Some((c1, c2)) = bridge.containers() {
            self.runtime
                .delete_bridge_containers(c1, c2)
                .await
                .tag(tags::DOCKER_DELETE)?;
        }
        // Records added by a provisioning attempt that overlapped the delete.
        self.remove_dns(&bridge).await?;

        self.bridges
            .delete_bridge(bridge.bridge_id, &bridge.account_id)
            .await
            .tag(tags::DOCKER_DELETE)?;
        self.usage
            .stop_usage(bridge.bridge_id, Utc::now())
            .await
            .tag(tags::DOCKER_DELETE)?;

        self.event_bus.publish(BridgeEvent::BridgeRemoved {
            bridge_id: bridge.bridge_id,
            account_id: bridge.account_id.clone(),
            removed_at: Utc::now(),
        });
        info!(bridge_id = %bridge.bridge_id, "Bridge removed");
        Ok(())
    }

    async fn mark_running(&self, bridge: &Bridge, tag: &'static str) -> Result<(), StepError> {
        let rows = self
            .bridges
            .update_bridge_status(
                bridge.bridge_id,
                &bridge.account_id,
                &[BridgeStatus::Starting],
                BridgeStatus::Running,
            )
            .await
            .tag(tag)?;
        if rows != 1 {
            info!(bridge_id = %bridge.bridge_id, "Bridge left STARTING before it came up");
            return Ok(());
        }

        self.usage
            .start_usage(bridge.bridge_id, &bridge.account_id, Utc::now())
            .await
            .tag(tag)?;
        self.event_bus.publish(BridgeEvent::status_changed(
            bridge.bridge_id,
            BridgeStatus::Starting,
            BridgeStatus::Running,
        ));
        info!(bridge_id = %bridge.bridge_id, namespace = %bridge.namespace, "Bridge running");
        Ok(())
    }

    /// Re-read the status; false once the bridge has left `STARTING`.
    async fn still_starting(&self, bridge: &Bridge, tag: &'static str) -> Result<bool, StepError> {
        let current = self
            .bridges
            .get_bridge(bridge.bridge_id, &bridge.account_id)
            .await
            .tag(tag)?;
        match current {
            Some(current) if current.status == BridgeStatus::Starting => Ok(true),
            Some(current) => {
                info!(
                    bridge_id = %bridge.bridge_id,
                    status = %current.status,
                    "Bridge moved on, leaving DNS alone"
                );
                Ok(false)
            }
            None => {
                info!(bridge_id = %bridge.bridge_id, "Bridge removed, leaving DNS alone");
                Ok(false)
            }
        }
    }

    async fn remove_dns(&self, bridge: &Bridge) -> Result<(), StepError> {
        let Some(dns) = &self.dns else {
            return Ok(());
        };

        let existing = dns
            .provider
            .list_records(&dns.zone_id)
            .await
            .tag(tags::CLOUDFLARE_DELETE)?;
        for record in a_records_for(&existing, &bridge.namespace) {
            dns.provider
                .delete_record(&dns.zone_id, &record.id)
                .await
                .tag(tags::CLOUDFLARE_DELETE)?;
            debug!(bridge_id = %bridge.bridge_id, record_id = %record.id, "A-record removed");
        }
        Ok(())
    }

    /// Add one A-record per container address under the bridge namespace.
    async fn ensure_dns(&self, bridge: &Bridge, containers: &[&str]) -> Result<(), StepError> {
        let Some(dns) = &self.dns else {
            return Ok(());
        };

        let mut addresses = Vec::with_capacity(containers.len());
        for container_id in containers {
            let network = self
                .runtime
                .inspect(container_id)
                .await
                .tag(tags::CLOUDFLARE_CREATE)?;
            let address = network.address.ok_or_else(|| {
                StepError::new(
                    tags::CLOUDFLARE_CREATE,
                    format!("container {} has no network address", container_id),
                )
            })?;
            addresses.push(address);
        }

        let existing = dns
            .provider
            .list_records(&dns.zone_id)
            .await
            .tag(tags::CLOUDFLARE_CREATE)?;
        let published: Vec<&str> = a_records_for(&existing, &bridge.namespace)
            .map(|r| r.content.as_str())
            .collect();

        for address in &addresses {
            if published.contains(&address.as_str()) {
                continue;
            }
            let record = DnsRecordSpec::a(bridge.namespace.clone(), address.clone(), dns.ttl);
            dns.provider
                .add_record(&dns.zone_id, &record)
                .await
                .tag(tags::CLOUDFLARE_CREATE)?;
            debug!(bridge_id = %bridge.bridge_id, address = %address, "A-record added");
        }
        Ok(())
    }
}
