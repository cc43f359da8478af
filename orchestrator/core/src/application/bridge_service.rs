// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Bridge Lifecycle Application Service
//!
//! Synchronous phase of create/delete/stop/resume. Each operation validates,
//! moves the persisted status with a compare-and-swap, submits the background
//! job and returns the record as it stands at that point. Background failures
//! never surface here; they land on the job (see [`crate::application::job_runner`]).
//!
//! Every read and write is scoped by the caller's account.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::job_runner::JobRunner;
use crate::application::provisioning::{tags, DnsSettings};
use crate::domain::account::Caller;
use crate::domain::bridge::{
    escape_key, validate_bridge_name, AccountId, Bridge, BridgeId, BridgeStatus, NewBridge,
};
use crate::domain::dns::a_records_for;
use crate::domain::error::BridgeError;
use crate::domain::events::BridgeEvent;
use crate::domain::job::{JobKind, JobStatus, ProvisioningJob};
use crate::domain::key_issuer::KeyIssuer;
use crate::domain::repository::{BridgeRepository, JobRepository, UsageRepository};
use crate::domain::ssh_key::{ssh_key_id, SshKeypair};
use crate::domain::usage::BridgeUsage;
use crate::infrastructure::event_bus::EventBus;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBridgeRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub directory_map: String,
}

// ============================================================================
// Service Trait
// ============================================================================

#[async_trait]
pub trait BridgeService: Send + Sync {
    /// Returns the new bridge in `STARTING`, before any container exists.
    async fn create_bridge(
        &self,
        caller: &Caller,
        request: CreateBridgeRequest,
    ) -> Result<Bridge, BridgeError>;

    /// Returns the bridge in `REMOVING`; the row is deleted in the background.
    async fn delete_bridge(
        &self,
        id: BridgeId,
        account_id: &AccountId,
    ) -> Result<Bridge, BridgeError>;

    async fn stop_bridge(
        &self,
        id: BridgeId,
        account_id: &AccountId,
    ) -> Result<Bridge, BridgeError>;

    async fn resume_bridge(
        &self,
        id: BridgeId,
        account_id: &AccountId,
    ) -> Result<Bridge, BridgeError>;

    async fn get_bridge(
        &self,
        id: BridgeId,
        account_id: &AccountId,
    ) -> Result<Option<Bridge>, BridgeError>;

    async fn get_bridge_by_name(
        &self,
        name: &str,
        account_id: &AccountId,
    ) -> Result<Option<Bridge>, BridgeError>;

    async fn list_bridges(&self, account_id: &AccountId) -> Result<Vec<Bridge>, BridgeError>;

    /// Re-submit the latest failed job of a bridge. A bridge left in a
    /// transitional status without any job gets a fresh one.
    async fn retry_bridge(
        &self,
        id: BridgeId,
        account_id: &AccountId,
    ) -> Result<ProvisioningJob, BridgeError>;

    async fn list_bridge_jobs(
        &self,
        id: BridgeId,
        account_id: &AccountId,
    ) -> Result<Vec<ProvisioningJob>, BridgeError>;

    async fn list_usage(&self, account_id: &AccountId) -> Result<Vec<BridgeUsage>, BridgeError>;
}

// ============================================================================
// Standard Implementation
// ============================================================================

pub struct StandardBridgeService {
    bridges: Arc<dyn BridgeRepository>,
    jobs: Arc<dyn JobRepository>,
    usage: Arc<dyn UsageRepository>,
    key_issuer: Arc<dyn KeyIssuer>,
    dns: Option<DnsSettings>,
    runner: Arc<JobRunner>,
    event_bus: Arc<EventBus>,
    namespace_parent: String,
}

impl StandardBridgeService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bridges: Arc<dyn BridgeRepository>,
        jobs: Arc<dyn JobRepository>,
        usage: Arc<dyn UsageRepository>,
        key_issuer: Arc<dyn KeyIssuer>,
        dns: Option<DnsSettings>,
        runner: Arc<JobRunner>,
        event_bus: Arc<EventBus>,
        namespace_parent: impl Into<String>,
    ) -> Self {
        Self {
            bridges,
            jobs,
            usage,
            key_issuer,
            dns,
            runner,
            event_bus,
            namespace_parent: namespace_parent.into(),
        }
    }

    async fn require_bridge(
        &self,
        id: BridgeId,
        account_id: &AccountId,
    ) -> Result<Bridge, BridgeError> {
        self.bridges
            .get_bridge(id, account_id)
            .await?
            .ok_or_else(|| BridgeError::NotFound(format!("bridge {} not found", id)))
    }

    /// Move `bridge` to `to` if it is still in one of `expected`.
    async fn transition(
        &self,
        mut bridge: Bridge,
        expected: &[BridgeStatus],
        to: BridgeStatus,
    ) -> Result<Bridge, BridgeError> {
        let rows = self
            .bridges
            .update_bridge_status(bridge.bridge_id, &bridge.account_id, expected, to)
            .await?;
        match rows {
            1 => {}
            0 => {
                // Lost the race: report against whatever is there now.
                return match self.bridges.get_bridge(bridge.bridge_id, &bridge.account_id).await? {
                    None => Err(BridgeError::NotFound(format!(
                        "bridge {} not found",
                        bridge.bridge_id
                    ))),
                    Some(current) => Err(BridgeError::Conflict(format!(
                        "bridge {} is {} and cannot move to {}",
                        current.bridge_id, current.status, to
                    ))),
                };
            }
            n => {
                return Err(BridgeError::Internal(format!(
                    "status update of bridge {} affected {} rows",
                    bridge.bridge_id, n
                )))
            }
        }

        let from = bridge.status;
        bridge.status = to;
        bridge.updated_at = Utc::now();
        self.event_bus
            .publish(BridgeEvent::status_changed(bridge.bridge_id, from, to));
        Ok(bridge)
    }

    async fn submit(&self, bridge: &Bridge, kind: JobKind) -> Result<(), BridgeError> {
        let job = ProvisioningJob::new(bridge.bridge_id, bridge.account_id.clone(), kind);
        self.runner.submit(job).await?;
        Ok(())
    }

    async fn revoke_key(&self, bridge: &Bridge) {
        if let Err(e) = self.key_issuer.delete_ssh_key(&bridge.ssh_key_name).await {
            warn!(
                tag = tags::CLOUDAPI_DELETE,
                bridge_id = %bridge.bridge_id,
                error = %e,
                "Failed to delete bridge ssh key"
            );
        }
    }

    async fn remove_dns_records(&self, bridge: &Bridge) {
        let Some(dns) = &self.dns else {
            return;
        };

        let records = match dns.provider.list_records(&dns.zone_id).await {
            Ok(records) => records,
            Err(e) => {
                warn!(
                    tag = tags::CLOUDFLARE_DELETE,
                    bridge_id = %bridge.bridge_id,
                    error = %e,
                    "Failed to list DNS records"
                );
                return;
            }
        };

        for record in a_records_for(&records, &bridge.namespace) {
            if let Err(e) = dns.provider.delete_record(&dns.zone_id, &record.id).await {
                warn!(
                    tag = tags::CLOUDFLARE_DELETE,
                    bridge_id = %bridge.bridge_id,
                    record_id = %record.id,
                    error = %e,
                    "Failed to delete DNS record"
                );
            }
        }
    }
}

fn count_request(operation: &'static str) {
    metrics::counter!("bridge_lifecycle_requests_total", "operation" => operation).increment(1);
}

#[async_trait]
impl BridgeService for StandardBridgeService {
    async fn create_bridge(
        &self,
        caller: &Caller,
        request: CreateBridgeRequest,
    ) -> Result<Bridge, BridgeError> {
        count_request("create");
        let name = request.name.trim().to_string();
        validate_bridge_name(&name)?;

        if self.bridges.does_bridge_exist_by_name(&name).await? {
            return Err(BridgeError::Conflict(format!("bridge name '{}' is already in use", name)));
        }

        let ssh_key_name = Bridge::key_name_for(&name);
        let keypair = SshKeypair::generate(&ssh_key_name);
        let issued = self
            .key_issuer
            .create_ssh_key(&ssh_key_name, &keypair.public_key)
            .await?;
        let Some(fingerprint) = issued.fingerprint.filter(|f| !f.is_empty()) else {
            return Err(BridgeError::Internal(format!(
                "key issuer returned no fingerprint for '{}'",
                ssh_key_name
            )));
        };

        let new_bridge = NewBridge {
            bridge_id: BridgeId::new(),
            account_id: caller.account_id.clone(),
            username: caller.username.clone(),
            namespace: Bridge::namespace_for(&name, &self.namespace_parent),
            ssh_key_name,
            ssh_key_id: ssh_key_id(&caller.username, &fingerprint),
            ssh_key: escape_key(&keypair.private_key),
            directory_map: request.directory_map,
            name,
        };

        // The insert re-checks the name, closing the window opened by the key
        // issuer call. The losing request leaves the key alone since its name
        // is shared with the winning row.
        match self.bridges.insert_bridge(&new_bridge).await? {
            1 => {}
            0 => {
                warn!(name = %new_bridge.name, "Bridge name taken while its key was issued");
                return Err(BridgeError::Conflict(format!(
                    "bridge name '{}' is already in use",
                    new_bridge.name
                )));
            }
            rows => {
                return Err(BridgeError::Internal(format!(
                    "inserting bridge {} affected {} rows",
                    new_bridge.bridge_id, rows
                )))
            }
        }

        let bridge = self
            .bridges
            .get_bridge(new_bridge.bridge_id, &new_bridge.account_id)
            .await?
            .unwrap_or_else(|| new_bridge.into_bridge(Utc::now()));

        self.event_bus.publish(BridgeEvent::BridgeCreated {
            bridge_id: bridge.bridge_id,
            account_id: bridge.account_id.clone(),
            name: bridge.name.clone(),
            namespace: bridge.namespace.clone(),
            created_at: bridge.created_at,
        });
        self.submit(&bridge, JobKind::Provision).await?;

        info!(
            bridge_id = %bridge.bridge_id,
            name = %bridge.name,
            namespace = %bridge.namespace,
            "Bridge created"
        );
        Ok(bridge)
    }

    async fn delete_bridge(
        &self,
        id: BridgeId,
        account_id: &AccountId,
    ) -> Result<Bridge, BridgeError> {
        count_request("delete");
        let bridge = self.require_bridge(id, account_id).await?;
        if !bridge.status.can_delete() {
            return Err(BridgeError::Conflict(format!("bridge {} is already being removed", id)));
        }

        // REMOVING is claimed before the key and DNS cleanup so a concurrent
        // delete or stop is refused before it reaches either service.
        let bridge = self
            .transition(bridge, &BridgeStatus::deletable(), BridgeStatus::Removing)
            .await?;

        self.revoke_key(&bridge).await;
        self.remove_dns_records(&bridge).await;
        self.submit(&bridge, JobKind::Teardown).await?;

        info!(bridge_id = %id, "Bridge removal started");
        Ok(bridge)
    }

    async fn stop_bridge(
        &self,
        id: BridgeId,
        account_id: &AccountId,
    ) -> Result<Bridge, BridgeError> {
        count_request("stop");
        let bridge = self.require_bridge(id, account_id).await?;
        if !bridge.status.can_stop() {
            return Err(BridgeError::Conflict(format!(
                "bridge {} is {} and cannot be stopped",
                id, bridge.status
            )));
        }

        let bridge = self
            .transition(
                bridge,
                &[BridgeStatus::Starting, BridgeStatus::Running],
                BridgeStatus::Stopping,
            )
            .await?;
        self.submit(&bridge, JobKind::Stop).await?;

        info!(bridge_id = %id, "Bridge stop started");
        Ok(bridge)
    }

    async fn resume_bridge(
        &self,
        id: BridgeId,
        account_id: &AccountId,
    ) -> Result<Bridge, BridgeError> {
        count_request("resume");
        let bridge = self.require_bridge(id, account_id).await?;
        if !bridge.status.can_resume() {
            return Err(BridgeError::Conflict(format!(
                "bridge {} is {} and cannot be resumed",
                id, bridge.status
            )));
        }

        let bridge = self
            .transition(
                bridge,
                &[BridgeStatus::Stopping, BridgeStatus::Stopped],
                BridgeStatus::Starting,
            )
            .await?;
        self.submit(&bridge, JobKind::Resume).await?;

        info!(bridge_id = %id, "Bridge resume started");
        Ok(bridge)
    }

    async fn get_bridge(
        &self,
        id: BridgeId,
        account_id: &AccountId,
    ) -> Result<Option<Bridge>, BridgeError> {
        debug!("Fetching bridge {}", id);
        Ok(self.bridges.get_bridge(id, account_id).await?)
    }

    async fn get_bridge_by_name(
        &self,
        name: &str,
        account_id: &AccountId,
    ) -> Result<Option<Bridge>, BridgeError> {
        debug!("Fetching bridge by name '{}'", name);
        Ok(self.bridges.get_bridge_by_name(name, account_id).await?)
    }

    async fn list_bridges(&self, account_id: &AccountId) -> Result<Vec<Bridge>, BridgeError> {
        Ok(self.bridges.list_bridges_by_account(account_id).await?)
    }

    async fn retry_bridge(
        &self,
        id: BridgeId,
        account_id: &AccountId,
    ) -> Result<ProvisioningJob, BridgeError> {
        count_request("retry");
        let bridge = self.require_bridge(id, account_id).await?;
        let jobs = self.jobs.find_by_bridge(bridge.bridge_id).await?;

        let Some(mut job) = jobs.into_iter().last() else {
            // The job was never recorded, so rebuild it from the status.
            let Some(kind) = JobKind::pending_for(&bridge) else {
                return Err(BridgeError::Conflict(format!(
                    "bridge {} is {} and has no jobs",
                    id, bridge.status
                )));
            };
            let job = ProvisioningJob::new(bridge.bridge_id, bridge.account_id.clone(), kind);
            self.runner.submit(job.clone()).await?;
            info!(
                bridge_id = %id,
                job_id = %job.id,
                kind = kind.as_str(),
                "Missing job re-created"
            );
            return Ok(job);
        };
        if job.status != JobStatus::Failed {
            return Err(BridgeError::Conflict(format!(
                "latest job of bridge {} is {}, only failed jobs can be retried",
                id,
                job.status.as_str()
            )));
        }

        job.reset_for_retry();
        self.runner.submit(job.clone()).await?;
        info!(bridge_id = %id, job_id = %job.id, kind = job.kind.as_str(), "Job re-submitted");
        Ok(job)
    }

    async fn list_bridge_jobs(
        &self,
        id: BridgeId,
        account_id: &AccountId,
    ) -> Result<Vec<ProvisioningJob>, BridgeError> {
        let bridge = self.require_bridge(id, account_id).await?;
        Ok(self.jobs.find_by_bridge(bridge.bridge_id).await?)
    }

    async fn list_usage(&self, account_id: &AccountId) -> Result<Vec<BridgeUsage>, BridgeError> {
        Ok(self.usage.list_usage_by_account(account_id).await?)
    }
}
