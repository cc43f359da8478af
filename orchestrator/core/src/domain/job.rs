// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Provisioning Jobs
//!
//! The background phase of every lifecycle operation runs as a persisted
//! [`ProvisioningJob`]. A bridge stuck in a transitional status always has a
//! `Failed` job next to it carrying the last error, and that job can be
//! re-submitted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::domain::bridge::{AccountId, Bridge, BridgeId, BridgeStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which background phase a job carries out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Create containers, attach DNS, mark `RUNNING`
    Provision,
    /// Remove containers and delete the row
    Teardown,
    /// Stop containers, mark `STOPPED`
    Stop,
    /// Stop-then-start containers, mark `RUNNING`
    Resume,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Provision => "provision",
            Self::Teardown => "teardown",
            Self::Stop => "stop",
            Self::Resume => "resume",
        }
    }

    /// The job that finishes the transition `bridge` is in, if any.
    pub fn pending_for(bridge: &Bridge) -> Option<Self> {
        match bridge.status {
            BridgeStatus::Starting if bridge.containers().is_some() => Some(Self::Resume),
            BridgeStatus::Starting => Some(Self::Provision),
            BridgeStatus::Stopping => Some(Self::Stop),
            BridgeStatus::Removing => Some(Self::Teardown),
            BridgeStatus::Running | BridgeStatus::Stopped => None,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "provision" => Some(Self::Provision),
            "teardown" => Some(Self::Teardown),
            "stop" => Some(Self::Stop),
            "resume" => Some(Self::Resume),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "succeeded" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningJob {
    pub id: JobId,
    pub bridge_id: BridgeId,
    pub account_id: AccountId,
    pub kind: JobKind,
    pub status: JobStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProvisioningJob {
    pub fn new(bridge_id: BridgeId, account_id: AccountId, kind: JobKind) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            bridge_id,
            account_id,
            kind,
            status: JobStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn start_attempt(&mut self) {
        self.status = JobStatus::Running;
        self.attempts += 1;
        self.updated_at = Utc::now();
    }

    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
        self.updated_at = Utc::now();
    }

    pub fn succeed(&mut self) {
        self.status = JobStatus::Succeeded;
        self.updated_at = Utc::now();
    }

    pub fn fail(&mut self) {
        self.status = JobStatus::Failed;
        self.updated_at = Utc::now();
    }

    /// Put a failed job back in the queue with a fresh attempt budget.
    pub fn reset_for_retry(&mut self) {
        self.status = JobStatus::Pending;
        self.attempts = 0;
        self.updated_at = Utc::now();
    }
}

/// Exponential backoff between attempts of one job.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, given `attempt` failures so far.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}
