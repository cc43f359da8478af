// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::bridge::{AccountId, BridgeId, BridgeStatus};
use crate::domain::job::{JobId, JobKind};

/// Bridge lifecycle events, published after the corresponding state change
/// has been persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeEvent {
    BridgeCreated {
        bridge_id: BridgeId,
        account_id: AccountId,
        name: String,
        namespace: String,
        created_at: DateTime<Utc>,
    },
    StatusChanged {
        bridge_id: BridgeId,
        from: BridgeStatus,
        to: BridgeStatus,
        changed_at: DateTime<Utc>,
    },
    ContainersAttached {
        bridge_id: BridgeId,
        container1_id: String,
        container2_id: String,
        attached_at: DateTime<Utc>,
    },
    JobFailed {
        bridge_id: BridgeId,
        job_id: JobId,
        kind: JobKind,
        /// Operation tag of the failing step, e.g. `docker-create`
        tag: String,
        error: String,
        attempts: u32,
        failed_at: DateTime<Utc>,
    },
    BridgeRemoved {
        bridge_id: BridgeId,
        account_id: AccountId,
        removed_at: DateTime<Utc>,
    },
}

impl BridgeEvent {
    pub fn bridge_id(&self) -> BridgeId {
        match self {
            Self::BridgeCreated { bridge_id, .. }
            | Self::StatusChanged { bridge_id, .. }
            | Self::ContainersAttached { bridge_id, .. }
            | Self::JobFailed { bridge_id, .. }
            | Self::BridgeRemoved { bridge_id, .. } => *bridge_id,
        }
    }

    pub fn status_changed(bridge_id: BridgeId, from: BridgeStatus, to: BridgeStatus) -> Self {
        Self::StatusChanged {
            bridge_id,
            from,
            to,
            changed_at: Utc::now(),
        }
    }
}
