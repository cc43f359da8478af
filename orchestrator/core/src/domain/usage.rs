// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::bridge::{AccountId, BridgeId};

/// One interval during which a bridge's containers were running.
///
/// `stopped` stays `None` while the interval is open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeUsage {
    pub id: Uuid,
    pub bridge_id: BridgeId,
    pub account_id: AccountId,
    pub started: DateTime<Utc>,
    pub stopped: Option<DateTime<Utc>>,
}

impl BridgeUsage {
    pub fn open(bridge_id: BridgeId, account_id: AccountId, started: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            bridge_id,
            account_id,
            started,
            stopped: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.stopped.is_none()
    }
}
