// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::error::BridgeError;

// ============================================================================
// Value Objects
// ============================================================================

/// Unique identifier for a bridge, generated by the orchestrator at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BridgeId(pub Uuid);

impl BridgeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for BridgeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BridgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity-provider subject of the owning account.
///
/// This is the tenancy boundary: every repository read and write is filtered
/// by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(pub String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Persisted lifecycle status of a bridge.
///
/// `STARTING`, `STOPPING` and `REMOVING` are written synchronously by the
/// triggering request; `RUNNING` and `STOPPED` only by a background job once
/// the container operation completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BridgeStatus {
    Starting,
    Running,
    Stopping,
    Stopped,
    Removing,
}

impl BridgeStatus {
    pub const ALL: [BridgeStatus; 5] = [
        Self::Starting,
        Self::Running,
        Self::Stopping,
        Self::Stopped,
        Self::Removing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "STARTING",
            Self::Running => "RUNNING",
            Self::Stopping => "STOPPING",
            Self::Stopped => "STOPPED",
            Self::Removing => "REMOVING",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }

    pub fn is_transitional(&self) -> bool {
        matches!(self, Self::Starting | Self::Stopping | Self::Removing)
    }

    pub fn can_stop(&self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }

    pub fn can_resume(&self) -> bool {
        matches!(self, Self::Stopping | Self::Stopped)
    }

    pub fn can_delete(&self) -> bool {
        !matches!(self, Self::Removing)
    }

    /// Prior states from which a delete may move the bridge to `REMOVING`.
    pub fn deletable() -> Vec<BridgeStatus> {
        Self::ALL.into_iter().filter(|s| s.can_delete()).collect()
    }
}

impl std::fmt::Display for BridgeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Aggregate Root: Bridge
// ============================================================================

/// A pair of gateway containers exposed under one DNS namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bridge {
    #[serde(rename = "id")]
    pub bridge_id: BridgeId,
    pub account_id: AccountId,
    pub username: String,
    pub name: String,
    pub namespace: String,
    pub ssh_key_name: String,
    pub ssh_key_id: String,
    /// Private key with newlines escaped, see [`escape_key`].
    #[serde(skip_serializing, default)]
    pub ssh_key: String,
    pub directory_map: String,
    pub container1_id: Option<String>,
    pub container2_id: Option<String>,
    pub status: BridgeStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Bridge {
    /// Fully-qualified DNS name for a bridge
    pub fn namespace_for(name: &str, parent: &str) -> String {
        format!("{}.{}", name, parent.trim_start_matches('.'))
    }

    /// Both container ids, once provisioning has stored them.
    pub fn containers(&self) -> Option<(&str, &str)> {
        match (&self.container1_id, &self.container2_id) {
            (Some(c1), Some(c2)) => Some((c1.as_str(), c2.as_str())),
            _ => None,
        }
    }

    /// Label the key issuer registers the bridge keypair under.
    pub fn key_name_for(name: &str) -> String {
        format!("{}-bridge", name)
    }

    /// Unescaped private key material, as handed to the containers.
    pub fn private_key(&self) -> String {
        unescape_key(&self.ssh_key)
    }
}

/// Fields the orchestrator supplies when inserting a bridge row.
#[derive(Debug, Clone)]
pub struct NewBridge {
    pub bridge_id: BridgeId,
    pub account_id: AccountId,
    pub username: String,
    pub name: String,
    pub namespace: String,
    pub ssh_key_name: String,
    pub ssh_key_id: String,
    pub ssh_key: String,
    pub directory_map: String,
}

impl NewBridge {
    /// The row as it reads back right after insertion.
    pub fn into_bridge(self, now: DateTime<Utc>) -> Bridge {
        Bridge {
            bridge_id: self.bridge_id,
            account_id: self.account_id,
            username: self.username,
            name: self.name,
            namespace: self.namespace,
            ssh_key_name: self.ssh_key_name,
            ssh_key_id: self.ssh_key_id,
            ssh_key: self.ssh_key,
            directory_map: self.directory_map,
            container1_id: None,
            container2_id: None,
            status: BridgeStatus::Starting,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Bridge names prefix the namespace, so they must be a valid DNS label.
pub fn validate_bridge_name(name: &str) -> Result<(), BridgeError> {
    if name.is_empty() {
        return Err(BridgeError::Validation("bridge name is required".to_string()));
    }
    if name.len() > 63 {
        return Err(BridgeError::Validation(format!(
            "bridge name '{}' exceeds 63 characters",
            name
        )));
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(BridgeError::Validation(format!(
            "bridge name '{}' must not start or end with '-'",
            name
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(BridgeError::Validation(format!(
            "bridge name '{}' may only contain lowercase letters, digits and '-'",
            name
        )));
    }
    Ok(())
}

/// Escape newlines so multi-line key material fits a single column.
pub fn escape_key(key: &str) -> String {
    key.replace('\n', "\\n")
}

pub fn unescape_key(key: &str) -> String {
    key.replace("\\n", "\n")
}
