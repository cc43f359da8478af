// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::domain::bridge::{AccountId, Bridge, BridgeId};

/// Everything a runtime needs to create the two containers of a bridge,
/// taken from the persisted record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeContainerSpec {
    pub bridge_id: BridgeId,
    pub account_id: AccountId,
    pub username: String,
    pub name: String,
    pub namespace: String,
    pub directory_map: String,
}

impl BridgeContainerSpec {
    pub fn from_bridge(bridge: &Bridge) -> Self {
        Self {
            bridge_id: bridge.bridge_id,
            account_id: bridge.account_id.clone(),
            username: bridge.username.clone(),
            name: bridge.name.clone(),
            namespace: bridge.namespace.clone(),
            directory_map: bridge.directory_map.clone(),
        }
    }

    /// Container name of member `index` (1 or 2) of the pair.
    pub fn container_name(&self, index: u8) -> String {
        format!("bridge-{}-{}", self.bridge_id, index)
    }

    /// Service name the CNS watcher publishes both containers under.
    pub fn cns_service(&self) -> String {
        format!("{}-{}-bridge", self.account_id, self.namespace)
    }

    pub fn labels(&self) -> HashMap<String, String> {
        HashMap::from([
            ("accountId".to_string(), self.account_id.to_string()),
            ("bridgeId".to_string(), self.bridge_id.to_string()),
            ("triton.cns.services".to_string(), self.cns_service()),
        ])
    }
}

/// Credentials injected into the containers so they can reach storage.
#[derive(Clone)]
pub struct KeyMaterial {
    pub key_id: String,
    pub private_key: String,
}

impl KeyMaterial {
    pub fn from_bridge(bridge: &Bridge) -> Self {
        Self {
            key_id: bridge.ssh_key_id.clone(),
            private_key: bridge.private_key(),
        }
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("key_id", &self.key_id)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerNetwork {
    /// Primary IPv4 address, if the container has one
    pub address: Option<String>,
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Failed to create container: {0}")]
    CreateFailed(String),
    #[error("Failed to start container: {0}")]
    StartFailed(String),
    #[error("Failed to stop container: {0}")]
    StopFailed(String),
    #[error("Failed to remove container: {0}")]
    RemoveFailed(String),
    #[error("Container not found: {0}")]
    ContainerNotFound(String),
    #[error("Runtime unavailable: {0}")]
    Unavailable(String),
}

/// The container runtime hosting bridge pairs.
///
/// Implementations must tolerate containers that are already gone when
/// stopping or removing, since background steps are retried.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create and start both containers. Returns `(container1_id, container2_id)`.
    async fn create_bridge_containers(
        &self,
        spec: &BridgeContainerSpec,
        keys: &KeyMaterial,
    ) -> Result<(String, String), RuntimeError>;

    async fn delete_bridge_containers(
        &self,
        container1_id: &str,
        container2_id: &str,
    ) -> Result<(), RuntimeError>;

    async fn stop_bridge_containers(
        &self,
        container1_id: &str,
        container2_id: &str,
    ) -> Result<(), RuntimeError>;

    /// Stop then start both containers.
    async fn resume_bridge_containers(
        &self,
        container1_id: &str,
        container2_id: &str,
    ) -> Result<(), RuntimeError>;

    async fn inspect(&self, container_id: &str) -> Result<ContainerNetwork, RuntimeError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::domain::bridge::{escape_key, NewBridge};

    #[test]
    fn test_spec_names_and_labels() {
        let bridge = NewBridge {
            bridge_id: BridgeId::new(),
            account_id: AccountId::new("acct-1"),
            username: "barbar".to_string(),
            name: "foo".to_string(),
            namespace: "foo.bridges.example.com".to_string(),
            ssh_key_name: "foo-bridge".to_string(),
            ssh_key_id: "/barbar/keys/aa:bb".to_string(),
            ssh_key: escape_key("line1\nline2\n"),
            directory_map: "*:/stor/*".to_string(),
        }
        .into_bridge(Utc::now());

        let spec = BridgeContainerSpec::from_bridge(&bridge);
        assert_eq!(spec.container_name(1), format!("bridge-{}-1", bridge.bridge_id));
        assert_eq!(spec.cns_service(), "acct-1-foo.bridges.example.com-bridge");
        assert_eq!(spec.labels()["accountId"], "acct-1");

        let keys = KeyMaterial::from_bridge(&bridge);
        assert_eq!(keys.private_key, "line1\nline2\n");
        assert!(!format!("{:?}", keys).contains("line1"));
    }
}
