// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A key as registered by the issuer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedKey {
    pub name: String,
    /// Missing when the issuer accepted the key but did not report one
    #[serde(default)]
    pub fingerprint: Option<String>,
}

#[derive(Debug, Error)]
pub enum KeyIssuerError {
    #[error("Key issuer request failed: {0}")]
    Request(String),
    #[error("Key issuer rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("Key not found: {0}")]
    NotFound(String),
    #[error("Signing failed: {0}")]
    Signing(String),
}

/// External account-management API that mints and revokes SSH keys.
#[async_trait]
pub trait KeyIssuer: Send + Sync {
    /// Register `public_key` (OpenSSH format) under `name`.
    async fn create_ssh_key(
        &self,
        name: &str,
        public_key: &str,
    ) -> Result<IssuedKey, KeyIssuerError>;

    async fn delete_ssh_key(&self, name: &str) -> Result<(), KeyIssuerError>;
}
