// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Bridge Error Taxonomy
//!
//! Errors surfaced to callers of the synchronous phase of any lifecycle or
//! account operation. Background-phase failures never take this path; they
//! are recorded on the provisioning job and in the logs instead.

use thiserror::Error;

use crate::domain::dns::DnsError;
use crate::domain::key_issuer::KeyIssuerError;
use crate::domain::repository::RepositoryError;
use crate::domain::runtime::RuntimeError;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// Bad caller input
    #[error("{0}")]
    Validation(String),

    /// No row matches the id/name within the caller's account
    #[error("{0}")]
    NotFound(String),

    /// Requested transition is incompatible with the current status
    #[error("{0}")]
    Conflict(String),

    /// Missing caller identity or insufficient privilege
    #[error("{0}")]
    Unauthorized(String),

    /// Invariant violation or collaborator failure
    #[error("{0}")]
    Internal(String),
}

impl BridgeError {
    /// Label carried in `errors[].extensions.code` of API responses.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Validation(_) => "ValidationError",
            Self::NotFound(_) => "NotFoundError",
            Self::Conflict(_) => "ConflictError",
            Self::Unauthorized(_) => "UnauthorizedError",
            Self::Internal(_) => "InternalError",
        }
    }

    pub fn unauthorized() -> Self {
        Self::Unauthorized("Unauthorized".to_string())
    }
}

impl From<RepositoryError> for BridgeError {
    fn from(err: RepositoryError) -> Self {
        BridgeError::Internal(format!("repository: {}", err))
    }
}

impl From<KeyIssuerError> for BridgeError {
    fn from(err: KeyIssuerError) -> Self {
        BridgeError::Internal(format!("key issuer: {}", err))
    }
}

impl From<RuntimeError> for BridgeError {
    fn from(err: RuntimeError) -> Self {
        BridgeError::Internal(format!("container runtime: {}", err))
    }
}

impl From<DnsError> for BridgeError {
    fn from(err: DnsError) -> Self {
        BridgeError::Internal(format!("dns: {}", err))
    }
}
