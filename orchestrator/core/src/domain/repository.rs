// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts for each aggregate, defined in the domain layer and
//! implemented in `crate::infrastructure::repositories`.
//!
//! | Trait | Aggregate | Implementations |
//! |-------|-----------|----------------|
//! | `BridgeRepository` | `Bridge` | `InMemoryBridgeRepository`, `PostgresBridgeRepository` |
//! | `AccountRepository` | `Account` | `InMemoryAccountRepository`, `PostgresAccountRepository` |
//! | `UsageRepository` | `BridgeUsage` | `InMemoryUsageRepository`, `PostgresUsageRepository` |
//! | `JobRepository` | `ProvisioningJob` | `InMemoryJobRepository`, `PostgresJobRepository` |
//!
//! Every bridge query is scoped by `(bridge_id, account_id)`, so a caller can
//! never reach another account's rows whatever ids it supplies. Mutations
//! report the number of affected rows; the orchestrator decides what a count
//! other than the expected one means.
//!
//! Status updates are compare-and-swap: they only apply when the current
//! status is one of `expected`, which is what keeps two lifecycle calls on the
//! same bridge from both acting on a stale read.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::account::Account;
use crate::domain::bridge::{AccountId, Bridge, BridgeId, BridgeStatus, NewBridge};
use crate::domain::job::{JobId, ProvisioningJob};
use crate::domain::usage::BridgeUsage;

/// Storage backend enum for pluggable persistence
#[derive(Debug, Clone)]
pub enum StorageBackend {
    InMemory,
    PostgreSQL(PostgresConfig),
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub connection_string: String,
    pub max_connections: u32,
}

#[async_trait]
pub trait BridgeRepository: Send + Sync {
    /// Insert a new row in `STARTING`. Returns rows affected, 0 when the name
    /// is already taken by any account.
    async fn insert_bridge(&self, bridge: &NewBridge) -> Result<u64, RepositoryError>;

    /// Errors with `Integrity` if more than one row matches.
    async fn get_bridge(
        &self,
        id: BridgeId,
        account_id: &AccountId,
    ) -> Result<Option<Bridge>, RepositoryError>;

    async fn get_bridge_by_name(
        &self,
        name: &str,
        account_id: &AccountId,
    ) -> Result<Option<Bridge>, RepositoryError>;

    async fn list_bridges_by_account(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<Bridge>, RepositoryError>;

    async fn delete_bridge(
        &self,
        id: BridgeId,
        account_id: &AccountId,
    ) -> Result<u64, RepositoryError>;

    /// Set `status` only if the current status is in `expected`.
    async fn update_bridge_status(
        &self,
        id: BridgeId,
        account_id: &AccountId,
        expected: &[BridgeStatus],
        status: BridgeStatus,
    ) -> Result<u64, RepositoryError>;

    async fn update_bridge_containers(
        &self,
        id: BridgeId,
        account_id: &AccountId,
        container1_id: &str,
        container2_id: &str,
    ) -> Result<u64, RepositoryError>;

    /// Name check across all accounts; names are unique among live bridges.
    async fn does_bridge_exist_by_name(&self, name: &str) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn get_account(&self, account_id: &AccountId) -> Result<Option<Account>, RepositoryError>;

    async fn list_accounts(&self) -> Result<Vec<Account>, RepositoryError>;

    /// Insert, or overwrite `is_admin` of an existing row. Returns rows affected.
    async fn create_account(&self, account: &Account) -> Result<u64, RepositoryError>;

    async fn update_account(&self, account: &Account) -> Result<u64, RepositoryError>;

    /// Returns rows deleted and whether the deleted row was an admin.
    async fn delete_account(&self, account_id: &AccountId) -> Result<(u64, bool), RepositoryError>;
}

#[async_trait]
pub trait UsageRepository: Send + Sync {
    /// Open a usage interval unless one is already open for the bridge.
    async fn start_usage(
        &self,
        bridge_id: BridgeId,
        account_id: &AccountId,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// Close the open interval, if any. Returns rows affected.
    async fn stop_usage(
        &self,
        bridge_id: BridgeId,
        at: DateTime<Utc>,
    ) -> Result<u64, RepositoryError>;

    async fn list_usage_by_account(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<BridgeUsage>, RepositoryError>;
}

#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Save job (create or update)
    async fn save(&self, job: &ProvisioningJob) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: JobId) -> Result<Option<ProvisioningJob>, RepositoryError>;

    /// Jobs for a bridge, oldest first
    async fn find_by_bridge(
        &self,
        bridge_id: BridgeId,
    ) -> Result<Vec<ProvisioningJob>, RepositoryError>;

    /// `Pending` and `Running` jobs, oldest first (startup recovery)
    async fn find_unfinished(&self) -> Result<Vec<ProvisioningJob>, RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A lookup that must match at most one row matched several.
    #[error("Integrity violation: {0}")]
    Integrity(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
