// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the repository traits defined in
//! `crate::domain::repository`.
//!
//! # Available Implementations
//!
//! ## PostgreSQL Repositories
//!
//! - **PostgresBridgeRepository** - `bridges` rows and status compare-and-swap
//! - **PostgresAccountRepository** - `accounts` allow-list
//! - **PostgresUsageRepository** - `bridge_usage` intervals
//! - **PostgresJobRepository** - `provisioning_jobs`
//!
//! ## In-Memory Repositories
//!
//! Lock-guarded maps with the same semantics, for development and tests.
//!
//! # Usage
//!
//! ```no_run
//! # async fn example(database_url: &str) -> Result<(), Box<dyn std::error::Error>> {
//! use bridge_core::infrastructure::repositories::PostgresBridgeRepository;
//!
//! let pool = sqlx::PgPool::connect(database_url).await?;
//! let repo = PostgresBridgeRepository::new(pool);
//! # Ok(())
//! # }
//! ```

pub mod postgres_account;
pub mod postgres_bridge;
pub mod postgres_job;
pub mod postgres_usage;

pub use postgres_account::PostgresAccountRepository;
pub use postgres_bridge::PostgresBridgeRepository;
pub use postgres_job::PostgresJobRepository;
pub use postgres_usage::PostgresUsageRepository;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::account::Account;
use crate::domain::bridge::{AccountId, Bridge, BridgeId, BridgeStatus, NewBridge};
use crate::domain::job::{JobId, ProvisioningJob};
use crate::domain::repository::{
    AccountRepository, BridgeRepository, JobRepository, RepositoryError, UsageRepository,
};
use crate::domain::usage::BridgeUsage;

#[derive(Clone, Default)]
pub struct InMemoryBridgeRepository {
    bridges: Arc<RwLock<HashMap<BridgeId, Bridge>>>,
}

impl InMemoryBridgeRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BridgeRepository for InMemoryBridgeRepository {
    async fn insert_bridge(&self, bridge: &NewBridge) -> Result<u64, RepositoryError> {
        let mut bridges = self.bridges.write();
        let name_taken = bridges.values().any(|b| b.name == bridge.name);
        if name_taken || bridges.contains_key(&bridge.bridge_id) {
            return Ok(0);
        }
        bridges.insert(bridge.bridge_id, bridge.clone().into_bridge(Utc::now()));
        Ok(1)
    }

    async fn get_bridge(
        &self,
        id: BridgeId,
        account_id: &AccountId,
    ) -> Result<Option<Bridge>, RepositoryError> {
        let bridges = self.bridges.read();
        Ok(bridges
            .get(&id)
            .filter(|b| &b.account_id == account_id)
            .cloned())
    }

    async fn get_bridge_by_name(
        &self,
        name: &str,
        account_id: &AccountId,
    ) -> Result<Option<Bridge>, RepositoryError> {
        let bridges = self.bridges.read();
        let mut matches = bridges
            .values()
            .filter(|b| b.name == name && &b.account_id == account_id);
        let first = matches.next().cloned();
        if matches.next().is_some() {
            return Err(RepositoryError::Integrity(format!(
                "more than one bridge named '{}'",
                name
            )));
        }
        Ok(first)
    }

    async fn list_bridges_by_account(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<Bridge>, RepositoryError> {
        let bridges = self.bridges.read();
        let mut list: Vec<Bridge> = bridges
            .values()
            .filter(|b| &b.account_id == account_id)
            .cloned()
            .collect();
        list.sort_by_key(|b| b.created_at);
        Ok(list)
    }

    async fn delete_bridge(
        &self,
        id: BridgeId,
        account_id: &AccountId,
    ) -> Result<u64, RepositoryError> {
        let mut bridges = self.bridges.write();
        match bridges.get(&id) {
            Some(b) if &b.account_id == account_id => {
                bridges.remove(&id);
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn update_bridge_status(
        &self,
        id: BridgeId,
        account_id: &AccountId,
        expected: &[BridgeStatus],
        status: BridgeStatus,
    ) -> Result<u64, RepositoryError> {
        let mut bridges = self.bridges.write();
        match bridges.get_mut(&id) {
            Some(b) if &b.account_id == account_id && expected.contains(&b.status) => {
                b.status = status;
                b.updated_at = Utc::now();
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn update_bridge_containers(
        &self,
        id: BridgeId,
        account_id: &AccountId,
        container1_id: &str,
        container2_id: &str,
    ) -> Result<u64, RepositoryError> {
        let mut bridges = self.bridges.write();
        match bridges.get_mut(&id) {
            Some(b) if &b.account_id == account_id => {
                b.container1_id = Some(container1_id.to_string());
                b.container2_id = Some(container2_id.to_string());
                b.updated_at = Utc::now();
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn does_bridge_exist_by_name(&self, name: &str) -> Result<bool, RepositoryError> {
        let bridges = self.bridges.read();
        Ok(bridges.values().any(|b| b.name == name))
    }
}

#[derive(Clone, Default)]
pub struct InMemoryAccountRepository {
    accounts: Arc<RwLock<HashMap<AccountId, Account>>>,
}

impl InMemoryAccountRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountRepository for InMemoryAccountRepository {
    async fn get_account(
        &self,
        account_id: &AccountId,
    ) -> Result<Option<Account>, RepositoryError> {
        Ok(self.accounts.read().get(account_id).cloned())
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, RepositoryError> {
        let mut list: Vec<Account> = self.accounts.read().values().cloned().collect();
        list.sort_by(|a, b| a.account_id.0.cmp(&b.account_id.0));
        Ok(list)
    }

    async fn create_account(&self, account: &Account) -> Result<u64, RepositoryError> {
        self.accounts
            .write()
            .insert(account.account_id.clone(), account.clone());
        Ok(1)
    }

    async fn update_account(&self, account: &Account) -> Result<u64, RepositoryError> {
        let mut accounts = self.accounts.write();
        match accounts.get_mut(&account.account_id) {
            Some(existing) => {
                existing.is_admin = account.is_admin;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete_account(&self, account_id: &AccountId) -> Result<(u64, bool), RepositoryError> {
        match self.accounts.write().remove(account_id) {
            Some(removed) => Ok((1, removed.is_admin)),
            None => Ok((0, false)),
        }
    }
}

#[derive(Clone, Default)]
pub struct InMemoryUsageRepository {
    usage: Arc<RwLock<Vec<BridgeUsage>>>,
}

impl InMemoryUsageRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UsageRepository for InMemoryUsageRepository {
    async fn start_usage(
        &self,
        bridge_id: BridgeId,
        account_id: &AccountId,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut usage = self.usage.write();
        if usage.iter().any(|u| u.bridge_id == bridge_id && u.is_open()) {
            return Ok(());
        }
        usage.push(BridgeUsage::open(bridge_id, account_id.clone(), at));
        Ok(())
    }

    async fn stop_usage(
        &self,
        bridge_id: BridgeId,
        at: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let mut usage = self.usage.write();
        let mut rows = 0;
        for interval in usage.iter_mut().filter(|u| u.bridge_id == bridge_id && u.is_open()) {
            interval.stopped = Some(at);
            rows += 1;
        }
        Ok(rows)
    }

    async fn list_usage_by_account(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<BridgeUsage>, RepositoryError> {
        Ok(self
            .usage
            .read()
            .iter()
            .filter(|u| &u.account_id == account_id)
            .cloned()
            .collect())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryJobRepository {
    jobs: Arc<RwLock<HashMap<JobId, ProvisioningJob>>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn sorted(mut jobs: Vec<ProvisioningJob>) -> Vec<ProvisioningJob> {
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn save(&self, job: &ProvisioningJob) -> Result<(), RepositoryError> {
        self.jobs.write().insert(job.id, job.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: JobId) -> Result<Option<ProvisioningJob>, RepositoryError> {
        Ok(self.jobs.read().get(&id).cloned())
    }

    async fn find_by_bridge(
        &self,
        bridge_id: BridgeId,
    ) -> Result<Vec<ProvisioningJob>, RepositoryError> {
        let jobs = self
            .jobs
            .read()
            .values()
            .filter(|j| j.bridge_id == bridge_id)
            .cloned()
            .collect();
        Ok(Self::sorted(jobs))
    }

    async fn find_unfinished(&self) -> Result<Vec<ProvisioningJob>, RepositoryError> {
        let jobs = self
            .jobs
            .read()
            .values()
            .filter(|j| !j.status.is_finished())
            .cloned()
            .collect();
        Ok(Self::sorted(jobs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bridge::escape_key;

    fn new_bridge(name: &str, account: &str) -> NewBridge {
        NewBridge {
            bridge_id: BridgeId::new(),
            account_id: AccountId::new(account),
            username: "barbar".to_string(),
            name: name.to_string(),
            namespace: format!("{}.example.com", name),
            ssh_key_name: format!("{}-bridge", name),
            ssh_key_id: "/barbar/keys/aa".to_string(),
            ssh_key: escape_key("key\n"),
            directory_map: "*:/stor/*".to_string(),
        }
    }

    #[tokio::test]
    async fn test_bridge_queries_are_account_scoped() {
        let repo = InMemoryBridgeRepository::new();
        let bridge = new_bridge("foo", "a");
        assert_eq!(repo.insert_bridge(&bridge).await.unwrap(), 1);

        let a = AccountId::new("a");
        let b = AccountId::new("b");
        assert!(repo.get_bridge(bridge.bridge_id, &a).await.unwrap().is_some());
        assert!(repo.get_bridge(bridge.bridge_id, &b).await.unwrap().is_none());
        assert!(repo.get_bridge_by_name("foo", &b).await.unwrap().is_none());
        assert_eq!(repo.delete_bridge(bridge.bridge_id, &b).await.unwrap(), 0);
        assert_eq!(
            repo.update_bridge_status(
                bridge.bridge_id,
                &b,
                &[BridgeStatus::Starting],
                BridgeStatus::Running,
            )
            .await
            .unwrap(),
            0
        );
        assert!(repo.does_bridge_exist_by_name("foo").await.unwrap());
    }

    #[tokio::test]
    async fn test_insert_refuses_taken_name() {
        let repo = InMemoryBridgeRepository::new();
        assert_eq!(repo.insert_bridge(&new_bridge("foo", "a")).await.unwrap(), 1);
        assert_eq!(repo.insert_bridge(&new_bridge("foo", "b")).await.unwrap(), 0);
        assert_eq!(repo.insert_bridge(&new_bridge("bar", "b")).await.unwrap(), 1);

        let b = AccountId::new("b");
        assert!(repo.get_bridge_by_name("foo", &b).await.unwrap().is_none());
        assert_eq!(repo.list_bridges_by_account(&b).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_status_update_is_compare_and_swap() {
        let repo = InMemoryBridgeRepository::new();
        let bridge = new_bridge("foo", "a");
        let account = bridge.account_id.clone();
        repo.insert_bridge(&bridge).await.unwrap();

        let rows = repo
            .update_bridge_status(
                bridge.bridge_id,
                &account,
                &[BridgeStatus::Stopping],
                BridgeStatus::Stopped,
            )
            .await
            .unwrap();
        assert_eq!(rows, 0);

        let rows = repo
            .update_bridge_status(
                bridge.bridge_id,
                &account,
                &[BridgeStatus::Starting],
                BridgeStatus::Running,
            )
            .await
            .unwrap();
        assert_eq!(rows, 1);
        let stored = repo.get_bridge(bridge.bridge_id, &account).await.unwrap().unwrap();
        assert_eq!(stored.status, BridgeStatus::Running);
    }

    #[tokio::test]
    async fn test_usage_intervals() {
        let repo = InMemoryUsageRepository::new();
        let bridge_id = BridgeId::new();
        let account = AccountId::new("a");
        let started = Utc::now();

        repo.start_usage(bridge_id, &account, started).await.unwrap();
        repo.start_usage(bridge_id, &account, Utc::now()).await.unwrap();
        assert_eq!(repo.list_usage_by_account(&account).await.unwrap().len(), 1);

        assert_eq!(repo.stop_usage(bridge_id, Utc::now()).await.unwrap(), 1);
        assert_eq!(repo.stop_usage(bridge_id, Utc::now()).await.unwrap(), 0);

        let usage = repo.list_usage_by_account(&account).await.unwrap();
        assert_eq!(usage[0].started, started);
        assert!(usage[0].stopped.is_some());
    }

    #[tokio::test]
    async fn test_delete_account_reports_admin_flag() {
        let repo = InMemoryAccountRepository::new();
        repo.create_account(&Account::new(AccountId::new("root"), true)).await.unwrap();
        assert_eq!(repo.delete_account(&AccountId::new("root")).await.unwrap(), (1, true));
        assert_eq!(repo.delete_account(&AccountId::new("root")).await.unwrap(), (0, false));
    }
}
