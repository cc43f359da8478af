// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Account administration. Every operation except [`AccountService::ensure_allowed`]
//! and [`AccountService::seed_accounts`] requires the caller's own row to carry
//! `is_admin`.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::domain::account::{Account, DeletedAccount};
use crate::domain::bridge::AccountId;
use crate::domain::error::BridgeError;
use crate::domain::repository::AccountRepository;

#[async_trait]
pub trait AccountService: Send + Sync {
    /// The caller's account row, or `Unauthorized` if it is not allowed.
    async fn ensure_allowed(&self, caller: &AccountId) -> Result<Account, BridgeError>;

    /// Upsert the configured allow-list. Returns the number of accounts written.
    async fn seed_accounts(&self, accounts: &[(AccountId, bool)]) -> Result<usize, BridgeError>;

    async fn get_account(
        &self,
        caller: &AccountId,
        id: &AccountId,
    ) -> Result<Option<Account>, BridgeError>;

    async fn list_accounts(&self, caller: &AccountId) -> Result<Vec<Account>, BridgeError>;

    async fn create_account(
        &self,
        caller: &AccountId,
        account: Account,
    ) -> Result<Account, BridgeError>;

    async fn update_account(
        &self,
        caller: &AccountId,
        account: Account,
    ) -> Result<Account, BridgeError>;

    async fn delete_account(
        &self,
        caller: &AccountId,
        id: &AccountId,
    ) -> Result<DeletedAccount, BridgeError>;
}

pub struct StandardAccountService {
    accounts: Arc<dyn AccountRepository>,
}

impl StandardAccountService {
    pub fn new(accounts: Arc<dyn AccountRepository>) -> Self {
        Self { accounts }
    }

    async fn require_admin(&self, caller: &AccountId) -> Result<(), BridgeError> {
        match self.accounts.get_account(caller).await? {
            Some(account) if account.is_admin => Ok(()),
            _ => Err(BridgeError::unauthorized()),
        }
    }
}

#[async_trait]
impl AccountService for StandardAccountService {
    async fn ensure_allowed(&self, caller: &AccountId) -> Result<Account, BridgeError> {
        self.accounts
            .get_account(caller)
            .await?
            .ok_or_else(BridgeError::unauthorized)
    }

    async fn seed_accounts(&self, accounts: &[(AccountId, bool)]) -> Result<usize, BridgeError> {
        for (account_id, is_admin) in accounts {
            self.accounts
                .create_account(&Account::new(account_id.clone(), *is_admin))
                .await?;
        }
        info!("Seeded {} accounts", accounts.len());
        Ok(accounts.len())
    }

    async fn get_account(
        &self,
        caller: &AccountId,
        id: &AccountId,
    ) -> Result<Option<Account>, BridgeError> {
        self.require_admin(caller).await?;
        Ok(self.accounts.get_account(id).await?)
    }

    async fn list_accounts(&self, caller: &AccountId) -> Result<Vec<Account>, BridgeError> {
        self.require_admin(caller).await?;
        Ok(self.accounts.list_accounts().await?)
    }

    async fn create_account(
        &self,
        caller: &AccountId,
        account: Account,
    ) -> Result<Account, BridgeError> {
        self.require_admin(caller).await?;
        if account.account_id.as_str().trim().is_empty() {
            return Err(BridgeError::Validation("account id is required".to_string()));
        }
        self.accounts.create_account(&account).await?;
        info!(account_id = %account.account_id, is_admin = account.is_admin, "Account created");
        Ok(account)
    }

    async fn update_account(
        &self,
        caller: &AccountId,
        account: Account,
    ) -> Result<Account, BridgeError> {
        self.require_admin(caller).await?;
        let rows = self.accounts.update_account(&account).await?;
        match rows {
            0 => Err(BridgeError::NotFound(format!("account {} not found", account.account_id))),
            1 => {
                info!(
                    account_id = %account.account_id,
                    is_admin = account.is_admin,
                    "Account updated"
                );
                Ok(account)
            }
            n => Err(BridgeError::Internal(format!(
                "updating account {} affected {} rows",
                account.account_id, n
            ))),
        }
    }

    async fn delete_account(
        &self,
        caller: &AccountId,
        id: &AccountId,
    ) -> Result<DeletedAccount, BridgeError> {
        self.require_admin(caller).await?;
        let (rows, was_admin) = self.accounts.delete_account(id).await?;
        match rows {
            0 => Err(BridgeError::NotFound(format!("account {} not found", id))),
            1 => {
                info!(account_id = %id, was_admin, "Account deleted");
                Ok(DeletedAccount {
                    account_id: id.clone(),
                    was_admin,
                })
            }
            n => Err(BridgeError::Internal(format!("deleting account {} affected {} rows", id, n))),
        }
    }
}
