// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Postgres Account Repository
//!
//! Table `accounts (account_id text primary key, is_admin boolean)`.

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;

use crate::domain::account::Account;
use crate::domain::bridge::AccountId;
use crate::domain::repository::{AccountRepository, RepositoryError};

pub struct PostgresAccountRepository {
    pool: PgPool,
}

impl PostgresAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountRepository for PostgresAccountRepository {
    async fn get_account(
        &self,
        account_id: &AccountId,
    ) -> Result<Option<Account>, RepositoryError> {
        let row = sqlx::query("SELECT account_id, is_admin FROM accounts WHERE account_id = $1")
            .bind(account_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| -> Result<Account, RepositoryError> {
            let id: String = row.try_get("account_id")?;
            Ok(Account::new(AccountId::new(id), row.try_get("is_admin")?))
        })
        .transpose()
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, RepositoryError> {
        let rows = sqlx::query("SELECT account_id, is_admin FROM accounts ORDER BY account_id")
            .fetch_all(&self.pool)
            .await?;

        let mut accounts = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.try_get("account_id")?;
            accounts.push(Account::new(AccountId::new(id), row.try_get("is_admin")?));
        }
        Ok(accounts)
    }

    async fn create_account(&self, account: &Account) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r#"
            INSERT INTO accounts (account_id, is_admin)
            VALUES ($1, $2)
            ON CONFLICT (account_id) DO UPDATE SET is_admin = EXCLUDED.is_admin
            "#,
        )
        .bind(account.account_id.as_str())
        .bind(account.is_admin)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn update_account(&self, account: &Account) -> Result<u64, RepositoryError> {
        let result = sqlx::query("UPDATE accounts SET is_admin = $2 WHERE account_id = $1")
            .bind(account.account_id.as_str())
            .bind(account.is_admin)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_account(&self, account_id: &AccountId) -> Result<(u64, bool), RepositoryError> {
        let rows = sqlx::query("DELETE FROM accounts WHERE account_id = $1 RETURNING is_admin")
            .bind(account_id.as_str())
            .fetch_all(&self.pool)
            .await?;

        let was_admin = match rows.first() {
            Some(row) => row.try_get("is_admin")?,
            None => false,
        };
        Ok((rows.len() as u64, was_admin))
    }
}
