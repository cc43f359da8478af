// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Postgres Bridge Repository
//!
//! Expects a `bridges` table with columns
//! `bridge_id uuid, account_id text, username text, name text, namespace text,
//! ssh_key_name text, ssh_key_id text, ssh_key text, directory_map text,
//! container1_id text null, container2_id text null, status text,
//! created_at timestamptz, updated_at timestamptz`.
//!
//! Status updates carry the expected prior states in the `WHERE` clause, so
//! the row count tells the caller whether the transition applied. Inserts do
//! the same for the name: a taken name inserts nothing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use uuid::Uuid;

use crate::domain::bridge::{AccountId, Bridge, BridgeId, BridgeStatus, NewBridge};
use crate::domain::repository::{BridgeRepository, RepositoryError};

const BRIDGE_COLUMNS: &str = "bridge_id, account_id, username, name, namespace, ssh_key_name, \
     ssh_key_id, ssh_key, directory_map, container1_id, container2_id, status, created_at, \
     updated_at";

pub struct PostgresBridgeRepository {
    pool: PgPool,
}

impl PostgresBridgeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BridgeRepository for PostgresBridgeRepository {
    async fn insert_bridge(&self, bridge: &NewBridge) -> Result<u64, RepositoryError> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO bridges (
                bridge_id, account_id, username, name, namespace,
                ssh_key_name, ssh_key_id, ssh_key, directory_map,
                status, created_at, updated_at
            )
            SELECT $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11
            WHERE NOT EXISTS (SELECT 1 FROM bridges WHERE name = $4)
            "#,
        )
        .bind(bridge.bridge_id.0)
        .bind(bridge.account_id.as_str())
        .bind(&bridge.username)
        .bind(&bridge.name)
        .bind(&bridge.namespace)
        .bind(&bridge.ssh_key_name)
        .bind(&bridge.ssh_key_id)
        .bind(&bridge.ssh_key)
        .bind(&bridge.directory_map)
        .bind(BridgeStatus::Starting.as_str())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to insert bridge: {}", e)))?;

        Ok(result.rows_affected())
    }

    async fn get_bridge(
        &self,
        id: BridgeId,
        account_id: &AccountId,
    ) -> Result<Option<Bridge>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM bridges WHERE bridge_id = $1 AND account_id = $2",
            BRIDGE_COLUMNS
        ))
        .bind(id.0)
        .bind(account_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        at_most_one(rows, || format!("bridge {}", id))
    }

    async fn get_bridge_by_name(
        &self,
        name: &str,
        account_id: &AccountId,
    ) -> Result<Option<Bridge>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM bridges WHERE name = $1 AND account_id = $2",
            BRIDGE_COLUMNS
        ))
        .bind(name)
        .bind(account_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        at_most_one(rows, || format!("bridge named '{}'", name))
    }

    async fn list_bridges_by_account(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<Bridge>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM bridges WHERE account_id = $1 ORDER BY created_at ASC",
            BRIDGE_COLUMNS
        ))
        .bind(account_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(parse_bridge_row).collect()
    }

    async fn delete_bridge(
        &self,
        id: BridgeId,
        account_id: &AccountId,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM bridges WHERE bridge_id = $1 AND account_id = $2")
            .bind(id.0)
            .bind(account_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn update_bridge_status(
        &self,
        id: BridgeId,
        account_id: &AccountId,
        expected: &[BridgeStatus],
        status: BridgeStatus,
    ) -> Result<u64, RepositoryError> {
        let expected: Vec<&str> = expected.iter().map(BridgeStatus::as_str).collect();
        let result = sqlx::query(
            r#"
            UPDATE bridges
            SET status = $3, updated_at = $4
            WHERE bridge_id = $1 AND account_id = $2 AND status = ANY($5)
            "#,
        )
        .bind(id.0)
        .bind(account_id.as_str())
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(expected)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn update_bridge_containers(
        &self,
        id: BridgeId,
        account_id: &AccountId,
        container1_id: &str,
        container2_id: &str,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE bridges
            SET container1_id = $3, container2_id = $4, updated_at = $5
            WHERE bridge_id = $1 AND account_id = $2
            "#,
        )
        .bind(id.0)
        .bind(account_id.as_str())
        .bind(container1_id)
        .bind(container2_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn does_bridge_exist_by_name(&self, name: &str) -> Result<bool, RepositoryError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM bridges WHERE name = $1)")
                .bind(name)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }
}

fn at_most_one<F>(rows: Vec<PgRow>, what: F) -> Result<Option<Bridge>, RepositoryError>
where
    F: FnOnce() -> String,
{
    if rows.len() > 1 {
        return Err(RepositoryError::Integrity(format!(
            "{} matched {} rows",
            what(),
            rows.len()
        )));
    }
    rows.into_iter().next().map(parse_bridge_row).transpose()
}

fn parse_bridge_row(row: PgRow) -> Result<Bridge, RepositoryError> {
    let bridge_id: Uuid = row.try_get("bridge_id")?;
    let account_id: String = row.try_get("account_id")?;
    let status: String = row.try_get("status")?;
    let status = BridgeStatus::parse(&status)
        .ok_or_else(|| {
            RepositoryError::Serialization(format!("unknown bridge status '{}'", status))
        })?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

    Ok(Bridge {
        bridge_id: BridgeId(bridge_id),
        account_id: AccountId::new(account_id),
        username: row.try_get("username")?,
        name: row.try_get("name")?,
        namespace: row.try_get("namespace")?,
        ssh_key_name: row.try_get("ssh_key_name")?,
        ssh_key_id: row.try_get("ssh_key_id")?,
        ssh_key: row.try_get("ssh_key")?,
        directory_map: row.try_get("directory_map")?,
        container1_id: row.try_get("container1_id")?,
        container2_id: row.try_get("container2_id")?,
        status,
        created_at,
        updated_at,
    })
}
