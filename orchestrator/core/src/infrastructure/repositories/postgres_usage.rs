// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Postgres Usage Repository
//!
//! Table `bridge_usage (id uuid, bridge_id uuid, account_id text,
//! started timestamptz, stopped timestamptz null)`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::Row;
use uuid::Uuid;

use crate::domain::bridge::{AccountId, BridgeId};
use crate::domain::repository::{RepositoryError, UsageRepository};
use crate::domain::usage::BridgeUsage;

pub struct PostgresUsageRepository {
    pool: PgPool,
}

impl PostgresUsageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UsageRepository for PostgresUsageRepository {
    async fn start_usage(
        &self,
        bridge_id: BridgeId,
        account_id: &AccountId,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO bridge_usage (id, bridge_id, account_id, started)
            SELECT $1, $2, $3, $4
            WHERE NOT EXISTS (
                SELECT 1 FROM bridge_usage WHERE bridge_id = $2 AND stopped IS NULL
            )
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(bridge_id.0)
        .bind(account_id.as_str())
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn stop_usage(
        &self,
        bridge_id: BridgeId,
        at: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE bridge_usage SET stopped = $2 WHERE bridge_id = $1 AND stopped IS NULL",
        )
        .bind(bridge_id.0)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn list_usage_by_account(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<BridgeUsage>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, bridge_id, account_id, started, stopped
            FROM bridge_usage
            WHERE account_id = $1
            ORDER BY started ASC
            "#,
        )
        .bind(account_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut usage = Vec::with_capacity(rows.len());
        for row in rows {
            let bridge_id: Uuid = row.try_get("bridge_id")?;
            let account_id: String = row.try_get("account_id")?;
            usage.push(BridgeUsage {
                id: row.try_get("id")?,
                bridge_id: BridgeId(bridge_id),
                account_id: AccountId::new(account_id),
                started: row.try_get("started")?,
                stopped: row.try_get("stopped")?,
            });
        }
        Ok(usage)
    }
}
