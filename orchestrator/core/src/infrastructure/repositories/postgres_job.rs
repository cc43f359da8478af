// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Postgres Job Repository
//!
//! Table `provisioning_jobs (id uuid primary key, bridge_id uuid,
//! account_id text, kind text, status text, attempts integer,
//! last_error text null, created_at timestamptz, updated_at timestamptz)`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use uuid::Uuid;

use crate::domain::bridge::{AccountId, BridgeId};
use crate::domain::job::{JobId, JobKind, JobStatus, ProvisioningJob};
use crate::domain::repository::{JobRepository, RepositoryError};

const JOB_COLUMNS: &str =
    "id, bridge_id, account_id, kind, status, attempts, last_error, created_at, updated_at";

pub struct PostgresJobRepository {
    pool: PgPool,
}

impl PostgresJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRepository for PostgresJobRepository {
    async fn save(&self, job: &ProvisioningJob) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO provisioning_jobs (
                id, bridge_id, account_id, kind, status, attempts,
                last_error, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                attempts = EXCLUDED.attempts,
                last_error = EXCLUDED.last_error,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(job.id.0)
        .bind(job.bridge_id.0)
        .bind(job.account_id.as_str())
        .bind(job.kind.as_str())
        .bind(job.status.as_str())
        .bind(job.attempts as i32)
        .bind(job.last_error.as_deref())
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to save job: {}", e)))?;

        Ok(())
    }

    async fn find_by_id(&self, id: JobId) -> Result<Option<ProvisioningJob>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM provisioning_jobs WHERE id = $1",
            JOB_COLUMNS
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(parse_job_row).transpose()
    }

    async fn find_by_bridge(
        &self,
        bridge_id: BridgeId,
    ) -> Result<Vec<ProvisioningJob>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM provisioning_jobs WHERE bridge_id = $1 ORDER BY created_at ASC",
            JOB_COLUMNS
        ))
        .bind(bridge_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(parse_job_row).collect()
    }

    async fn find_unfinished(&self) -> Result<Vec<ProvisioningJob>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM provisioning_jobs WHERE status IN ('pending', 'running') \
             ORDER BY created_at ASC",
            JOB_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(parse_job_row).collect()
    }
}

fn parse_job_row(row: PgRow) -> Result<ProvisioningJob, RepositoryError> {
    let id: Uuid = row.try_get("id")?;
    let bridge_id: Uuid = row.try_get("bridge_id")?;
    let account_id: String = row.try_get("account_id")?;
    let kind: String = row.try_get("kind")?;
    let status: String = row.try_get("status")?;
    let attempts: i32 = row.try_get("attempts")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

    Ok(ProvisioningJob {
        id: JobId(id),
        bridge_id: BridgeId(bridge_id),
        account_id: AccountId::new(account_id),
        kind: JobKind::parse(&kind)
            .ok_or_else(|| RepositoryError::Serialization(format!("unknown job kind '{}'", kind)))?,
        status: JobStatus::parse(&status)
            .ok_or_else(|| {
                RepositoryError::Serialization(format!("unknown job status '{}'", status))
            })?,
        attempts: attempts.max(0) as u32,
        last_error: row.try_get("last_error")?,
        created_at,
        updated_at,
    })
}
