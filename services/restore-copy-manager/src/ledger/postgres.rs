// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! PostgreSQL job ledger using tokio-postgres
//!
//! One row per restore job, keyed by job id. Scans use keyset pagination on
//! the key so a continuation stays valid while other rows change status.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Config, Pool, Runtime};
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Row};
use tracing::debug;

use restore_copy_types::{CopyJobStatus, LedgerEntry, ObjectLocation, TaskCounters};

use super::{JobLedger, LedgerError, LedgerPage, LedgerUpdate};

const ENTRY_COLUMNS: &str = "job_id, job_status, operation, retrieval_tier, \
     manifest_bucket, manifest_key, manifest_fields, report_bucket, report_key, \
     job_group_id, created_at, completed_at, total_tasks, tasks_succeeded, tasks_failed, \
     copy_job_status, copy_job_id, copy_total_tasks, copy_tasks_succeeded, \
     copy_tasks_failed, expires_at, archive_selection";

type SqlParam = Box<dyn ToSql + Sync + Send>;

fn to_i64(value: u64, column: &str) -> Result<i64, LedgerError> {
    i64::try_from(value)
        .map_err(|_| LedgerError::Query(format!("{} out of range: {}", column, value)))
}

fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn parse_column<T>(row: &Row, column: &str) -> Result<T, LedgerError>
where
    T: std::str::FromStr,
{
    let raw: String = row.try_get(column)?;
    raw.parse()
        .map_err(|_| LedgerError::Query(format!("invalid {} value: {}", column, raw)))
}

fn entry_from_row(row: &Row) -> Result<LedgerEntry, LedgerError> {
    let report = match (
        row.try_get::<_, Option<String>>("report_bucket")?,
        row.try_get::<_, Option<String>>("report_key")?,
    ) {
        (Some(bucket), Some(key)) => Some(ObjectLocation { bucket, key }),
        _ => None,
    };

    let copy_counters = match (
        row.try_get::<_, Option<i64>>("copy_total_tasks")?,
        row.try_get::<_, Option<i64>>("copy_tasks_succeeded")?,
        row.try_get::<_, Option<i64>>("copy_tasks_failed")?,
    ) {
        (Some(total), Some(succeeded), Some(failed)) => Some(TaskCounters::new(
            to_u64(total),
            to_u64(succeeded),
            to_u64(failed),
        )),
        _ => None,
    };

    let manifest_fields: i16 = row.try_get("manifest_fields")?;

    Ok(LedgerEntry {
        job_id: row.try_get("job_id")?,
        job_status: parse_column(row, "job_status")?,
        operation: parse_column(row, "operation")?,
        retrieval_tier: parse_column(row, "retrieval_tier")?,
        archive_selection: parse_column(row, "archive_selection")?,
        manifest: ObjectLocation {
            bucket: row.try_get("manifest_bucket")?,
            key: row.try_get("manifest_key")?,
        },
        manifest_fields: u8::try_from(manifest_fields).unwrap_or(2),
        report,
        job_group_id: row.try_get("job_group_id")?,
        created_at: row.try_get("created_at")?,
        completed_at: row.try_get("completed_at")?,
        counters: TaskCounters::new(
            to_u64(row.try_get("total_tasks")?),
            to_u64(row.try_get("tasks_succeeded")?),
            to_u64(row.try_get("tasks_failed")?),
        ),
        copy_job_status: parse_column(row, "copy_job_status")?,
        copy_job_id: row.try_get("copy_job_id")?,
        copy_counters,
        expires_at: row.try_get("expires_at")?,
    })
}

/// Render the SET clause and parameters for a partial update.
///
/// Parameters are numbered from `$1`; the caller appends its own after.
fn update_assignments(update: &LedgerUpdate) -> Result<(Vec<String>, Vec<SqlParam>), LedgerError> {
    let mut sets: Vec<String> = Vec::new();
    let mut params: Vec<SqlParam> = Vec::new();

    let mut push = |column: &str, param: SqlParam| {
        params.push(param);
        sets.push(format!("{} = ${}", column, params.len()));
    };

    if let Some(status) = update.job_status {
        push("job_status", Box::new(status.to_string()));
    }
    if let Some(status) = update.copy_job_status {
        push("copy_job_status", Box::new(status.to_string()));
    }
    if let Some(id) = &update.copy_job_id {
        push("copy_job_id", Box::new(id.clone()));
    }
    if let Some(counters) = update.copy_counters {
        push(
            "copy_total_tasks",
            Box::new(to_i64(counters.total_tasks, "copy_total_tasks")?),
        );
        push(
            "copy_tasks_succeeded",
            Box::new(to_i64(counters.tasks_succeeded, "copy_tasks_succeeded")?),
        );
        push(
            "copy_tasks_failed",
            Box::new(to_i64(counters.tasks_failed, "copy_tasks_failed")?),
        );
    }
    if let Some(expires_at) = update.expires_at {
        push("expires_at", Box::new(expires_at));
    }

    Ok((sets, params))
}

/// Ledger stored in PostgreSQL
pub struct PostgresLedger {
    pool: Pool,
}

impl PostgresLedger {
    /// Create a connection pool from a URL and make sure the table exists
    pub async fn connect(database_url: &str) -> Result<Self, LedgerError> {
        let pg_config: tokio_postgres::Config = database_url
            .parse()
            .map_err(|e| LedgerError::Connection(format!("Invalid database URL: {}", e)))?;

        let mut cfg = Config::new();
        if let Some(host) = pg_config.get_hosts().first() {
            match host {
                tokio_postgres::config::Host::Tcp(host) => {
                    cfg.host = Some(host.clone());
                }
                tokio_postgres::config::Host::Unix(path) => {
                    cfg.host = Some(path.to_string_lossy().to_string());
                }
            }
        }
        if let Some(port) = pg_config.get_ports().first() {
            cfg.port = Some(*port);
        }
        if let Some(user) = pg_config.get_user() {
            cfg.user = Some(user.to_string());
        }
        if let Some(password) = pg_config.get_password() {
            cfg.password = Some(String::from_utf8_lossy(password).to_string());
        }
        if let Some(dbname) = pg_config.get_dbname() {
            cfg.dbname = Some(dbname.to_string());
        }

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| LedgerError::Connection(format!("Failed to create pool: {}", e)))?;

        let ledger = Self { pool };
        ledger.init_schema().await?;
        Ok(ledger)
    }

    async fn init_schema(&self) -> Result<(), LedgerError> {
        let client = self.pool.get().await?;

        client
            .batch_execute(
                r#"
                CREATE TABLE IF NOT EXISTS restore_copy_jobs (
                    job_id TEXT PRIMARY KEY,
                    job_status TEXT NOT NULL
                        CHECK(job_status IN ('Pending', 'Complete', 'Failed')),
                    operation TEXT NOT NULL,
                    retrieval_tier TEXT NOT NULL,
                    manifest_bucket TEXT NOT NULL,
                    manifest_key TEXT NOT NULL,
                    manifest_fields SMALLINT NOT NULL,
                    report_bucket TEXT,
                    report_key TEXT,
                    job_group_id TEXT,
                    created_at TIMESTAMPTZ NOT NULL,
                    completed_at TIMESTAMPTZ NOT NULL,
                    total_tasks BIGINT NOT NULL,
                    tasks_succeeded BIGINT NOT NULL,
                    tasks_failed BIGINT NOT NULL,
                    copy_job_status TEXT NOT NULL
                        CHECK(copy_job_status IN ('NotStarted', 'Submitted', 'Complete', 'DoNotProceed')),
                    copy_job_id TEXT,
                    copy_total_tasks BIGINT,
                    copy_tasks_succeeded BIGINT,
                    copy_tasks_failed BIGINT,
                    expires_at TIMESTAMPTZ,
                    archive_selection TEXT NOT NULL DEFAULT 'GLACIER_AND_DEEP_ARCHIVE'
                );

                ALTER TABLE restore_copy_jobs
                    ADD COLUMN IF NOT EXISTS archive_selection TEXT NOT NULL
                    DEFAULT 'GLACIER_AND_DEEP_ARCHIVE';

                CREATE INDEX IF NOT EXISTS idx_restore_copy_jobs_copy_status
                    ON restore_copy_jobs(copy_job_status, job_id);
                CREATE INDEX IF NOT EXISTS idx_restore_copy_jobs_expires
                    ON restore_copy_jobs(expires_at);
                "#,
            )
            .await?;

        debug!("Ledger schema initialized");
        Ok(())
    }

    async fn write(&self, entry: &LedgerEntry, overwrite: bool) -> Result<u64, LedgerError> {
        let client = self.pool.get().await?;

        let conflict = if overwrite {
            "ON CONFLICT (job_id) DO UPDATE SET
                job_status = EXCLUDED.job_status,
                operation = EXCLUDED.operation,
                retrieval_tier = EXCLUDED.retrieval_tier,
                manifest_bucket = EXCLUDED.manifest_bucket,
                manifest_key = EXCLUDED.manifest_key,
                manifest_fields = EXCLUDED.manifest_fields,
                report_bucket = EXCLUDED.report_bucket,
                report_key = EXCLUDED.report_key,
                job_group_id = EXCLUDED.job_group_id,
                created_at = EXCLUDED.created_at,
                completed_at = EXCLUDED.completed_at,
                total_tasks = EXCLUDED.total_tasks,
                tasks_succeeded = EXCLUDED.tasks_succeeded,
                tasks_failed = EXCLUDED.tasks_failed,
                copy_job_status = EXCLUDED.copy_job_status,
                copy_job_id = EXCLUDED.copy_job_id,
                copy_total_tasks = EXCLUDED.copy_total_tasks,
                copy_tasks_succeeded = EXCLUDED.copy_tasks_succeeded,
                copy_tasks_failed = EXCLUDED.copy_tasks_failed,
                expires_at = EXCLUDED.expires_at,
                archive_selection = EXCLUDED.archive_selection"
        } else {
            "ON CONFLICT (job_id) DO NOTHING"
        };

        let sql = format!(
            "INSERT INTO restore_copy_jobs ({ENTRY_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                     $16, $17, $18, $19, $20, $21, $22)
             {conflict}"
        );

        let copy = entry.copy_counters;
        let copy_total = copy
            .map(|c| to_i64(c.total_tasks, "copy_total_tasks"))
            .transpose()?;
        let copy_succeeded = copy
            .map(|c| to_i64(c.tasks_succeeded, "copy_tasks_succeeded"))
            .transpose()?;
        let copy_failed = copy
            .map(|c| to_i64(c.tasks_failed, "copy_tasks_failed"))
            .transpose()?;

        let written = client
            .execute(
                &sql,
                &[
                    &entry.job_id,
                    &entry.job_status.to_string(),
                    &entry.operation.to_string(),
                    &entry.retrieval_tier.to_string(),
                    &entry.manifest.bucket,
                    &entry.manifest.key,
                    &i16::from(entry.manifest_fields),
                    &entry.report.as_ref().map(|r| r.bucket.clone()),
                    &entry.report.as_ref().map(|r| r.key.clone()),
                    &entry.job_group_id,
                    &entry.created_at,
                    &entry.completed_at,
                    &to_i64(entry.counters.total_tasks, "total_tasks")?,
                    &to_i64(entry.counters.tasks_succeeded, "tasks_succeeded")?,
                    &to_i64(entry.counters.tasks_failed, "tasks_failed")?,
                    &entry.copy_job_status.to_string(),
                    &entry.copy_job_id,
                    &copy_total,
                    &copy_succeeded,
                    &copy_failed,
                    &entry.expires_at,
                    &entry.archive_selection.to_string(),
                ],
            )
            .await?;

        Ok(written)
    }
}

#[async_trait]
impl JobLedger for PostgresLedger {
    async fn put(&self, entry: &LedgerEntry) -> Result<(), LedgerError> {
        self.write(entry, true).await?;
        Ok(())
    }

    async fn create(&self, entry: &LedgerEntry) -> Result<bool, LedgerError> {
        Ok(self.write(entry, false).await? == 1)
    }

    async fn get(&self, job_id: &str) -> Result<LedgerEntry, LedgerError> {
        let client = self.pool.get().await?;

        let row = client
            .query_opt(
                &format!("SELECT {ENTRY_COLUMNS} FROM restore_copy_jobs WHERE job_id = $1"),
                &[&job_id],
            )
            .await?
            .ok_or_else(|| LedgerError::NotFound(job_id.to_string()))?;

        entry_from_row(&row)
    }

    async fn scan_page(
        &self,
        filter: Option<CopyJobStatus>,
        continuation: Option<&str>,
        limit: usize,
    ) -> Result<LedgerPage, LedgerError> {
        let client = self.pool.get().await?;
        let status = filter.map(|s| s.to_string());
        let after = continuation.unwrap_or("");
        let limit_param = to_i64(limit as u64, "limit")?;

        let rows = client
            .query(
                &format!(
                    "SELECT {ENTRY_COLUMNS} FROM restore_copy_jobs
                     WHERE ($1::TEXT IS NULL OR copy_job_status = $1)
                       AND job_id > $2
                     ORDER BY job_id
                     LIMIT $3"
                ),
                &[&status, &after, &limit_param],
            )
            .await?;

        let entries = rows
            .iter()
            .map(entry_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        let continuation = if entries.len() == limit {
            entries.last().map(|e| e.job_id.clone())
        } else {
            None
        };

        Ok(LedgerPage {
            entries,
            continuation,
        })
    }

    async fn update(
        &self,
        job_id: &str,
        expected: &[CopyJobStatus],
        update: &LedgerUpdate,
    ) -> Result<LedgerEntry, LedgerError> {
        let (sets, mut params) = update_assignments(update)?;
        if sets.is_empty() {
            return self.get(job_id).await;
        }

        params.push(Box::new(job_id.to_string()));
        let key_param = params.len();
        params.push(Box::new(
            expected.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
        ));
        let expected_param = params.len();

        let sql = format!(
            "UPDATE restore_copy_jobs SET {}
             WHERE job_id = ${} AND copy_job_status = ANY(${})
             RETURNING {ENTRY_COLUMNS}",
            sets.join(", "),
            key_param,
            expected_param,
        );

        let client = self.pool.get().await?;
        let refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        match client.query_opt(&sql, &refs).await? {
            Some(row) => entry_from_row(&row),
            None => {
                // Either the row is gone or its status moved on
                let current = self.get(job_id).await?;
                Err(LedgerError::Conflict {
                    job_id: job_id.to_string(),
                    expected: expected.to_vec(),
                    actual: current.copy_job_status,
                })
            }
        }
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, LedgerError> {
        let client = self.pool.get().await?;

        let purged = client
            .execute(
                "DELETE FROM restore_copy_jobs WHERE expires_at IS NOT NULL AND expires_at <= $1",
                &[&now],
            )
            .await?;

        Ok(purged)
    }
}
