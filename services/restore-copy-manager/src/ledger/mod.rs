// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Job ledger
//!
//! Durable record of every restore job this workflow has seen and the state
//! of its copy phase. Entries are keyed by the restore job id; statuses are
//! plain attributes. Every mutation names the copy statuses it expects to
//! find, so a caller working from a stale read gets [`LedgerError::Conflict`]
//! instead of overwriting a newer state.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use restore_copy_types::{CopyJobStatus, JobId, JobStatus, LedgerEntry, TaskCounters};

pub use memory::MemoryLedger;
pub use postgres::PostgresLedger;

/// Ledger errors
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger connection error: {0}")]
    Connection(String),

    #[error("Ledger query error: {0}")]
    Query(String),

    #[error("Ledger entry not found: {0}")]
    NotFound(String),

    #[error("Ledger entry {job_id} is {actual}, expected one of {expected:?}")]
    Conflict {
        job_id: JobId,
        expected: Vec<CopyJobStatus>,
        actual: CopyJobStatus,
    },
}

impl From<tokio_postgres::Error> for LedgerError {
    fn from(e: tokio_postgres::Error) -> Self {
        LedgerError::Query(e.to_string())
    }
}

impl From<deadpool_postgres::PoolError> for LedgerError {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        LedgerError::Connection(e.to_string())
    }
}

/// Partial update of a ledger entry. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerUpdate {
    pub job_status: Option<JobStatus>,
    pub copy_job_status: Option<CopyJobStatus>,
    pub copy_job_id: Option<JobId>,
    pub copy_counters: Option<TaskCounters>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl LedgerUpdate {
    pub fn is_empty(&self) -> bool {
        *self == LedgerUpdate::default()
    }

    /// Apply the named fields to an entry
    pub fn apply(&self, entry: &mut LedgerEntry) {
        if let Some(status) = self.job_status {
            entry.job_status = status;
        }
        if let Some(status) = self.copy_job_status {
            entry.copy_job_status = status;
        }
        if let Some(id) = &self.copy_job_id {
            entry.copy_job_id = Some(id.clone());
        }
        if let Some(counters) = self.copy_counters {
            entry.copy_counters = Some(counters);
        }
        if let Some(expires_at) = self.expires_at {
            entry.expires_at = Some(expires_at);
        }
    }
}

/// One page of a ledger scan.
#[derive(Debug, Clone, Default)]
pub struct LedgerPage {
    pub entries: Vec<LedgerEntry>,
    /// Pass back to `scan_page` to continue; `None` once exhausted
    pub continuation: Option<JobId>,
}

#[async_trait]
pub trait JobLedger: Send + Sync {
    /// Create or overwrite an entry
    async fn put(&self, entry: &LedgerEntry) -> Result<(), LedgerError>;

    /// Create an entry unless one already exists for its job id.
    ///
    /// Returns `false`, leaving the stored entry untouched, on a duplicate.
    async fn create(&self, entry: &LedgerEntry) -> Result<bool, LedgerError>;

    async fn get(&self, job_id: &str) -> Result<LedgerEntry, LedgerError>;

    /// Read up to `limit` entries ordered by job id, starting after
    /// `continuation`
    async fn scan_page(
        &self,
        filter: Option<CopyJobStatus>,
        continuation: Option<&str>,
        limit: usize,
    ) -> Result<LedgerPage, LedgerError>;

    /// Atomically apply `update` if the entry's copy status is in `expected`.
    ///
    /// Returns the updated entry.
    async fn update(
        &self,
        job_id: &str,
        expected: &[CopyJobStatus],
        update: &LedgerUpdate,
    ) -> Result<LedgerEntry, LedgerError>;

    /// Delete entries whose expiry is at or before `now`
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, LedgerError>;

    /// Read every matching entry, following continuations until exhausted
    async fn scan(
        &self,
        filter: Option<CopyJobStatus>,
        page_size: usize,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let page_size = page_size.max(1);
        let mut entries = Vec::new();
        let mut continuation: Option<JobId> = None;

        loop {
            let page = self
                .scan_page(filter, continuation.as_deref(), page_size)
                .await?;
            entries.extend(page.entries);

            match page.continuation {
                Some(next) => continuation = Some(next),
                None => break,
            }
        }

        Ok(entries)
    }
}
