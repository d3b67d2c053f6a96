// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! In-memory ledger for tests and single-process dry runs

use std::collections::BTreeMap;
use std::ops::Bound;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use restore_copy_types::{CopyJobStatus, LedgerEntry};

use super::{JobLedger, LedgerError, LedgerPage, LedgerUpdate};

#[derive(Default)]
pub struct MemoryLedger {
    entries: Mutex<BTreeMap<String, LedgerEntry>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl JobLedger for MemoryLedger {
    async fn put(&self, entry: &LedgerEntry) -> Result<(), LedgerError> {
        self.entries
            .lock()
            .await
            .insert(entry.job_id.clone(), entry.clone());
        Ok(())
    }

    async fn create(&self, entry: &LedgerEntry) -> Result<bool, LedgerError> {
        let mut entries = self.entries.lock().await;
        if entries.contains_key(&entry.job_id) {
            return Ok(false);
        }
        entries.insert(entry.job_id.clone(), entry.clone());
        Ok(true)
    }

    async fn get(&self, job_id: &str) -> Result<LedgerEntry, LedgerError> {
        self.entries
            .lock()
            .await
            .get(job_id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(job_id.to_string()))
    }

    async fn scan_page(
        &self,
        filter: Option<CopyJobStatus>,
        continuation: Option<&str>,
        limit: usize,
    ) -> Result<LedgerPage, LedgerError> {
        let entries = self.entries.lock().await;
        let lower = match continuation {
            Some(after) => Bound::Excluded(after.to_string()),
            None => Bound::Unbounded,
        };

        let page: Vec<LedgerEntry> = entries
            .range((lower, Bound::Unbounded))
            .map(|(_, entry)| entry)
            .filter(|entry| filter.is_none_or(|status| entry.copy_job_status == status))
            .take(limit)
            .cloned()
            .collect();

        let continuation = if page.len() == limit {
            page.last().map(|entry| entry.job_id.clone())
        } else {
            None
        };

        Ok(LedgerPage {
            entries: page,
            continuation,
        })
    }

    async fn update(
        &self,
        job_id: &str,
        expected: &[CopyJobStatus],
        update: &LedgerUpdate,
    ) -> Result<LedgerEntry, LedgerError> {
        let mut entries = self.entries.lock().await;
        let entry = entries
            .get_mut(job_id)
            .ok_or_else(|| LedgerError::NotFound(job_id.to_string()))?;

        if !expected.contains(&entry.copy_job_status) {
            return Err(LedgerError::Conflict {
                job_id: job_id.to_string(),
                expected: expected.to_vec(),
                actual: entry.copy_job_status,
            });
        }

        update.apply(entry);
        Ok(entry.clone())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, LedgerError> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at.is_none_or(|at| at > now));
        Ok((before - entries.len()) as u64)
    }
}
