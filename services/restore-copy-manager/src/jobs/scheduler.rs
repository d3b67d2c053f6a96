// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Delayed copy scheduler
//!
//! Restored objects are only readable once the archive retrieval finishes,
//! which the completion signal does not guarantee. Each sweep therefore
//! waits a delay past `completed_at` before submitting the copy job for a
//! ledger entry. The delay depends on the retrieval tier and on the archive
//! selection recorded with the entry, never on the selection configured at
//! sweep time.
//!
//! The copy runs over the succeeded task results of the restore's
//! completion report, so objects whose restore failed are never copied.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use restore_copy_types::{
    CopyJobStatus, CopySubmission, LedgerEntry, ObjectLocation, SweepFailure, SweepReport,
};

use super::JobError;
use super::report::{CompletionReport, concat_results};
use super::submitter::BulkJobSubmitter;
use crate::clients::ManifestStore;
use crate::config::{DelayTable, ManagerConfig};
use crate::ledger::{JobLedger, LedgerUpdate};
use crate::metrics;

const COPY_MANIFEST_PREFIX: &str = "copy-manifests";

/// Earliest time a copy may be submitted for an entry
pub fn ready_at(entry: &LedgerEntry, delays: &DelayTable) -> DateTime<Utc> {
    let tiers = delays.for_selection(entry.archive_selection);
    entry.completed_at + tiers.delay(entry.retrieval_tier)
}

/// Combined copy manifest for a restore whose report lists several
/// succeeded result files
pub fn copy_manifest_location(config: &ManagerConfig, restore_job_id: &str) -> ObjectLocation {
    ObjectLocation::new(
        config.manifest_bucket.clone(),
        format!("{}/{}.csv", COPY_MANIFEST_PREFIX, restore_job_id),
    )
}

pub struct CopyScheduler {
    ledger: Arc<dyn JobLedger>,
    store: Arc<dyn ManifestStore>,
    submitter: BulkJobSubmitter,
}

impl CopyScheduler {
    pub fn new(
        ledger: Arc<dyn JobLedger>,
        store: Arc<dyn ManifestStore>,
        submitter: BulkJobSubmitter,
    ) -> Self {
        Self {
            ledger,
            store,
            submitter,
        }
    }

    pub async fn sweep(&self, config: &ManagerConfig) -> Result<SweepReport, JobError> {
        self.sweep_at(config, Utc::now()).await
    }

    /// Run one sweep as of `now`.
    ///
    /// Only a failed scan fails the sweep; per-entry failures are reported.
    pub async fn sweep_at(
        &self,
        config: &ManagerConfig,
        now: DateTime<Utc>,
    ) -> Result<SweepReport, JobError> {
        let mut report = SweepReport::default();

        match self.ledger.purge_expired(now).await {
            Ok(purged) => report.purged = purged,
            Err(e) => warn!(error = %e, "Failed to purge expired ledger entries"),
        }

        let entries = self
            .ledger
            .scan(Some(CopyJobStatus::NotStarted), config.ledger_page_size)
            .await?;
        report.scanned = entries.len();

        for entry in entries {
            if entry.copy_job_status != CopyJobStatus::NotStarted {
                continue;
            }

            let ready = ready_at(&entry, &config.delays);
            if now < ready {
                debug!(
                    job_id = %entry.job_id,
                    ready_at = %ready,
                    "Copy not yet due"
                );
                report.deferred += 1;
                continue;
            }

            match self.submit(config, &entry).await {
                Ok(copy_job_id) => report.submitted.push(CopySubmission {
                    restore_job_id: entry.job_id.clone(),
                    copy_job_id,
                }),
                Err(e) => {
                    warn!(job_id = %entry.job_id, error = %e, "Copy submission failed");
                    report.failures.push(SweepFailure {
                        restore_job_id: entry.job_id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            scanned = report.scanned,
            deferred = report.deferred,
            submitted = report.submitted.len(),
            failed = report.failures.len(),
            purged = report.purged,
            "Sweep complete"
        );

        Ok(report)
    }

    /// Locate the manifest of rows whose restore succeeded.
    ///
    /// A single succeeded result file is used as is; several are joined into
    /// one manifest. `None` means the report lists no succeeded tasks.
    async fn copy_manifest(
        &self,
        config: &ManagerConfig,
        entry: &LedgerEntry,
    ) -> Result<Option<ObjectLocation>, JobError> {
        let report_location = entry.report.as_ref().ok_or_else(|| {
            JobError::Submission(format!(
                "restore job {} has no completion report",
                entry.job_id
            ))
        })?;
        let body = self.store.get(report_location).await?;
        let mut succeeded = CompletionReport::parse(report_location, &body)?.succeeded();

        if succeeded.len() <= 1 {
            return Ok(succeeded.pop());
        }

        let mut parts = Vec::with_capacity(succeeded.len());
        for result in &succeeded {
            parts.push(self.store.get(result).await?);
        }
        let location = copy_manifest_location(config, &entry.job_id);
        self.store.put(&location, concat_results(&parts)).await?;
        debug!(
            job_id = %entry.job_id,
            results = succeeded.len(),
            manifest = %location,
            "Joined succeeded results into copy manifest"
        );
        Ok(Some(location))
    }

    async fn submit(
        &self,
        config: &ManagerConfig,
        entry: &LedgerEntry,
    ) -> Result<String, JobError> {
        let Some(manifest) = self.copy_manifest(config, entry).await? else {
            let update = LedgerUpdate {
                copy_job_status: Some(CopyJobStatus::DoNotProceed),
                ..Default::default()
            };
            self.ledger
                .update(&entry.job_id, &[CopyJobStatus::NotStarted], &update)
                .await
                .inspect_err(|_| metrics::record_ledger_write_failure())?;
            return Err(JobError::InvalidState(format!(
                "completion report for {} lists no succeeded tasks; copy will not proceed",
                entry.job_id
            )));
        };

        let copy_job_id = self
            .submitter
            .submit_copy(
                config,
                &manifest,
                entry.manifest_fields,
                &config.copy_storage_class,
                &entry.job_id,
            )
            .await?;

        let update = LedgerUpdate {
            copy_job_status: Some(CopyJobStatus::Submitted),
            copy_job_id: Some(copy_job_id.clone()),
            ..Default::default()
        };

        if let Err(e) = self
            .ledger
            .update(&entry.job_id, &[CopyJobStatus::NotStarted], &update)
            .await
        {
            metrics::record_ledger_write_failure();
            warn!(
                job_id = %entry.job_id,
                copy_job_id = %copy_job_id,
                error = %e,
                "Copy job submitted but ledger not updated"
            );
            return Err(e.into());
        }

        Ok(copy_job_id)
    }
}

/// Sweep on a fixed interval until the process exits.
///
/// Each tick uses the configuration current at that tick.
pub async fn run_periodic(
    scheduler: Arc<CopyScheduler>,
    config: watch::Receiver<ManagerConfig>,
    interval: std::time::Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let snapshot = config.borrow().clone();
        if let Err(e) = scheduler.sweep(&snapshot).await {
            warn!(error = %e, "Periodic sweep failed");
        }
    }
}
