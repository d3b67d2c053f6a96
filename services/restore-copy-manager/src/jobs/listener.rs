// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Completion listener
//!
//! Turns bulk job completion signals into ledger writes. The signal only
//! names the job; status, counters, manifest and correlation tag are read
//! back from the bulk-operation service. Jobs without this workflow's tag
//! belong to someone else and are ignored.
//!
//! A restore job also carries the archive selection of the run that
//! submitted it. The selection is stored in the ledger so the copy delay
//! survives configuration reloads; an untagged restore waits for the slowest
//! archive class.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use restore_copy_types::{
    ArchiveSelection, CompletionEvent, CompletionOutcome, CopyJobStatus, JobStatus, LedgerEntry,
    ObjectLocation, OperationKind, RetrievalTier, TaskCounters,
};

use super::JobError;
use super::submitter::archive_selection_tag;
use crate::clients::bulk::{BulkOperation, JobDescription};
use crate::clients::notify::{Notifier, notify};
use crate::clients::BulkService;
use crate::config::ManagerConfig;
use crate::ledger::{JobLedger, LedgerError, LedgerUpdate};
use crate::metrics;

fn report_text(report: Option<&ObjectLocation>) -> String {
    report
        .map(|r| r.to_string())
        .unwrap_or_else(|| "(no report)".to_string())
}

fn counters_text(counters: &TaskCounters) -> String {
    format!(
        "{} total, {} succeeded, {} failed",
        counters.total_tasks, counters.tasks_succeeded, counters.tasks_failed
    )
}

/// Archive selection a restore job was tagged with
fn recorded_selection(config: &ManagerConfig, description: &JobDescription) -> ArchiveSelection {
    let key = archive_selection_tag(&config.job_tag_key);
    match description.tag(&key).map(str::parse::<ArchiveSelection>) {
        Some(Ok(selection)) => selection,
        Some(Err(e)) => {
            warn!(
                job_id = %description.job_id,
                error = %e,
                "Unrecognized archive selection tag"
            );
            ArchiveSelection::default()
        }
        None => {
            warn!(job_id = %description.job_id, "Restore job has no archive selection tag");
            ArchiveSelection::default()
        }
    }
}

pub struct CompletionListener {
    bulk: Arc<dyn BulkService>,
    ledger: Arc<dyn JobLedger>,
    notifier: Arc<dyn Notifier>,
}

impl CompletionListener {
    pub fn new(
        bulk: Arc<dyn BulkService>,
        ledger: Arc<dyn JobLedger>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            bulk,
            ledger,
            notifier,
        }
    }

    pub async fn handle(
        &self,
        config: &ManagerConfig,
        event: &CompletionEvent,
    ) -> Result<CompletionOutcome, JobError> {
        self.handle_at(config, event, Utc::now()).await
    }

    pub async fn handle_at(
        &self,
        config: &ManagerConfig,
        event: &CompletionEvent,
        now: DateTime<Utc>,
    ) -> Result<CompletionOutcome, JobError> {
        let job_id = event.resolve_job_id().ok_or_else(|| {
            JobError::InvalidState("completion event does not identify a job".to_string())
        })?;

        let description = self
            .bulk
            .describe_job(&job_id)
            .await
            .map_err(|e| JobError::Service(format!("describe {}: {}", job_id, e)))?;

        let Some(tag) = description.tag(&config.job_tag_key).map(str::to_string) else {
            return Ok(CompletionOutcome::Ignored {
                job_id,
                reason: format!("job has no {} tag", config.job_tag_key),
            });
        };

        let status = description.job_status();
        if !status.is_terminal() {
            return Ok(CompletionOutcome::Ignored {
                job_id,
                reason: format!("job is {}", description.status),
            });
        }

        let counters = TaskCounters::from(description.progress);
        counters.validate().map_err(|e| {
            JobError::InvalidState(format!("job {} reported inconsistent counters: {}", job_id, e))
        })?;

        let report = description.report.clone().or_else(|| event.report.clone());

        match (&description.operation, status) {
            (BulkOperation::Restore { tier, .. }, JobStatus::Complete) => {
                self.restore_complete(config, &description, *tier, &tag, counters, report, now)
                    .await
            }
            (BulkOperation::Restore { .. }, _) => {
                warn!(job_id = %job_id, job_group_id = %tag, "Restore job failed");
                notify(
                    self.notifier.as_ref(),
                    &config.notify_topic,
                    "Restore job failed",
                    &format!(
                        "Restore job {} failed ({}). Report: {}",
                        job_id,
                        counters_text(&counters),
                        report_text(report.as_ref())
                    ),
                )
                .await;
                Ok(CompletionOutcome::RestoreFailed { job_id })
            }
            (BulkOperation::Copy { .. }, JobStatus::Complete) => {
                self.copy_complete(config, &job_id, &tag, counters, report, now)
                    .await
            }
            (BulkOperation::Copy { .. }, _) => {
                warn!(job_id = %job_id, restore_job_id = %tag, "Copy job failed");
                notify(
                    self.notifier.as_ref(),
                    &config.notify_topic,
                    "Copy job failed",
                    &format!(
                        "Copy job {} for restore job {} failed ({}). Report: {}",
                        job_id,
                        tag,
                        counters_text(&counters),
                        report_text(report.as_ref())
                    ),
                )
                .await;
                Ok(CompletionOutcome::CopyFailed {
                    restore_job_id: tag,
                    copy_job_id: job_id,
                })
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn restore_complete(
        &self,
        config: &ManagerConfig,
        description: &JobDescription,
        tier: RetrievalTier,
        job_group_id: &str,
        counters: TaskCounters,
        report: Option<ObjectLocation>,
        now: DateTime<Utc>,
    ) -> Result<CompletionOutcome, JobError> {
        let job_id = description.job_id.clone();
        let copy_job_status = if counters.all_failed() {
            CopyJobStatus::DoNotProceed
        } else {
            CopyJobStatus::NotStarted
        };

        let entry = LedgerEntry {
            job_id: job_id.clone(),
            job_status: JobStatus::Complete,
            operation: OperationKind::Restore,
            retrieval_tier: tier,
            archive_selection: recorded_selection(config, description),
            manifest: description.manifest.location.clone(),
            manifest_fields: u8::try_from(description.manifest.fields.len()).unwrap_or(2),
            report: report.clone(),
            job_group_id: Some(job_group_id.to_string()),
            created_at: description.created_at,
            completed_at: description.completed_at.unwrap_or(now),
            counters,
            copy_job_status,
            copy_job_id: None,
            copy_counters: None,
            expires_at: None,
        };

        let created = match self.ledger.create(&entry).await {
            Ok(created) => created,
            Err(e) => {
                metrics::record_ledger_write_failure();
                warn!(job_id = %job_id, error = %e, "Failed to record restore job");
                notify(
                    self.notifier.as_ref(),
                    &config.notify_topic,
                    "Restore job recording failed",
                    &format!(
                        "Restore job {} of workflow {} completed ({}) but was not recorded: {}",
                        job_id,
                        job_group_id,
                        counters_text(&counters),
                        e
                    ),
                )
                .await;
                return Err(e.into());
            }
        };

        if !created {
            info!(job_id = %job_id, "Restore job already recorded");
            return Ok(CompletionOutcome::RestoreAlreadyRecorded { job_id });
        }

        info!(
            job_id = %job_id,
            job_group_id = %job_group_id,
            copy_job_status = %copy_job_status,
            "Restore job recorded"
        );

        let subject = match copy_job_status {
            CopyJobStatus::DoNotProceed => "Restore job complete, all tasks failed",
            _ => "Restore job complete",
        };
        notify(
            self.notifier.as_ref(),
            &config.notify_topic,
            subject,
            &format!(
                "Restore job {} complete ({}). Copy status: {}. Report: {}",
                job_id,
                counters_text(&counters),
                copy_job_status,
                report_text(report.as_ref())
            ),
        )
        .await;

        Ok(CompletionOutcome::RestoreRecorded {
            job_id,
            copy_job_status,
        })
    }

    async fn copy_complete(
        &self,
        config: &ManagerConfig,
        copy_job_id: &str,
        restore_job_id: &str,
        counters: TaskCounters,
        report: Option<ObjectLocation>,
        now: DateTime<Utc>,
    ) -> Result<CompletionOutcome, JobError> {
        let update = LedgerUpdate {
            copy_job_status: Some(CopyJobStatus::Complete),
            copy_job_id: Some(copy_job_id.to_string()),
            copy_counters: Some(counters),
            expires_at: Some(now + Duration::days(i64::from(config.ledger_retention_days))),
            ..Default::default()
        };

        // NotStarted is accepted for a copy whose submission was not
        // recorded because the scheduler's ledger write failed.
        let expected = [CopyJobStatus::Submitted, CopyJobStatus::NotStarted];
        match self.ledger.update(restore_job_id, &expected, &update).await {
            Ok(_) => {}
            Err(LedgerError::Conflict {
                actual: CopyJobStatus::Complete,
                ..
            }) => {
                return Ok(CompletionOutcome::Ignored {
                    job_id: copy_job_id.to_string(),
                    reason: "copy already recorded".to_string(),
                });
            }
            Err(e) => {
                metrics::record_ledger_write_failure();
                warn!(
                    copy_job_id = %copy_job_id,
                    restore_job_id = %restore_job_id,
                    error = %e,
                    "Failed to record copy completion"
                );
                return Err(e.into());
            }
        }

        info!(
            copy_job_id = %copy_job_id,
            restore_job_id = %restore_job_id,
            "Copy job recorded"
        );

        notify(
            self.notifier.as_ref(),
            &config.notify_topic,
            "Copy job complete",
            &format!(
                "Copy job {} for restore job {} complete ({}). Report: {}",
                copy_job_id,
                restore_job_id,
                counters_text(&counters),
                report_text(report.as_ref())
            ),
        )
        .await;

        Ok(CompletionOutcome::CopyRecorded {
            restore_job_id: restore_job_id.to_string(),
            copy_job_id: copy_job_id.to_string(),
        })
    }
}
