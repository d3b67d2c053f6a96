// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Bulk job submitter
//!
//! Builds restore and copy job requests over a manifest. The manifest's
//! fingerprint is read from the object store immediately before every
//! submission.
//!
//! Restore jobs are tagged with their job group id and with the archive
//! selection of the run, which the completion listener copies into the
//! ledger. Copy jobs are tagged with the restore job id.

use std::sync::Arc;

use tracing::{error, info};
use uuid::Uuid;

use restore_copy_types::{ArchiveSelection, JobId, ObjectLocation, manifest_fields};

use super::JobError;
use super::report::result_fields;
use crate::clients::bulk::{BulkOperation, JobRequest, JobTag, ManifestSpec, ReportSpec};
use crate::clients::{BulkService, ManifestStore};
use crate::config::ManagerConfig;
use crate::metrics;

const RESTORE_REPORT_PREFIX: &str = "restore-reports";
const COPY_REPORT_PREFIX: &str = "copy-reports";

/// Key of the restore job tag carrying the run's archive selection
pub fn archive_selection_tag(job_tag_key: &str) -> String {
    format!("{}-archive-selection", job_tag_key)
}

#[derive(Clone)]
pub struct BulkJobSubmitter {
    bulk: Arc<dyn BulkService>,
    store: Arc<dyn ManifestStore>,
}

impl BulkJobSubmitter {
    pub fn new(bulk: Arc<dyn BulkService>, store: Arc<dyn ManifestStore>) -> Self {
        Self { bulk, store }
    }

    async fn manifest_spec(
        &self,
        manifest: &ObjectLocation,
        fields: Vec<String>,
    ) -> Result<ManifestSpec, JobError> {
        let head = self.store.head(manifest).await.map_err(|e| {
            metrics::record_submission_failure();
            JobError::Submission(format!("cannot read manifest {}: {}", manifest, e))
        })?;

        let fingerprint = head.etag.filter(|etag| !etag.is_empty()).ok_or_else(|| {
            metrics::record_submission_failure();
            JobError::Submission(format!("manifest {} has no fingerprint", manifest))
        })?;

        Ok(ManifestSpec {
            location: manifest.clone(),
            fingerprint,
            fields,
        })
    }

    fn request(
        config: &ManagerConfig,
        operation: BulkOperation,
        manifest: ManifestSpec,
        report_prefix: &str,
        description: String,
        tags: Vec<JobTag>,
    ) -> JobRequest {
        JobRequest {
            operation,
            manifest,
            report: ReportSpec {
                bucket: config.report_bucket.clone(),
                prefix: report_prefix.to_string(),
                scope: "all_tasks".to_string(),
            },
            role: config.bulk_job_role.clone(),
            priority: config.bulk_job_priority,
            description,
            tags,
            client_token: Uuid::new_v4().to_string(),
            confirmation_required: false,
        }
    }

    async fn create(&self, request: &JobRequest) -> Result<JobId, JobError> {
        match self.bulk.create_job(request).await {
            Ok(job_id) if !job_id.is_empty() => Ok(job_id),
            Ok(_) => {
                metrics::record_submission_failure();
                error!(
                    description = %request.description,
                    manifest = %request.manifest.location,
                    "Bulk service returned an empty job id"
                );
                Err(JobError::Submission(format!(
                    "{}: service returned an empty job id",
                    request.description
                )))
            }
            Err(e) => {
                metrics::record_submission_failure();
                error!(
                    description = %request.description,
                    manifest = %request.manifest.location,
                    error = %e,
                    "Bulk job submission failed"
                );
                Err(JobError::Submission(e.to_string()))
            }
        }
    }

    /// Submit a restore job over `manifest` at the configured tier, tagged
    /// with the job group id and archive selection of the run
    pub async fn submit_restore(
        &self,
        config: &ManagerConfig,
        manifest: &ObjectLocation,
        field_count: u8,
        archive_selection: ArchiveSelection,
        job_group_id: &str,
    ) -> Result<JobId, JobError> {
        let tier = config.restore_tier;
        let spec = self
            .manifest_spec(manifest, manifest_fields(field_count))
            .await?;
        let request = Self::request(
            config,
            BulkOperation::Restore {
                expiration_days: config.restore_expiration_days,
                tier,
            },
            spec,
            RESTORE_REPORT_PREFIX,
            format!("restore {} ({} tier)", manifest, tier),
            vec![
                JobTag {
                    key: config.job_tag_key.clone(),
                    value: job_group_id.to_string(),
                },
                JobTag {
                    key: archive_selection_tag(&config.job_tag_key),
                    value: archive_selection.to_string(),
                },
            ],
        );

        let job_id = self.create(&request).await?;
        metrics::record_restore_submission();
        info!(
            job_id = %job_id,
            manifest = %manifest,
            tier = %tier,
            archive_selection = %archive_selection,
            "Restore job submitted"
        );
        Ok(job_id)
    }

    /// Submit a copy job over restore task results, tagged with the restore
    /// job id.
    ///
    /// `manifest` holds result rows whose first `field_count` columns name
    /// the restored objects.
    pub async fn submit_copy(
        &self,
        config: &ManagerConfig,
        manifest: &ObjectLocation,
        field_count: u8,
        storage_class: &str,
        restore_job_id: &str,
    ) -> Result<JobId, JobError> {
        let spec = self
            .manifest_spec(manifest, result_fields(field_count))
            .await?;
        let request = Self::request(
            config,
            BulkOperation::Copy {
                target_bucket: config.destination_bucket.clone(),
                target_prefix: config.destination_prefix.clone(),
                storage_class: storage_class.to_string(),
            },
            spec,
            COPY_REPORT_PREFIX,
            format!("copy {} restored by {}", manifest, restore_job_id),
            vec![JobTag {
                key: config.job_tag_key.clone(),
                value: restore_job_id.to_string(),
            }],
        );

        let job_id = self.create(&request).await?;
        metrics::record_copy_submission();
        info!(
            job_id = %job_id,
            restore_job_id = %restore_job_id,
            manifest = %manifest,
            "Copy job submitted"
        );
        Ok(job_id)
    }
}
