// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Bulk-operation service client
//!
//! The bulk-operation service runs one restore or copy over every row of a
//! manifest and writes a completion report when it is done. Job creation is
//! never retried here: a duplicate create would start a second job. Job
//! descriptions are read-only and are retried on transient failures.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use restore_copy_types::{JobId, JobStatus, ObjectLocation, RetrievalTier, TaskCounters};

use crate::http::{build_client, join_url};

/// Bulk service errors
#[derive(Debug, Error)]
pub enum BulkError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Bulk service rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid bulk service response: {0}")]
    InvalidResponse(String),
}

impl BulkError {
    fn is_transient(&self) -> bool {
        match self {
            BulkError::Http(e) => e.is_timeout() || e.is_connect(),
            BulkError::Rejected { status, .. } => *status == 429 || *status >= 500,
            BulkError::InvalidResponse(_) => false,
        }
    }
}

/// Operation a bulk job applies to each manifest row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BulkOperation {
    Restore {
        expiration_days: u32,
        tier: RetrievalTier,
    },
    Copy {
        target_bucket: String,
        target_prefix: String,
        storage_class: String,
    },
}

/// Manifest a job runs over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestSpec {
    pub location: ObjectLocation,
    /// ETag the service checks before reading the manifest
    pub fingerprint: String,
    pub fields: Vec<String>,
}

/// Where and what the service reports on completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSpec {
    pub bucket: String,
    pub prefix: String,
    /// `all_tasks` or `failed_tasks_only`
    pub scope: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTag {
    pub key: String,
    pub value: String,
}

/// Job creation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    pub operation: BulkOperation,
    pub manifest: ManifestSpec,
    pub report: ReportSpec,
    pub role: String,
    pub priority: u32,
    pub description: String,
    pub tags: Vec<JobTag>,
    /// Lets the service collapse a retried request into one job
    pub client_token: String,
    pub confirmation_required: bool,
}

#[derive(Debug, Deserialize)]
struct CreateJobResponse {
    #[serde(default)]
    job_id: String,
}

/// Job progress as reported by the service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    pub total_tasks: u64,
    pub tasks_succeeded: u64,
    pub tasks_failed: u64,
}

impl From<JobProgress> for TaskCounters {
    fn from(p: JobProgress) -> Self {
        TaskCounters::new(p.total_tasks, p.tasks_succeeded, p.tasks_failed)
    }
}

/// Authoritative description of a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescription {
    pub job_id: JobId,
    /// Service-side status, e.g. `Active`, `Complete`, `Failed`, `Cancelled`
    pub status: String,
    pub operation: BulkOperation,
    pub manifest: ManifestSpec,
    #[serde(default)]
    pub progress: JobProgress,
    #[serde(default)]
    pub report: Option<ObjectLocation>,
    #[serde(default)]
    pub tags: Vec<JobTag>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobDescription {
    /// Collapse the service status into the ledger's three states
    pub fn job_status(&self) -> JobStatus {
        match self.status.as_str() {
            "Complete" => JobStatus::Complete,
            "Failed" | "Cancelled" => JobStatus::Failed,
            _ => JobStatus::Pending,
        }
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|tag| tag.key == key)
            .map(|tag| tag.value.as_str())
    }
}

#[async_trait]
pub trait BulkService: Send + Sync {
    /// Create a job; returns the id the service assigned
    async fn create_job(&self, request: &JobRequest) -> Result<JobId, BulkError>;

    async fn describe_job(&self, job_id: &str) -> Result<JobDescription, BulkError>;
}

/// HTTP bulk-operation service client
pub struct HttpBulkService {
    client: Client,
    base_url: String,
}

impl HttpBulkService {
    pub fn new(base_url: String, timeout_secs: u64) -> Result<Self, BulkError> {
        Ok(Self {
            client: build_client(timeout_secs)?,
            base_url,
        })
    }

    async fn describe_once(&self, job_id: &str) -> Result<JobDescription, BulkError> {
        let url = join_url(&self.base_url, &format!("jobs/{}", job_id));
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BulkError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| BulkError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl BulkService for HttpBulkService {
    async fn create_job(&self, request: &JobRequest) -> Result<JobId, BulkError> {
        let url = join_url(&self.base_url, "jobs");
        let response = self.client.post(&url).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::warn!(
                status = %status,
                description = %request.description,
                "Bulk service rejected job"
            );
            return Err(BulkError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let created: CreateJobResponse = response
            .json()
            .await
            .map_err(|e| BulkError::InvalidResponse(e.to_string()))?;

        if created.job_id.is_empty() {
            return Err(BulkError::InvalidResponse(
                "job created without an id".to_string(),
            ));
        }

        Ok(created.job_id)
    }

    async fn describe_job(&self, job_id: &str) -> Result<JobDescription, BulkError> {
        let max_retries = 3u32;
        let mut attempt = 0u32;
        let mut delay = Duration::from_millis(150);

        loop {
            match self.describe_once(job_id).await {
                Ok(description) => return Ok(description),
                Err(e) if e.is_transient() && attempt < max_retries => {
                    attempt += 1;
                    tracing::debug!(
                        job_id = %job_id,
                        attempt,
                        error = %e,
                        "Retrying job description"
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(Duration::from_secs(2));
                }
                Err(e) => return Err(e),
            }
        }
    }
}
