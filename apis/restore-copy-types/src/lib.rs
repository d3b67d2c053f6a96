// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Shared types for the restore-and-copy manager.
//!
//! The manager exposes each workflow step as one request/response call. The
//! records in this crate are the flat state objects passed between those
//! steps, the ledger entries persisted between invocations, and the small
//! enums describing archive classes, retrieval tiers and job lifecycles.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, VariantNames};

// ============================================================================
// Type Aliases
// ============================================================================

/// Identifier assigned by the bulk-operation service to a submitted job
pub type JobId = String;

/// Identifier of one workflow run (UUID string)
pub type JobGroupId = String;

// ============================================================================
// Object Store Types
// ============================================================================

/// Location of an object in the object store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct ObjectLocation {
    /// Bucket name
    pub bucket: String,
    /// Object key within the bucket
    pub key: String,
}

impl ObjectLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl std::fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// A manifest enumerating (bucket, key[, version]) rows for one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ManifestFile {
    pub location: ObjectLocation,
    /// Number of rows, when the producer reports it
    pub row_count: Option<u64>,
    /// 2 (bucket, key) or 3 (bucket, key, version id)
    pub field_count: u8,
    /// Content fingerprint (ETag) observed when the manifest was read
    pub fingerprint: Option<String>,
}

// ============================================================================
// Archive and Retrieval Settings
// ============================================================================

/// Which archive storage classes a workflow run restores.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    JsonSchema,
    Display,
    EnumString,
    EnumIter,
    VariantNames,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ArchiveSelection {
    Glacier,
    DeepArchive,
    #[default]
    GlacierAndDeepArchive,
}

impl ArchiveSelection {
    /// Storage class names matched by the inventory query
    pub fn storage_classes(&self) -> &'static [&'static str] {
        match self {
            ArchiveSelection::Glacier => &["GLACIER"],
            ArchiveSelection::DeepArchive => &["DEEP_ARCHIVE"],
            ArchiveSelection::GlacierAndDeepArchive => &["GLACIER", "DEEP_ARCHIVE"],
        }
    }
}

/// Speed/cost class used when restoring archived objects.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    JsonSchema,
    Display,
    EnumString,
    EnumIter,
    VariantNames,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RetrievalTier {
    Standard,
    #[default]
    Bulk,
}

/// Which object versions a workflow run includes.
///
/// Decided once per run; it fixes the manifest field arity for every job the
/// run submits.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    JsonSchema,
    Display,
    EnumString,
    VariantNames,
)]
pub enum VersionMode {
    /// Latest versions only: manifests carry (bucket, key)
    #[default]
    Current,
    /// Every non-delete-marker version: manifests carry (bucket, key, version)
    All,
}

impl VersionMode {
    pub fn field_count(&self) -> u8 {
        match self {
            VersionMode::Current => 2,
            VersionMode::All => 3,
        }
    }

    /// Path segment separating manifests of the two arities in scratch space
    pub fn path_segment(&self) -> &'static str {
        match self {
            VersionMode::Current => "no-version-id",
            VersionMode::All => "with-version-id",
        }
    }
}

/// Manifest column names for a given field arity.
pub fn manifest_fields(field_count: u8) -> Vec<String> {
    let mut fields = vec!["Bucket".to_string(), "Key".to_string()];
    if field_count >= 3 {
        fields.push("VersionId".to_string());
    }
    fields
}

// ============================================================================
// Job Lifecycle
// ============================================================================

/// Kind of bulk operation a job performs.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    JsonSchema,
    Display,
    EnumString,
    VariantNames,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OperationKind {
    Restore,
    Copy,
}

/// Operational status of a bulk job as reported by the bulk-operation service.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    JsonSchema,
    Display,
    EnumString,
    VariantNames,
)]
pub enum JobStatus {
    #[default]
    Pending,
    Complete,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Failed)
    }
}

/// Secondary status gating the copy scheduler.
///
/// Only `NotStarted` entries are ever considered for a copy submission.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    JsonSchema,
    Display,
    EnumString,
    EnumIter,
    VariantNames,
)]
pub enum CopyJobStatus {
    #[default]
    NotStarted,
    Submitted,
    Complete,
    DoNotProceed,
}

/// Task progress counters reported for a finished job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TaskCounters {
    pub total_tasks: u64,
    pub tasks_succeeded: u64,
    pub tasks_failed: u64,
}

impl TaskCounters {
    pub fn new(total_tasks: u64, tasks_succeeded: u64, tasks_failed: u64) -> Self {
        Self {
            total_tasks,
            tasks_succeeded,
            tasks_failed,
        }
    }

    /// Check that succeeded + failed never exceeds the total
    pub fn validate(&self) -> Result<(), String> {
        let finished = self.tasks_succeeded.checked_add(self.tasks_failed);
        match finished {
            Some(n) if n <= self.total_tasks => Ok(()),
            _ => Err(format!(
                "{} succeeded + {} failed exceeds {} total tasks",
                self.tasks_succeeded, self.tasks_failed, self.total_tasks
            )),
        }
    }

    /// Every task failed; a job with zero tasks counts as all-failed
    pub fn all_failed(&self) -> bool {
        self.tasks_failed == self.total_tasks
    }
}

/// A restore job and the state of its downstream copy phase.
///
/// Keyed by `job_id` alone. `job_status` and `copy_job_status` are ordinary
/// attributes, so a status change never moves the entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LedgerEntry {
    /// Restore job id assigned by the bulk-operation service
    pub job_id: JobId,
    pub job_status: JobStatus,
    pub operation: OperationKind,
    pub retrieval_tier: RetrievalTier,
    /// Archive classes the submitting run restored; picks the copy delay
    #[serde(default)]
    pub archive_selection: ArchiveSelection,
    /// Manifest the restore job ran over
    pub manifest: ObjectLocation,
    pub manifest_fields: u8,
    /// Completion report for the restore job; its succeeded task results
    /// become the copy manifest
    pub report: Option<ObjectLocation>,
    /// Workflow run that submitted the restore job, when known
    pub job_group_id: Option<JobGroupId>,
    pub created_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub counters: TaskCounters,
    pub copy_job_status: CopyJobStatus,
    pub copy_job_id: Option<JobId>,
    pub copy_counters: Option<TaskCounters>,
    /// Entry may be purged after this instant
    pub expires_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Chunk Planning
// ============================================================================

/// One slice of the total key range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ChunkPlan {
    pub chunk_index: u64,
    pub offset: u64,
    pub limit: u64,
    /// floor(total_rows / limit); also the inclusive terminal chunk index
    pub total_chunks: u64,
}

impl ChunkPlan {
    /// This is the terminal chunk of the plan
    pub fn is_final(&self) -> bool {
        self.chunk_index == self.total_chunks
    }

    /// The chunk starts at or past the end of the key range
    pub fn is_empty_tail(&self, total_rows: u64) -> bool {
        self.offset >= total_rows
    }
}

/// Request to start a workflow run from an inventory snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StartWorkflowRequest {
    /// Inventory manifest that triggered the run; its key carries the
    /// `dt=<partition>` path segment
    pub inventory: ObjectLocation,
}

/// Flat record passed between chunk planner invocations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ChunkingState {
    pub job_group_id: JobGroupId,
    pub partition_date: String,
    pub total_rows: u64,
    pub max_rows: u64,
    pub total_chunks: u64,
    pub next_chunk: u64,
    pub chunking_complete: bool,
    /// Where the query engine materializes this run's manifests
    pub output: ObjectLocation,
    /// Fixed at start so every chunk of a run has the same arity
    pub version_mode: VersionMode,
    pub archive_selection: ArchiveSelection,
}

// ============================================================================
// Manifest Submission Loop
// ============================================================================

/// Progress of the manifest submission loop.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    JsonSchema,
    Display,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LoopStatus {
    #[default]
    NotStarted,
    Started,
    Complete,
}

/// Flat record passed between manifest driver invocations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ManifestLoopState {
    pub job_group_id: JobGroupId,
    pub bucket: String,
    /// Manifest keys, in submission order
    pub manifest_files: Vec<String>,
    /// Index of the next manifest to submit
    pub num_count: usize,
    pub item_count: usize,
    pub item_loop_status: LoopStatus,
    pub total_rows: u64,
    pub version_mode: VersionMode,
    #[serde(default)]
    pub archive_selection: ArchiveSelection,
    /// Manifest submitted by the previous step
    pub last_manifest: Option<String>,
    /// Restore job id returned by the previous step
    pub last_job_id: Option<JobId>,
}

// ============================================================================
// Copy Scheduling
// ============================================================================

/// A copy job submitted during a sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CopySubmission {
    pub restore_job_id: JobId,
    pub copy_job_id: JobId,
}

/// An entry the sweep could not advance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SweepFailure {
    pub restore_job_id: JobId,
    pub reason: String,
}

/// Summary of one scheduler sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SweepReport {
    /// Entries found in `NotStarted`
    pub scanned: usize,
    /// Entries whose ready time has not yet passed
    pub deferred: usize,
    pub submitted: Vec<CopySubmission>,
    pub failures: Vec<SweepFailure>,
    /// Expired entries removed before the scan
    pub purged: u64,
}

// ============================================================================
// Completion Events
// ============================================================================

/// Signal that a bulk job reached a terminal state.
///
/// Either the job id is given directly or it is recovered from the key of the
/// completion report, which the bulk service writes under `.../job-<id>/...`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CompletionEvent {
    pub job_id: Option<JobId>,
    pub report: Option<ObjectLocation>,
}

impl CompletionEvent {
    pub fn resolve_job_id(&self) -> Option<JobId> {
        if let Some(id) = self.job_id.as_ref().filter(|id| !id.is_empty()) {
            return Some(id.clone());
        }
        let report = self.report.as_ref()?;
        report
            .key
            .rsplit('/')
            .find_map(|segment| segment.strip_prefix("job-"))
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    }
}

/// What the completion listener did with an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CompletionOutcome {
    /// Job is not part of this workflow or not yet terminal
    Ignored { job_id: JobId, reason: String },
    /// Restore job recorded in the ledger
    RestoreRecorded {
        job_id: JobId,
        copy_job_status: CopyJobStatus,
    },
    /// Restore job was already in the ledger; nothing written
    RestoreAlreadyRecorded { job_id: JobId },
    /// Restore job failed; nothing to copy
    RestoreFailed { job_id: JobId },
    /// Copy phase of a restore job marked complete
    CopyRecorded {
        restore_job_id: JobId,
        copy_job_id: JobId,
    },
    /// Copy job failed; ledger left for manual intervention
    CopyFailed {
        restore_job_id: JobId,
        copy_job_id: JobId,
    },
}

// ============================================================================
// Tests
// ============================================================================
