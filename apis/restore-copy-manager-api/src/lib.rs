// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Dropshot API trait for the restore-and-copy manager service.
//!
//! The manager restores archived objects in bounded chunks and, once each
//! restore has settled for its tier delay, copies the restored objects to a
//! destination. A workflow engine drives it one step per request; every step
//! takes and returns a flat JSON record.
//!
//! ## Endpoints
//!
//! - `POST /workflows` - Count keys and start a run
//! - `POST /workflows/chunks` - Materialize the next chunk manifest
//! - `POST /workflows/manifests` - Enumerate manifests for submission
//! - `POST /workflows/manifests/next` - Submit the next manifest as a restore
//! - `POST /workflows/finish` - Announce the end of a run
//! - `POST /scheduler/sweep` - Submit copy jobs whose delay has passed
//! - `POST /events/completion` - Record a bulk job completion
//! - `GET /jobs` - List ledger entries
//! - `GET /jobs/{job_id}` - Get one ledger entry
//! - `GET /metrics` - Prometheus metrics

use dropshot::{
    Body, HttpError, HttpResponseOk, HttpResponseUpdatedNoContent, Path, Query, RequestContext,
    TypedBody,
};
use http::Response;
use restore_copy_types::{
    ChunkingState, CompletionEvent, CompletionOutcome, CopyJobStatus, LedgerEntry,
    ManifestLoopState, StartWorkflowRequest, SweepReport,
};
use schemars::JsonSchema;
use serde::Deserialize;

/// Path parameters for ledger entry endpoints.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct JobPath {
    /// Restore job id assigned by the bulk-operation service
    pub job_id: String,
}

/// Query parameters for listing ledger entries.
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct JobListParams {
    /// Only return entries in this copy phase status
    pub copy_job_status: Option<CopyJobStatus>,
}

/// Restore-and-Copy Manager API
#[dropshot::api_description]
pub trait RestoreCopyManagerApi {
    /// Context type for request handlers
    type Context: Send + Sync + 'static;

    /// Start a workflow run
    ///
    /// Derives the partition date from the inventory key, counts matching
    /// archived keys and returns the initial chunking state.
    ///
    /// Returns 400 if the inventory key carries no partition segment.
    /// Returns 503 if the count query fails.
    #[endpoint {
        method = POST,
        path = "/workflows",
        tags = ["workflows"],
    }]
    async fn start_workflow(
        rqctx: RequestContext<Self::Context>,
        body: TypedBody<StartWorkflowRequest>,
    ) -> Result<HttpResponseOk<ChunkingState>, HttpError>;

    /// Plan one chunk
    ///
    /// Materializes the manifest for `next_chunk` and advances the state.
    /// Once the terminal chunk is done, `chunking_complete` is set.
    #[endpoint {
        method = POST,
        path = "/workflows/chunks",
        tags = ["workflows"],
    }]
    async fn plan_chunk(
        rqctx: RequestContext<Self::Context>,
        body: TypedBody<ChunkingState>,
    ) -> Result<HttpResponseOk<ChunkingState>, HttpError>;

    /// Prepare the manifest loop
    ///
    /// Lists the manifests written by the chunk planner, oldest first.
    #[endpoint {
        method = POST,
        path = "/workflows/manifests",
        tags = ["workflows"],
    }]
    async fn prepare_manifests(
        rqctx: RequestContext<Self::Context>,
        body: TypedBody<ChunkingState>,
    ) -> Result<HttpResponseOk<ManifestLoopState>, HttpError>;

    /// Submit the next manifest
    ///
    /// Submits one restore job and advances `num_count`, or marks the loop
    /// complete when every manifest has been submitted. On failure the state
    /// is not advanced and the same request may be retried.
    #[endpoint {
        method = POST,
        path = "/workflows/manifests/next",
        tags = ["workflows"],
    }]
    async fn next_manifest(
        rqctx: RequestContext<Self::Context>,
        body: TypedBody<ManifestLoopState>,
    ) -> Result<HttpResponseOk<ManifestLoopState>, HttpError>;

    /// Finish a workflow run
    ///
    /// Returns 400 if the manifest loop is not complete.
    #[endpoint {
        method = POST,
        path = "/workflows/finish",
        tags = ["workflows"],
    }]
    async fn finish_workflow(
        rqctx: RequestContext<Self::Context>,
        body: TypedBody<ManifestLoopState>,
    ) -> Result<HttpResponseUpdatedNoContent, HttpError>;

    /// Run one scheduler sweep
    ///
    /// Submits a copy job for every restored entry whose tier delay has
    /// elapsed. Failures for one entry are reported, not raised.
    #[endpoint {
        method = POST,
        path = "/scheduler/sweep",
        tags = ["scheduler"],
    }]
    async fn sweep(
        rqctx: RequestContext<Self::Context>,
    ) -> Result<HttpResponseOk<SweepReport>, HttpError>;

    /// Record a job completion
    ///
    /// Returns 409 if the ledger entry changed underneath the update.
    #[endpoint {
        method = POST,
        path = "/events/completion",
        tags = ["events"],
    }]
    async fn job_completed(
        rqctx: RequestContext<Self::Context>,
        body: TypedBody<CompletionEvent>,
    ) -> Result<HttpResponseOk<CompletionOutcome>, HttpError>;

    /// List ledger entries
    #[endpoint {
        method = GET,
        path = "/jobs",
        tags = ["jobs"],
    }]
    async fn list_jobs(
        rqctx: RequestContext<Self::Context>,
        query: Query<JobListParams>,
    ) -> Result<HttpResponseOk<Vec<LedgerEntry>>, HttpError>;

    /// Get a ledger entry
    ///
    /// Returns 404 if no entry exists for the job id.
    #[endpoint {
        method = GET,
        path = "/jobs/{job_id}",
        tags = ["jobs"],
    }]
    async fn get_job(
        rqctx: RequestContext<Self::Context>,
        path: Path<JobPath>,
    ) -> Result<HttpResponseOk<LedgerEntry>, HttpError>;

    /// Prometheus metrics in text exposition format
    #[endpoint {
        method = GET,
        path = "/metrics",
        tags = ["system"],
    }]
    async fn get_metrics(
        rqctx: RequestContext<Self::Context>,
    ) -> Result<Response<Body>, HttpError>;
}
