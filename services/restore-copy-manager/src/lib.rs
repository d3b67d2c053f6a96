// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Restore-and-Copy Manager Library
//!
//! Restores archived objects in bounded chunks and copies each chunk to a
//! destination once its restore has settled.
//!
//! # Modules
//!
//! - [`config`] - Environment and reloadable file configuration
//! - [`context`] - API context wiring the workflow steps to their collaborators
//! - [`jobs`] - Chunk planner, manifest driver, copy scheduler, completion listener
//! - [`ledger`] - Persistent job ledger (PostgreSQL and in-memory)
//! - [`clients`] - Query engine, bulk-operation service, object store, notifications

pub mod clients;
pub mod config;
pub mod context;
pub mod http;
pub mod jobs;
pub mod ledger;
pub mod metrics;

use dropshot::{
    Body, ClientErrorStatusCode, HttpError, HttpResponseOk, HttpResponseUpdatedNoContent, Path,
    Query, RequestContext, TypedBody,
};
use ::http::Response;
use restore_copy_manager_api::{JobListParams, JobPath, RestoreCopyManagerApi};
use restore_copy_types::{
    ChunkingState, CompletionEvent, CompletionOutcome, LedgerEntry, ManifestLoopState,
    StartWorkflowRequest, SweepReport,
};

use crate::context::ApiContext;
use crate::jobs::JobError;
use crate::ledger::LedgerError;

/// Map a workflow error onto an HTTP status
pub fn http_error(e: JobError) -> HttpError {
    let msg = e.to_string();
    match e {
        JobError::InvalidState(_) => HttpError::for_bad_request(None, msg),
        JobError::Ledger(LedgerError::NotFound(_)) => HttpError::for_not_found(None, msg),
        JobError::Ledger(LedgerError::Conflict { .. }) => {
            HttpError::for_client_error(None, ClientErrorStatusCode::CONFLICT, msg)
        }
        JobError::Query(_) | JobError::Submission(_) | JobError::Service(_) => {
            HttpError::for_unavail(None, msg)
        }
        JobError::Store(_) | JobError::Ledger(_) => HttpError::for_internal_error(msg),
    }
}

/// Restore-and-Copy Manager API implementation
///
/// Contains no data; all state is in the `ApiContext` and the ledger.
pub enum RestoreCopyManagerImpl {}

impl RestoreCopyManagerApi for RestoreCopyManagerImpl {
    type Context = ApiContext;

    async fn start_workflow(
        rqctx: RequestContext<Self::Context>,
        body: TypedBody<StartWorkflowRequest>,
    ) -> Result<HttpResponseOk<ChunkingState>, HttpError> {
        let ctx = rqctx.context();
        let request = body.into_inner();

        tracing::info!(inventory = %request.inventory, "Received workflow start request");

        let state = ctx.start_workflow(&request).await.map_err(http_error)?;
        Ok(HttpResponseOk(state))
    }

    async fn plan_chunk(
        rqctx: RequestContext<Self::Context>,
        body: TypedBody<ChunkingState>,
    ) -> Result<HttpResponseOk<ChunkingState>, HttpError> {
        let ctx = rqctx.context();
        let state = ctx
            .plan_chunk(body.into_inner())
            .await
            .map_err(http_error)?;
        Ok(HttpResponseOk(state))
    }

    async fn prepare_manifests(
        rqctx: RequestContext<Self::Context>,
        body: TypedBody<ChunkingState>,
    ) -> Result<HttpResponseOk<ManifestLoopState>, HttpError> {
        let ctx = rqctx.context();
        let state = ctx
            .prepare_manifests(&body.into_inner())
            .await
            .map_err(http_error)?;
        Ok(HttpResponseOk(state))
    }

    async fn next_manifest(
        rqctx: RequestContext<Self::Context>,
        body: TypedBody<ManifestLoopState>,
    ) -> Result<HttpResponseOk<ManifestLoopState>, HttpError> {
        let ctx = rqctx.context();
        let state = body.into_inner();

        let next = ctx.next_manifest(&state).await.map_err(|e| {
            tracing::warn!(
                job_group_id = %state.job_group_id,
                num_count = state.num_count,
                error = %e,
                "Manifest step failed, state not advanced"
            );
            http_error(e)
        })?;
        Ok(HttpResponseOk(next))
    }

    async fn finish_workflow(
        rqctx: RequestContext<Self::Context>,
        body: TypedBody<ManifestLoopState>,
    ) -> Result<HttpResponseUpdatedNoContent, HttpError> {
        let ctx = rqctx.context();
        ctx.finish_workflow(&body.into_inner())
            .await
            .map_err(http_error)?;
        Ok(HttpResponseUpdatedNoContent())
    }

    async fn sweep(
        rqctx: RequestContext<Self::Context>,
    ) -> Result<HttpResponseOk<SweepReport>, HttpError> {
        let ctx = rqctx.context();
        let report = ctx.sweep().await.map_err(http_error)?;
        Ok(HttpResponseOk(report))
    }

    async fn job_completed(
        rqctx: RequestContext<Self::Context>,
        body: TypedBody<CompletionEvent>,
    ) -> Result<HttpResponseOk<CompletionOutcome>, HttpError> {
        let ctx = rqctx.context();
        let outcome = ctx
            .job_completed(&body.into_inner())
            .await
            .map_err(http_error)?;
        Ok(HttpResponseOk(outcome))
    }

    async fn list_jobs(
        rqctx: RequestContext<Self::Context>,
        query: Query<JobListParams>,
    ) -> Result<HttpResponseOk<Vec<LedgerEntry>>, HttpError> {
        let ctx = rqctx.context();
        let params = query.into_inner();
        let entries = ctx
            .list_jobs(params.copy_job_status)
            .await
            .map_err(http_error)?;
        Ok(HttpResponseOk(entries))
    }

    async fn get_job(
        rqctx: RequestContext<Self::Context>,
        path: Path<JobPath>,
    ) -> Result<HttpResponseOk<LedgerEntry>, HttpError> {
        let ctx = rqctx.context();
        let job_id = path.into_inner().job_id;
        let entry = ctx.get_job(&job_id).await.map_err(http_error)?;
        Ok(HttpResponseOk(entry))
    }

    async fn get_metrics(
        _rqctx: RequestContext<Self::Context>,
    ) -> Result<Response<Body>, HttpError> {
        Response::builder()
            .status(200)
            .header("Content-Type", "text/plain; version=0.0.4")
            .body(metrics::gather_metrics().into())
            .map_err(|e| HttpError::for_internal_error(format!("Failed to build response: {}", e)))
    }
}
