// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

#![allow(clippy::expect_used, clippy::unwrap_used)]

//! End-to-end tests of the workflow API over HTTP, with in-memory
//! collaborators behind the server.

mod common;

use dropshot::{ConfigDropshot, ConfigLogging, ConfigLoggingLevel, HttpServerStarter};
use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::sync::watch;

use restore_copy_manager::config::ManagerConfig;
use restore_copy_manager::context::ApiContext;
use restore_copy_manager::http::build_client;
use restore_copy_types::{
    ArchiveSelection, ChunkingState, CompletionOutcome, CopyJobStatus, LedgerEntry, LoopStatus,
    ManifestLoopState, ObjectLocation, RetrievalTier, SweepReport,
};

use common::{
    Fakes, restore_description, result_location, result_rows, seed_report, t0, test_config,
};

// ============================================================================
// Test Infrastructure
// ============================================================================

struct TestContext {
    client: reqwest::Client,
    base_url: String,
    fakes: Fakes,
}

impl TestContext {
    async fn new(config: ManagerConfig, count: u64) -> Self {
        let fakes = Fakes::new(count);
        let (_tx, config_rx) = watch::channel(config);

        let api_context = ApiContext::with_collaborators(config_rx, fakes.collaborators());

        let api = restore_copy_manager_api::restore_copy_manager_api_mod::api_description::<
            restore_copy_manager::RestoreCopyManagerImpl,
        >()
        .expect("failed to create API description");

        let config_dropshot = ConfigDropshot {
            bind_address: "127.0.0.1:0".parse().unwrap(),
            default_handler_task_mode: dropshot::HandlerTaskMode::Detached,
            ..Default::default()
        };
        let log = ConfigLogging::StderrTerminal {
            level: ConfigLoggingLevel::Error,
        }
        .to_logger("test-restore-copy-manager")
        .expect("failed to create logger");

        let server = HttpServerStarter::new(&config_dropshot, api, api_context, &log)
            .expect("failed to create server")
            .start();
        let base_url = format!("http://{}", server.local_addr());

        // Keep the server running for the rest of the test process
        std::mem::forget(server);

        Self {
            client: build_client(10).expect("failed to build client"),
            base_url,
            fakes,
        }
    }

    async fn post<B: Serialize, R: DeserializeOwned>(&self, path: &str, body: &B) -> R {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await
            .expect("request failed");
        assert_eq!(response.status(), StatusCode::OK, "POST {path}");
        response.json().await.expect("invalid response body")
    }

    async fn post_status<B: Serialize>(&self, path: &str, body: &B) -> StatusCode {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await
            .expect("request failed")
            .status()
    }

    async fn post_empty<R: DeserializeOwned>(&self, path: &str) -> R {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .send()
            .await
            .expect("request failed");
        assert_eq!(response.status(), StatusCode::OK, "POST {path}");
        response.json().await.expect("invalid response body")
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .expect("request failed")
    }
}

fn chunked_config() -> ManagerConfig {
    let mut config = test_config();
    config.max_rows_per_chunk = 100_000;
    config
}

fn start_request() -> serde_json::Value {
    json!({
        "inventory": {
            "bucket": "inventory",
            "key": "photos/daily/hive/dt=2024-03-01-01-00/symlink.txt",
        }
    })
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn workflow_runs_to_completion() {
    let ctx = TestContext::new(chunked_config(), 250_000).await;

    let mut chunking: ChunkingState = ctx.post("/workflows", &start_request()).await;
    assert_eq!(chunking.total_chunks, 2);
    while !chunking.chunking_complete {
        chunking = ctx.post("/workflows/chunks", &chunking).await;
    }
    assert_eq!(ctx.fakes.query.export_count(), 3);

    let mut manifests: ManifestLoopState = ctx.post("/workflows/manifests", &chunking).await;
    assert_eq!(manifests.item_count, 3);
    while manifests.item_loop_status != LoopStatus::Complete {
        manifests = ctx.post("/workflows/manifests/next", &manifests).await;
    }
    assert_eq!(ctx.fakes.bulk.created_count(), 3);

    let status = ctx.post_status("/workflows/finish", &manifests).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let subjects = ctx.fakes.notifier.subjects();
    assert_eq!(subjects.first().map(String::as_str), Some("Restore workflow initiating"));
    assert_eq!(subjects.last().map(String::as_str), Some("Restore workflow completed"));
}

#[tokio::test]
async fn finish_before_loop_completes_is_bad_request() {
    let ctx = TestContext::new(chunked_config(), 250_000).await;

    let mut chunking: ChunkingState = ctx.post("/workflows", &start_request()).await;
    while !chunking.chunking_complete {
        chunking = ctx.post("/workflows/chunks", &chunking).await;
    }
    let manifests: ManifestLoopState = ctx.post("/workflows/manifests", &chunking).await;

    let status = ctx.post_status("/workflows/finish", &manifests).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn failed_submission_is_unavailable_and_retryable() {
    let ctx = TestContext::new(chunked_config(), 50_000).await;

    let mut chunking: ChunkingState = ctx.post("/workflows", &start_request()).await;
    while !chunking.chunking_complete {
        chunking = ctx.post("/workflows/chunks", &chunking).await;
    }
    let manifests: ManifestLoopState = ctx.post("/workflows/manifests", &chunking).await;

    ctx.fakes.bulk.fail_next("throttled");
    let status = ctx.post_status("/workflows/manifests/next", &manifests).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let advanced: ManifestLoopState = ctx.post("/workflows/manifests/next", &manifests).await;
    assert_eq!(advanced.num_count, 1);
    assert_eq!(ctx.fakes.bulk.created_count(), 1);
}

#[tokio::test]
async fn completion_then_sweep_submits_copy() {
    let ctx = TestContext::new(test_config(), 0).await;
    ctx.fakes.bulk.describe(restore_description(
        "job-r1",
        "Complete",
        RetrievalTier::Bulk,
        (10, 9, 1),
        Some("group-1"),
    ));
    ctx.fakes.store.insert(
        &ObjectLocation::new("scratch", "manifests/job-r1.csv"),
        t0(),
        "etag-r1",
    );
    let succeeded = result_rows("ok/", 9, "succeeded");
    let failed = result_rows("bad/", 1, "failed");
    seed_report(
        &ctx.fakes.store,
        "job-r1",
        &[("succeeded", succeeded.as_str()), ("failed", failed.as_str())],
    );

    let outcome: CompletionOutcome = ctx
        .post("/events/completion", &json!({ "job_id": "job-r1" }))
        .await;
    assert_eq!(
        outcome,
        CompletionOutcome::RestoreRecorded {
            job_id: "job-r1".to_string(),
            copy_job_status: CopyJobStatus::NotStarted,
        }
    );

    // Completed in 2024, so every tier delay has long passed
    let report: SweepReport = ctx.post_empty("/scheduler/sweep").await;
    assert_eq!(report.submitted.len(), 1);

    let response = ctx.get("/jobs?copy_job_status=Submitted").await;
    assert_eq!(response.status(), StatusCode::OK);
    let submitted: Vec<LedgerEntry> = response.json().await.unwrap();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].job_id, "job-r1");

    let response = ctx.get("/jobs?copy_job_status=NotStarted").await;
    let pending: Vec<LedgerEntry> = response.json().await.unwrap();
    assert!(pending.is_empty());

    let response = ctx.get("/jobs/job-r1").await;
    assert_eq!(response.status(), StatusCode::OK);
    let entry: LedgerEntry = response.json().await.unwrap();
    assert_eq!(entry.copy_job_status, CopyJobStatus::Submitted);
    assert_eq!(
        entry.copy_job_id.as_deref(),
        Some(report.submitted[0].copy_job_id.as_str())
    );
    assert_eq!(entry.archive_selection, ArchiveSelection::Glacier);

    let created = ctx.fakes.bulk.created.lock().unwrap();
    assert_eq!(
        created[0].manifest.location,
        result_location("job-r1", 0, "succeeded")
    );
}

#[tokio::test]
async fn list_without_filter_returns_everything() {
    let ctx = TestContext::new(test_config(), 0).await;
    for (job_id, progress) in [("job-a", (2, 2, 0)), ("job-b", (2, 0, 2))] {
        ctx.fakes.bulk.describe(restore_description(
            job_id,
            "Complete",
            RetrievalTier::Bulk,
            progress,
            Some("group-1"),
        ));
        let _: CompletionOutcome = ctx
            .post("/events/completion", &json!({ "job_id": job_id }))
            .await;
    }

    let all: Vec<LedgerEntry> = ctx.get("/jobs").await.json().await.unwrap();
    assert_eq!(all.len(), 2);

    let stopped: Vec<LedgerEntry> = ctx
        .get("/jobs?copy_job_status=DoNotProceed")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(stopped.len(), 1);
    assert_eq!(stopped[0].job_id, "job-b");
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let ctx = TestContext::new(test_config(), 0).await;

    let response = ctx.get("/jobs/job-missing").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_inventory_key_is_bad_request() {
    let ctx = TestContext::new(test_config(), 10).await;

    let status = ctx
        .post_status(
            "/workflows",
            &json!({ "inventory": { "bucket": "inventory", "key": "symlink.txt" } }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn metrics_are_served_as_text() {
    let ctx = TestContext::new(test_config(), 0).await;

    restore_copy_manager::metrics::register_metrics();

    let response = ctx.get("/metrics").await;
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/plain"));

    let body = response.text().await.unwrap();
    assert!(body.contains("restore_copy_manager_restore_submissions_total"));
    assert!(body.contains("restore_copy_manager_submission_failures_total"));
}
