// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use restore_copy_manager::clients::bulk::{
    BulkOperation, JobRequest, ReportSpec,
};
use restore_copy_manager::clients::{
    BulkError, BulkService, HttpBulkService, HttpNotifier, HttpQueryEngine, Notifier, QueryEngine,
    QueryError,
};
use restore_copy_types::{JobStatus, ObjectLocation, RetrievalTier};

use common::{manifest_spec, restore_description};

fn query_engine(server: &MockServer) -> HttpQueryEngine {
    HttpQueryEngine::new(
        server.uri(),
        "inventory".to_string(),
        "primary".to_string(),
        5,
    )
    .unwrap()
}

fn restore_request() -> JobRequest {
    JobRequest {
        operation: BulkOperation::Restore {
            expiration_days: 7,
            tier: RetrievalTier::Bulk,
        },
        manifest: manifest_spec("restore-manifests/no-version-id/g/chunk-0000.csv"),
        report: ReportSpec {
            bucket: "reports".to_string(),
            prefix: "restore-reports".to_string(),
            scope: "all_tasks".to_string(),
        },
        role: "arn:role/bulk".to_string(),
        priority: 10,
        description: "restore chunk 0".to_string(),
        tags: Vec::new(),
        client_token: "token-1".to_string(),
        confirmation_required: false,
    }
}

#[tokio::test]
async fn count_posts_query_and_database() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/queries/count"))
        .and(body_partial_json(json!({
            "query": "SELECT COUNT(*) FROM t",
            "database": "inventory",
            "workgroup": "primary",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "count": 250000 })))
        .expect(1)
        .mount(&server)
        .await;

    let count = query_engine(&server)
        .count("SELECT COUNT(*) FROM t")
        .await
        .expect("count");

    assert_eq!(count, 250_000);
}

#[tokio::test]
async fn export_returns_written_manifest() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/queries/export"))
        .and(body_partial_json(json!({
            "output": { "bucket": "scratch", "key": "restore-manifests/x/" },
            "format": "csv",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "location": { "bucket": "scratch", "key": "restore-manifests/x/part-0.csv" },
            "row_count": 100000,
        })))
        .mount(&server)
        .await;

    let manifest = query_engine(&server)
        .export(
            "SELECT bucket, key FROM t",
            &ObjectLocation::new("scratch", "restore-manifests/x/"),
            2,
        )
        .await
        .expect("export");

    assert_eq!(
        manifest.location,
        ObjectLocation::new("scratch", "restore-manifests/x/part-0.csv")
    );
    assert_eq!(manifest.row_count, Some(100_000));
    assert_eq!(manifest.field_count, 2);
}

#[tokio::test]
async fn rejected_query_surfaces_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/queries/count"))
        .respond_with(ResponseTemplate::new(400).set_body_string("syntax error"))
        .mount(&server)
        .await;

    let err = query_engine(&server).count("SELEC").await.unwrap_err();

    match err {
        QueryError::Rejected { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "syntax error");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn export_without_key_is_invalid() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/queries/export"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "location": { "bucket": "scratch", "key": "" },
        })))
        .mount(&server)
        .await;

    let err = query_engine(&server)
        .export("q", &ObjectLocation::new("scratch", "p/"), 2)
        .await
        .unwrap_err();

    assert!(matches!(err, QueryError::InvalidResponse(_)));
}

#[tokio::test]
async fn create_job_returns_assigned_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/jobs"))
        .and(body_partial_json(json!({
            "operation": { "kind": "restore", "expiration_days": 7, "tier": "BULK" },
            "client_token": "token-1",
            "confirmation_required": false,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "job_id": "job-42" })))
        .expect(1)
        .mount(&server)
        .await;

    let bulk = HttpBulkService::new(server.uri(), 5).unwrap();
    let job_id = bulk.create_job(&restore_request()).await.expect("create");

    assert_eq!(job_id, "job-42");
}

#[tokio::test]
async fn create_job_without_id_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let bulk = HttpBulkService::new(server.uri(), 5).unwrap();
    let err = bulk.create_job(&restore_request()).await.unwrap_err();

    assert!(matches!(err, BulkError::InvalidResponse(_)));
}

#[tokio::test]
async fn create_job_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/jobs"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let bulk = HttpBulkService::new(server.uri(), 5).unwrap();
    let err = bulk.create_job(&restore_request()).await.unwrap_err();

    assert!(matches!(err, BulkError::Rejected { status: 503, .. }));
}

#[tokio::test]
async fn describe_retries_transient_failures() {
    let server = MockServer::start().await;
    let description = restore_description(
        "job-7",
        "Complete",
        RetrievalTier::Standard,
        (10, 8, 2),
        Some("group-1"),
    );

    Mock::given(method("GET"))
        .and(path("/jobs/job-7"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/jobs/job-7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&description))
        .expect(1)
        .mount(&server)
        .await;

    let bulk = HttpBulkService::new(server.uri(), 5).unwrap();
    let described = bulk.describe_job("job-7").await.expect("describe");

    assert_eq!(described, description);
    assert_eq!(described.job_status(), JobStatus::Complete);
    assert_eq!(described.tag(common::TAG_KEY), Some("group-1"));
}

#[tokio::test]
async fn describe_does_not_retry_client_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jobs/job-404"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let bulk = HttpBulkService::new(server.uri(), 5).unwrap();
    let err = bulk.describe_job("job-404").await.unwrap_err();

    assert!(matches!(err, BulkError::Rejected { status: 404, .. }));
}

#[tokio::test]
async fn notifier_posts_subject_and_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(body_partial_json(json!({
            "topic": "restore-events",
            "subject": "Restore job complete",
            "message": "done",
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let notifier = HttpNotifier::new(format!("{}/hook", server.uri()), 5).unwrap();
    notifier
        .publish("restore-events", "Restore job complete", "done")
        .await
        .expect("publish");
}

#[tokio::test]
async fn notifier_reports_webhook_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let notifier = HttpNotifier::new(format!("{}/hook", server.uri()), 5).unwrap();
    assert!(notifier.publish("t", "s", "m").await.is_err());
}
