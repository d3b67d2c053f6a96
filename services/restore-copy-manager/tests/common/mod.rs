// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! In-memory collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;

use restore_copy_manager::clients::bulk::{
    BulkOperation, JobDescription, JobProgress, JobRequest, JobTag, ManifestSpec,
};
use restore_copy_manager::clients::{
    BulkError, BulkService, ManifestStore, Notifier, QueryEngine, QueryError, StoreError,
    StoredObject,
};
use restore_copy_manager::config::ManagerConfig;
use restore_copy_manager::context::Collaborators;
use restore_copy_manager::jobs::submitter::archive_selection_tag;
use restore_copy_manager::ledger::{
    JobLedger, LedgerError, LedgerPage, LedgerUpdate, MemoryLedger,
};
use restore_copy_types::{
    ArchiveSelection, CopyJobStatus, JobStatus, LedgerEntry, ManifestFile, ObjectLocation,
    OperationKind, RetrievalTier, TaskCounters,
};

pub const TAG_KEY: &str = "auto-restore-copy";

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).single().unwrap()
}

pub fn test_config() -> ManagerConfig {
    ManagerConfig {
        database_url: "postgres://unused".to_string(),
        query_engine_url: "http://query.invalid".to_string(),
        bulk_service_url: "http://bulk.invalid".to_string(),
        source_bucket: "photos".to_string(),
        manifest_bucket: "scratch".to_string(),
        report_bucket: "reports".to_string(),
        destination_bucket: "restored".to_string(),
        destination_prefix: "copies/".to_string(),
        catalog_database: "inventory".to_string(),
        catalog_table: "photos_inventory".to_string(),
        bulk_job_role: "arn:role/bulk".to_string(),
        job_tag_key: TAG_KEY.to_string(),
        ..ManagerConfig::default()
    }
}

// ============================================================================
// Query engine
// ============================================================================

#[derive(Default)]
pub struct FakeQueryEngine {
    pub count: Mutex<u64>,
    pub count_queries: Mutex<Vec<String>>,
    pub exports: Mutex<Vec<(String, ObjectLocation)>>,
    pub fail_exports: Mutex<bool>,
    /// Objects written by exports become visible here
    pub store: Option<Arc<FakeStore>>,
}

impl FakeQueryEngine {
    pub fn with_count(count: u64) -> Self {
        Self {
            count: Mutex::new(count),
            ..Default::default()
        }
    }

    pub fn writing_to(count: u64, store: Arc<FakeStore>) -> Self {
        Self {
            count: Mutex::new(count),
            store: Some(store),
            ..Default::default()
        }
    }

    pub fn export_count(&self) -> usize {
        self.exports.lock().unwrap().len()
    }
}

#[async_trait]
impl QueryEngine for FakeQueryEngine {
    async fn count(&self, sql: &str) -> Result<u64, QueryError> {
        self.count_queries.lock().unwrap().push(sql.to_string());
        Ok(*self.count.lock().unwrap())
    }

    async fn export(
        &self,
        sql: &str,
        output: &ObjectLocation,
        field_count: u8,
    ) -> Result<ManifestFile, QueryError> {
        if *self.fail_exports.lock().unwrap() {
            return Err(QueryError::Rejected {
                status: 400,
                message: "query rejected".to_string(),
            });
        }

        let mut exports = self.exports.lock().unwrap();
        let location = ObjectLocation::new(
            output.bucket.clone(),
            format!("{}chunk-{:04}.csv", output.key, exports.len()),
        );
        exports.push((sql.to_string(), output.clone()));

        if let Some(store) = &self.store {
            store.insert(
                &location,
                t0() + Duration::minutes(exports.len() as i64),
                &format!("etag-{}", exports.len()),
            );
        }

        Ok(ManifestFile {
            location,
            row_count: None,
            field_count,
            fingerprint: None,
        })
    }
}

// ============================================================================
// Object store
// ============================================================================

#[derive(Default)]
pub struct FakeStore {
    objects: Mutex<BTreeMap<(String, String), StoredObject>>,
    bodies: Mutex<BTreeMap<(String, String), Vec<u8>>>,
    pub heads: Mutex<usize>,
    pub puts: Mutex<Vec<ObjectLocation>>,
}

fn store_key(location: &ObjectLocation) -> (String, String) {
    (location.bucket.clone(), location.key.clone())
}

impl FakeStore {
    pub fn insert_body(&self, location: &ObjectLocation, etag: &str, body: &[u8]) {
        self.insert(location, t0(), etag);
        self.bodies
            .lock()
            .unwrap()
            .insert(store_key(location), body.to_vec());
    }

    pub fn body(&self, location: &ObjectLocation) -> Option<Vec<u8>> {
        self.bodies.lock().unwrap().get(&store_key(location)).cloned()
    }

    pub fn written(&self) -> Vec<ObjectLocation> {
        self.puts.lock().unwrap().clone()
    }

    pub fn insert(&self, location: &ObjectLocation, last_modified: DateTime<Utc>, etag: &str) {
        self.objects.lock().unwrap().insert(
            (location.bucket.clone(), location.key.clone()),
            StoredObject {
                location: location.clone(),
                last_modified: Some(last_modified),
                etag: Some(etag.to_string()),
                size: 100,
            },
        );
    }

    pub fn set_etag(&self, location: &ObjectLocation, etag: &str) {
        if let Some(obj) = self
            .objects
            .lock()
            .unwrap()
            .get_mut(&(location.bucket.clone(), location.key.clone()))
        {
            obj.etag = Some(etag.to_string());
        }
    }

    pub fn head_count(&self) -> usize {
        *self.heads.lock().unwrap()
    }
}

#[async_trait]
impl ManifestStore for FakeStore {
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<StoredObject>, StoreError> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .values()
            .filter(|o| o.location.bucket == bucket && o.location.key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn head(&self, location: &ObjectLocation) -> Result<StoredObject, StoreError> {
        *self.heads.lock().unwrap() += 1;
        self.objects
            .lock()
            .unwrap()
            .get(&(location.bucket.clone(), location.key.clone()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(location.to_string()))
    }

    async fn get(&self, location: &ObjectLocation) -> Result<Vec<u8>, StoreError> {
        self.body(location)
            .ok_or_else(|| StoreError::NotFound(location.to_string()))
    }

    async fn put(&self, location: &ObjectLocation, body: Vec<u8>) -> Result<(), StoreError> {
        let mut puts = self.puts.lock().unwrap();
        puts.push(location.clone());
        let etag = format!("etag-put-{}", puts.len());
        drop(puts);
        self.insert_body(location, &etag, &body);
        Ok(())
    }
}

// ============================================================================
// Bulk-operation service
// ============================================================================

#[derive(Default)]
pub struct FakeBulkService {
    pub created: Mutex<Vec<JobRequest>>,
    /// Scripted results for the next create calls; success when empty
    pub create_results: Mutex<VecDeque<Result<String, String>>>,
    /// Requests whose manifest key contains one of these always fail
    pub failing_manifests: Mutex<Vec<String>>,
    pub descriptions: Mutex<HashMap<String, JobDescription>>,
    next_id: Mutex<u64>,
}

impl FakeBulkService {
    pub fn fail_next(&self, message: &str) {
        self.create_results
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
    }

    pub fn return_next_id(&self, id: &str) {
        self.create_results
            .lock()
            .unwrap()
            .push_back(Ok(id.to_string()));
    }

    pub fn fail_manifest(&self, key_fragment: &str) {
        self.failing_manifests
            .lock()
            .unwrap()
            .push(key_fragment.to_string());
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub fn describe(&self, description: JobDescription) {
        self.descriptions
            .lock()
            .unwrap()
            .insert(description.job_id.clone(), description);
    }
}

#[async_trait]
impl BulkService for FakeBulkService {
    async fn create_job(&self, request: &JobRequest) -> Result<String, BulkError> {
        let failing = self
            .failing_manifests
            .lock()
            .unwrap()
            .iter()
            .any(|k| request.manifest.location.key.contains(k.as_str()));
        if failing {
            return Err(BulkError::Rejected {
                status: 400,
                message: "manifest rejected".to_string(),
            });
        }

        let scripted = self.create_results.lock().unwrap().pop_front();
        let job_id = match scripted {
            Some(Err(message)) => {
                return Err(BulkError::Rejected {
                    status: 503,
                    message,
                });
            }
            Some(Ok(id)) => id,
            None => {
                let mut next = self.next_id.lock().unwrap();
                *next += 1;
                format!("job-{:03}", *next)
            }
        };

        self.created.lock().unwrap().push(request.clone());
        Ok(job_id)
    }

    async fn describe_job(&self, job_id: &str) -> Result<JobDescription, BulkError> {
        self.descriptions
            .lock()
            .unwrap()
            .get(job_id)
            .cloned()
            .ok_or_else(|| BulkError::Rejected {
                status: 404,
                message: format!("no job {}", job_id),
            })
    }
}

pub fn manifest_spec(key: &str) -> ManifestSpec {
    ManifestSpec {
        location: ObjectLocation::new("scratch", key),
        fingerprint: "etag".to_string(),
        fields: vec!["Bucket".to_string(), "Key".to_string()],
    }
}

pub fn restore_description(
    job_id: &str,
    status: &str,
    tier: RetrievalTier,
    progress: (u64, u64, u64),
    tag: Option<&str>,
) -> JobDescription {
    JobDescription {
        job_id: job_id.to_string(),
        status: status.to_string(),
        operation: BulkOperation::Restore {
            expiration_days: 7,
            tier,
        },
        manifest: manifest_spec(&format!("manifests/{job_id}.csv")),
        progress: JobProgress {
            total_tasks: progress.0,
            tasks_succeeded: progress.1,
            tasks_failed: progress.2,
        },
        report: Some(ObjectLocation::new(
            "reports",
            format!("restore-reports/job-{job_id}/manifest.json"),
        )),
        tags: tag
            .map(|value| {
                vec![
                    JobTag {
                        key: TAG_KEY.to_string(),
                        value: value.to_string(),
                    },
                    JobTag {
                        key: archive_selection_tag(TAG_KEY),
                        value: "GLACIER".to_string(),
                    },
                ]
            })
            .unwrap_or_default(),
        created_at: t0(),
        completed_at: Some(t0()),
    }
}

pub fn copy_description(
    job_id: &str,
    status: &str,
    restore_job_id: &str,
    progress: (u64, u64, u64),
) -> JobDescription {
    JobDescription {
        job_id: job_id.to_string(),
        status: status.to_string(),
        operation: BulkOperation::Copy {
            target_bucket: "restored".to_string(),
            target_prefix: "copies/".to_string(),
            storage_class: "STANDARD".to_string(),
        },
        manifest: manifest_spec(&format!("manifests/{restore_job_id}.csv")),
        progress: JobProgress {
            total_tasks: progress.0,
            tasks_succeeded: progress.1,
            tasks_failed: progress.2,
        },
        report: None,
        tags: vec![JobTag {
            key: TAG_KEY.to_string(),
            value: restore_job_id.to_string(),
        }],
        created_at: t0(),
        completed_at: Some(t0()),
    }
}

// ============================================================================
// Notifications
// ============================================================================

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn subjects(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(subject, _)| subject.clone())
            .collect()
    }

    pub fn messages(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, message)| message.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn publish(&self, _topic: &str, subject: &str, message: &str) -> anyhow::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((subject.to_string(), message.to_string()));
        Ok(())
    }
}

// ============================================================================
// Wiring
// ============================================================================

/// Every fake, plus the collaborator set built over them
pub struct Fakes {
    pub ledger: Arc<MemoryLedger>,
    pub query: Arc<FakeQueryEngine>,
    pub bulk: Arc<FakeBulkService>,
    pub store: Arc<FakeStore>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Fakes {
    pub fn new(count: u64) -> Self {
        let store = Arc::new(FakeStore::default());
        Self {
            ledger: Arc::new(MemoryLedger::new()),
            query: Arc::new(FakeQueryEngine::writing_to(count, store.clone())),
            bulk: Arc::new(FakeBulkService::default()),
            store,
            notifier: Arc::new(RecordingNotifier::default()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            ledger: self.ledger.clone(),
            query: self.query.clone(),
            bulk: self.bulk.clone(),
            store: self.store.clone(),
            notifier: self.notifier.clone(),
        }
    }
}

pub fn report_location(job_id: &str) -> ObjectLocation {
    ObjectLocation::new("reports", format!("restore-reports/job-{job_id}/manifest.json"))
}

/// Task result file `index` of a restore job's report
pub fn result_location(job_id: &str, index: usize, status: &str) -> ObjectLocation {
    ObjectLocation::new(
        "reports",
        format!("restore-reports/job-{job_id}/results/{index}-{status}.csv"),
    )
}

/// Write a completion report listing one result file per `(status, rows)`
pub fn seed_report(store: &FakeStore, job_id: &str, results: &[(&str, &str)]) -> ObjectLocation {
    let mut listed = Vec::new();
    for (index, (status, rows)) in results.iter().enumerate() {
        let location = result_location(job_id, index, status);
        store.insert_body(&location, &format!("etag-{job_id}"), rows.as_bytes());
        listed.push(json!({
            "TaskExecutionStatus": status,
            "Bucket": location.bucket,
            "MD5Checksum": "00",
            "Key": location.key,
        }));
    }

    let report = report_location(job_id);
    let body = json!({
        "Format": "Report_CSV_20180820",
        "ReportCreationDate": "2024-03-01T00:00:00Z",
        "Results": listed,
        "ReportSchema": "Bucket, Key, VersionId, TaskStatus, ErrorCode, HTTPStatusCode, ResultMessage",
    });
    store.insert_body(&report, "etag-report", body.to_string().as_bytes());
    report
}

/// `count` result rows for `status`, one object per row
pub fn result_rows(prefix: &str, count: u64, status: &str) -> String {
    (0..count)
        .map(|i| format!("photos,{prefix}{i}.jpg,,{status},200,,{status}\n"))
        .collect()
}

/// A restored entry awaiting its copy, with its manifest and completion
/// report present in `store`
pub async fn seed_restored(
    ledger: &dyn JobLedger,
    store: &FakeStore,
    job_id: &str,
    tier: RetrievalTier,
    completed_at: DateTime<Utc>,
    counters: TaskCounters,
) -> LedgerEntry {
    let manifest = ObjectLocation::new("scratch", format!("manifests/{job_id}.csv"));
    store.insert(&manifest, completed_at, &format!("etag-{job_id}"));

    let succeeded = result_rows("ok/", counters.tasks_succeeded, "succeeded");
    let failed = result_rows("bad/", counters.tasks_failed, "failed");
    let mut results = Vec::new();
    if counters.tasks_succeeded > 0 {
        results.push(("succeeded", succeeded.as_str()));
    }
    if counters.tasks_failed > 0 {
        results.push(("failed", failed.as_str()));
    }
    let report = seed_report(store, job_id, &results);

    let entry = LedgerEntry {
        job_id: job_id.to_string(),
        job_status: JobStatus::Complete,
        operation: OperationKind::Restore,
        retrieval_tier: tier,
        archive_selection: ArchiveSelection::GlacierAndDeepArchive,
        manifest,
        manifest_fields: 2,
        report: Some(report),
        job_group_id: Some("group-1".to_string()),
        created_at: completed_at,
        completed_at,
        counters,
        copy_job_status: if counters.all_failed() {
            CopyJobStatus::DoNotProceed
        } else {
            CopyJobStatus::NotStarted
        },
        copy_job_id: None,
        copy_counters: None,
        expires_at: None,
    };
    ledger.put(&entry).await.unwrap();
    entry
}

// ============================================================================
// Ledger
// ============================================================================

/// Ledger whose inserts always fail; everything else is in memory
#[derive(Default)]
pub struct FailingLedger {
    inner: MemoryLedger,
}

#[async_trait]
impl JobLedger for FailingLedger {
    async fn put(&self, entry: &LedgerEntry) -> Result<(), LedgerError> {
        self.inner.put(entry).await
    }

    async fn create(&self, _entry: &LedgerEntry) -> Result<bool, LedgerError> {
        Err(LedgerError::Query("connection reset by peer".to_string()))
    }

    async fn get(&self, job_id: &str) -> Result<LedgerEntry, LedgerError> {
        self.inner.get(job_id).await
    }

    async fn scan_page(
        &self,
        filter: Option<CopyJobStatus>,
        continuation: Option<&str>,
        limit: usize,
    ) -> Result<LedgerPage, LedgerError> {
        self.inner.scan_page(filter, continuation, limit).await
    }

    async fn update(
        &self,
        job_id: &str,
        expected: &[CopyJobStatus],
        update: &LedgerUpdate,
    ) -> Result<LedgerEntry, LedgerError> {
        self.inner.update(job_id, expected, update).await
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, LedgerError> {
        self.inner.purge_expired(now).await
    }
}
