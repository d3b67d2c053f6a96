// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! API context for the restore-and-copy manager

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;

use restore_copy_types::{
    ChunkingState, CompletionEvent, CompletionOutcome, CopyJobStatus, LedgerEntry,
    ManifestLoopState, StartWorkflowRequest, SweepReport,
};

use crate::clients::{
    BulkService, HttpBulkService, HttpNotifier, HttpQueryEngine, LogNotifier, ManifestStore,
    Notifier, QueryEngine, S3ManifestStore,
};
use crate::config::ManagerConfig;
use crate::jobs::JobError;
use crate::jobs::driver::ManifestDriver;
use crate::jobs::listener::CompletionListener;
use crate::jobs::planner::ChunkPlanner;
use crate::jobs::scheduler::CopyScheduler;
use crate::jobs::submitter::BulkJobSubmitter;
use crate::ledger::{JobLedger, PostgresLedger};

/// External collaborators the workflow steps run against
#[derive(Clone)]
pub struct Collaborators {
    pub ledger: Arc<dyn JobLedger>,
    pub query: Arc<dyn QueryEngine>,
    pub bulk: Arc<dyn BulkService>,
    pub store: Arc<dyn ManifestStore>,
    pub notifier: Arc<dyn Notifier>,
}

/// API context shared across all request handlers
pub struct ApiContext {
    config: watch::Receiver<ManagerConfig>,
    ledger: Arc<dyn JobLedger>,
    planner: ChunkPlanner,
    driver: ManifestDriver,
    scheduler: Arc<CopyScheduler>,
    listener: CompletionListener,
}

impl ApiContext {
    /// Connect to the ledger and build the HTTP and S3 clients
    pub async fn new(config: watch::Receiver<ManagerConfig>) -> Result<Self> {
        let snapshot = config.borrow().clone();

        let ledger = PostgresLedger::connect(&snapshot.database_url)
            .await
            .context("Failed to connect to ledger database")?;

        let query = HttpQueryEngine::new(
            snapshot.query_engine_url.clone(),
            snapshot.catalog_database.clone(),
            snapshot.query_workgroup.clone(),
            snapshot.http_timeout_secs,
        )
        .context("Failed to create query engine client")?;

        let bulk = HttpBulkService::new(
            snapshot.bulk_service_url.clone(),
            snapshot.http_timeout_secs,
        )
        .context("Failed to create bulk service client")?;

        let store = S3ManifestStore::from_settings(
            snapshot.s3_region.clone(),
            snapshot.s3_endpoint.clone(),
            snapshot.s3_force_path_style,
        )
        .await;

        let notifier: Arc<dyn Notifier> = match &snapshot.notify_url {
            Some(url) => Arc::new(
                HttpNotifier::new(url.clone(), snapshot.http_timeout_secs)
                    .context("Failed to create notification client")?,
            ),
            None => {
                tracing::info!("NOTIFY_URL not set, notifications will only be logged");
                Arc::new(LogNotifier)
            }
        };

        Ok(Self::with_collaborators(
            config,
            Collaborators {
                ledger: Arc::new(ledger),
                query: Arc::new(query),
                bulk: Arc::new(bulk),
                store: Arc::new(store),
                notifier,
            },
        ))
    }

    /// Build a context over the given collaborators
    pub fn with_collaborators(
        config: watch::Receiver<ManagerConfig>,
        collaborators: Collaborators,
    ) -> Self {
        let Collaborators {
            ledger,
            query,
            bulk,
            store,
            notifier,
        } = collaborators;

        let submitter = BulkJobSubmitter::new(bulk.clone(), store.clone());

        Self {
            config,
            planner: ChunkPlanner::new(query),
            driver: ManifestDriver::new(store.clone(), submitter.clone(), notifier.clone()),
            scheduler: Arc::new(CopyScheduler::new(ledger.clone(), store, submitter)),
            listener: CompletionListener::new(bulk, ledger.clone(), notifier),
            ledger,
        }
    }

    /// Latest configuration, including any SIGUSR1 reload
    pub fn config(&self) -> ManagerConfig {
        self.config.borrow().clone()
    }

    pub fn config_receiver(&self) -> watch::Receiver<ManagerConfig> {
        self.config.clone()
    }

    pub fn scheduler(&self) -> Arc<CopyScheduler> {
        self.scheduler.clone()
    }

    pub async fn start_workflow(
        &self,
        request: &StartWorkflowRequest,
    ) -> Result<ChunkingState, JobError> {
        self.planner.start(&self.config(), request).await
    }

    pub async fn plan_chunk(&self, state: ChunkingState) -> Result<ChunkingState, JobError> {
        self.planner.plan_step(&self.config(), state).await
    }

    pub async fn prepare_manifests(
        &self,
        chunking: &ChunkingState,
    ) -> Result<ManifestLoopState, JobError> {
        self.driver.prepare(&self.config(), chunking).await
    }

    pub async fn next_manifest(
        &self,
        state: &ManifestLoopState,
    ) -> Result<ManifestLoopState, JobError> {
        self.driver.step(&self.config(), state).await
    }

    pub async fn finish_workflow(&self, state: &ManifestLoopState) -> Result<(), JobError> {
        self.driver.finish(&self.config(), state).await
    }

    pub async fn sweep(&self) -> Result<SweepReport, JobError> {
        self.scheduler.sweep(&self.config()).await
    }

    pub async fn job_completed(
        &self,
        event: &CompletionEvent,
    ) -> Result<CompletionOutcome, JobError> {
        self.listener.handle(&self.config(), event).await
    }

    pub async fn list_jobs(
        &self,
        filter: Option<CopyJobStatus>,
    ) -> Result<Vec<LedgerEntry>, JobError> {
        let page_size = self.config.borrow().ledger_page_size;
        Ok(self.ledger.scan(filter, page_size).await?)
    }

    pub async fn get_job(&self, job_id: &str) -> Result<LedgerEntry, JobError> {
        Ok(self.ledger.get(job_id).await?)
    }
}
