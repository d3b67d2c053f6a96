// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Manifest submission driver
//!
//! Walks the run's manifests strictly in order, submitting one restore job
//! per invocation. The loop position lives entirely in [`ManifestLoopState`],
//! which the caller hands back on the next invocation. A failed submission
//! returns an error and the caller keeps its previous state, so repeating the
//! call retries the same manifest.

use std::sync::Arc;

use tracing::info;

use restore_copy_types::{ChunkingState, LoopStatus, ManifestLoopState, ObjectLocation};

use super::JobError;
use super::submitter::BulkJobSubmitter;
use crate::clients::notify::{Notifier, notify};
use crate::clients::ManifestStore;
use crate::config::ManagerConfig;

/// What the next driver step does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverAction {
    /// Submit the manifest at `index`
    Submit { index: usize, manifest_key: String },
    /// Every manifest has been submitted
    Complete,
}

/// Decide the next step and the state to adopt once it succeeds.
pub fn next(state: &ManifestLoopState) -> Result<(DriverAction, ManifestLoopState), JobError> {
    if state.item_count != state.manifest_files.len() {
        return Err(JobError::InvalidState(format!(
            "item_count {} does not match {} manifest files",
            state.item_count,
            state.manifest_files.len()
        )));
    }
    if state.num_count > state.item_count {
        return Err(JobError::InvalidState(format!(
            "num_count {} is past item_count {}",
            state.num_count, state.item_count
        )));
    }

    let mut new_state = state.clone();
    if state.num_count == state.item_count {
        new_state.item_loop_status = LoopStatus::Complete;
        return Ok((DriverAction::Complete, new_state));
    }

    let index = state.num_count;
    let manifest_key = state.manifest_files[index].clone();
    new_state.num_count += 1;
    new_state.item_loop_status = LoopStatus::Started;
    new_state.last_manifest = Some(manifest_key.clone());

    Ok((
        DriverAction::Submit {
            index,
            manifest_key,
        },
        new_state,
    ))
}

pub struct ManifestDriver {
    store: Arc<dyn ManifestStore>,
    submitter: BulkJobSubmitter,
    notifier: Arc<dyn Notifier>,
}

impl ManifestDriver {
    pub fn new(
        store: Arc<dyn ManifestStore>,
        submitter: BulkJobSubmitter,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            submitter,
            notifier,
        }
    }

    /// List the run's manifests, oldest first, into a fresh loop state
    pub async fn prepare(
        &self,
        config: &ManagerConfig,
        chunking: &ChunkingState,
    ) -> Result<ManifestLoopState, JobError> {
        if !chunking.chunking_complete {
            return Err(JobError::InvalidState(format!(
                "chunking for {} is not complete ({} of {} chunks)",
                chunking.job_group_id, chunking.next_chunk, chunking.total_chunks
            )));
        }

        let mut objects = self
            .store
            .list(&chunking.output.bucket, &chunking.output.key)
            .await?;
        objects.retain(|obj| obj.location.key.ends_with(".csv"));
        objects.sort_by(|a, b| {
            a.last_modified
                .cmp(&b.last_modified)
                .then_with(|| a.location.key.cmp(&b.location.key))
        });

        let manifest_files: Vec<String> = objects.into_iter().map(|o| o.location.key).collect();

        info!(
            job_group_id = %chunking.job_group_id,
            manifests = manifest_files.len(),
            total_rows = chunking.total_rows,
            "Manifest loop prepared"
        );

        notify(
            self.notifier.as_ref(),
            &config.notify_topic,
            "Restore workflow initiating",
            &format!(
                "Workflow {} initiating for {} keys in {} manifests",
                chunking.job_group_id,
                chunking.total_rows,
                manifest_files.len()
            ),
        )
        .await;

        Ok(ManifestLoopState {
            job_group_id: chunking.job_group_id.clone(),
            bucket: chunking.output.bucket.clone(),
            item_count: manifest_files.len(),
            manifest_files,
            num_count: 0,
            item_loop_status: LoopStatus::NotStarted,
            total_rows: chunking.total_rows,
            version_mode: chunking.version_mode,
            archive_selection: chunking.archive_selection,
            last_manifest: None,
            last_job_id: None,
        })
    }

    /// Run one loop step
    pub async fn step(
        &self,
        config: &ManagerConfig,
        state: &ManifestLoopState,
    ) -> Result<ManifestLoopState, JobError> {
        let (action, mut new_state) = next(state)?;

        let (index, manifest_key) = match action {
            DriverAction::Complete => {
                info!(
                    job_group_id = %state.job_group_id,
                    submitted = state.num_count,
                    "All manifests submitted"
                );
                return Ok(new_state);
            }
            DriverAction::Submit {
                index,
                manifest_key,
            } => (index, manifest_key),
        };

        let manifest = ObjectLocation::new(state.bucket.clone(), manifest_key);
        let submitted = self
            .submitter
            .submit_restore(
                config,
                &manifest,
                state.version_mode.field_count(),
                state.archive_selection,
                &state.job_group_id,
            )
            .await;

        let job_id = match submitted {
            Ok(job_id) => job_id,
            Err(e) => {
                notify(
                    self.notifier.as_ref(),
                    &config.notify_topic,
                    "Restore submission failed",
                    &format!(
                        "Workflow {} could not submit manifest {} ({} of {}): {}",
                        state.job_group_id,
                        manifest,
                        index + 1,
                        state.item_count,
                        e
                    ),
                )
                .await;
                return Err(e);
            }
        };

        notify(
            self.notifier.as_ref(),
            &config.notify_topic,
            "Restore job submitted",
            &format!(
                "Restore job {} submitted for manifest {} ({} of {})",
                job_id,
                manifest,
                index + 1,
                state.item_count
            ),
        )
        .await;

        new_state.last_job_id = Some(job_id);
        Ok(new_state)
    }

    /// Announce the end of a run
    pub async fn finish(
        &self,
        config: &ManagerConfig,
        state: &ManifestLoopState,
    ) -> Result<(), JobError> {
        if state.item_loop_status != LoopStatus::Complete {
            return Err(JobError::InvalidState(format!(
                "manifest loop for {} is {} ({} of {} submitted)",
                state.job_group_id, state.item_loop_status, state.num_count, state.item_count
            )));
        }

        notify(
            self.notifier.as_ref(),
            &config.notify_topic,
            "Restore workflow completed",
            &format!(
                "Workflow {} submitted {} restore jobs covering {} keys",
                state.job_group_id, state.item_count, state.total_rows
            ),
        )
        .await;

        Ok(())
    }
}
