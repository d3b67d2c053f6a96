// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Chunk planner
//!
//! Splits the archived key set into pages of at most `max_rows` rows and has
//! the query engine write each page as a manifest. Chunk indexes run from 0
//! through `total_chunks = total_rows / max_rows` inclusive, so a remainder
//! lands in the terminal chunk. When the terminal chunk would start at or
//! past the last row (an exact multiple, or no rows at all) it is skipped
//! without a query.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use restore_copy_types::{ChunkPlan, ChunkingState, ObjectLocation, StartWorkflowRequest};

use super::JobError;
use crate::clients::{InventoryQuery, QueryEngine};
use crate::config::ManagerConfig;

/// Plan the chunk at `chunk_index`
pub fn plan_next_chunk(
    total_rows: u64,
    max_rows: u64,
    chunk_index: u64,
) -> Result<ChunkPlan, JobError> {
    if max_rows == 0 {
        return Err(JobError::InvalidState(
            "max rows per chunk must be greater than zero".to_string(),
        ));
    }

    let total_chunks = total_rows / max_rows;
    if chunk_index > total_chunks {
        return Err(JobError::InvalidState(format!(
            "chunk {} is past the terminal chunk {}",
            chunk_index, total_chunks
        )));
    }

    Ok(ChunkPlan {
        chunk_index,
        offset: chunk_index * max_rows,
        limit: max_rows,
        total_chunks,
    })
}

/// Partition date of an inventory snapshot.
///
/// Inventory manifests live at `.../dt=<partition>/<file>`; the partition is
/// the value of the segment right before the file name.
pub fn partition_date(key: &str) -> Option<String> {
    let mut segments = key.rsplit('/');
    segments.next()?;
    let (_, value) = segments.next()?.split_once('=')?;
    (!value.is_empty()).then(|| value.to_string())
}

pub struct ChunkPlanner {
    query: Arc<dyn QueryEngine>,
}

impl ChunkPlanner {
    pub fn new(query: Arc<dyn QueryEngine>) -> Self {
        Self { query }
    }

    fn inventory_query(config: &ManagerConfig, state: &ChunkingState) -> InventoryQuery {
        InventoryQuery {
            database: config.catalog_database.clone(),
            table: config.catalog_table.clone(),
            source_bucket: config.source_bucket.clone(),
            partition_date: state.partition_date.clone(),
            archive_selection: state.archive_selection,
            version_mode: state.version_mode,
        }
    }

    /// Count matching keys and return the initial chunking state
    pub async fn start(
        &self,
        config: &ManagerConfig,
        request: &StartWorkflowRequest,
    ) -> Result<ChunkingState, JobError> {
        let partition = partition_date(&request.inventory.key).ok_or_else(|| {
            JobError::InvalidState(format!(
                "inventory key has no partition segment: {}",
                request.inventory.key
            ))
        })?;

        // Validate the chunk size before spending a query on the count
        plan_next_chunk(0, config.max_rows_per_chunk, 0)?;

        let job_group_id = Uuid::new_v4().to_string();
        let mut state = ChunkingState {
            output: ObjectLocation::new(
                config.manifest_bucket.clone(),
                format!(
                    "restore-manifests/{}/{}/",
                    config.version_mode.path_segment(),
                    job_group_id
                ),
            ),
            job_group_id,
            partition_date: partition,
            total_rows: 0,
            max_rows: config.max_rows_per_chunk,
            total_chunks: 0,
            next_chunk: 0,
            chunking_complete: false,
            version_mode: config.version_mode,
            archive_selection: config.archive_selection,
        };

        let sql = Self::inventory_query(config, &state).count_sql();
        state.total_rows = self.query.count(&sql).await?;
        state.total_chunks = state.total_rows / state.max_rows;

        info!(
            job_group_id = %state.job_group_id,
            partition_date = %state.partition_date,
            total_rows = state.total_rows,
            total_chunks = state.total_chunks,
            "Workflow started"
        );

        Ok(state)
    }

    /// Materialize the manifest for `next_chunk` and advance.
    ///
    /// A state that is already complete is returned unchanged.
    pub async fn plan_step(
        &self,
        config: &ManagerConfig,
        mut state: ChunkingState,
    ) -> Result<ChunkingState, JobError> {
        if state.chunking_complete {
            return Ok(state);
        }

        let plan = plan_next_chunk(state.total_rows, state.max_rows, state.next_chunk)?;
        if plan.total_chunks != state.total_chunks {
            return Err(JobError::InvalidState(format!(
                "state claims {} chunks but {} rows of {} make {}",
                state.total_chunks, state.total_rows, state.max_rows, plan.total_chunks
            )));
        }

        if plan.is_empty_tail(state.total_rows) {
            debug!(
                job_group_id = %state.job_group_id,
                chunk_index = plan.chunk_index,
                "Terminal chunk is empty, skipping query"
            );
        } else {
            let sql = Self::inventory_query(config, &state).page_sql(&plan);
            let manifest = self
                .query
                .export(&sql, &state.output, state.version_mode.field_count())
                .await?;

            info!(
                job_group_id = %state.job_group_id,
                chunk_index = plan.chunk_index,
                offset = plan.offset,
                limit = plan.limit,
                manifest = %manifest.location,
                "Chunk manifest written"
            );
        }

        if plan.is_final() {
            state.chunking_complete = true;
        } else {
            state.next_chunk += 1;
        }

        Ok(state)
    }
}
