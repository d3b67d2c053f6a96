// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Workflow steps
//!
//! A run moves through these steps, each invoked once per request:
//!
//! 1. [`planner`] counts archived keys and materializes one manifest per chunk.
//! 2. [`driver`] submits those manifests as restore jobs, one per step.
//! 3. [`listener`] records each restore completion in the ledger.
//! 4. [`scheduler`] submits a copy job for each entry whose tier delay passed,
//!    over the succeeded rows of its restore [`report`].
//! 5. [`listener`] marks the copy phase complete.
//!
//! [`submitter`] builds the bulk job requests used by steps 2 and 4.

pub mod driver;
pub mod listener;
pub mod planner;
pub mod report;
pub mod scheduler;
pub mod submitter;

use thiserror::Error;

use crate::clients::{QueryError, StoreError};
use crate::ledger::LedgerError;

/// Workflow step errors
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Query failed: {0}")]
    Query(#[from] QueryError),

    #[error("Job submission failed: {0}")]
    Submission(String),

    #[error("Object store error: {0}")]
    Store(#[from] StoreError),

    #[error("Bulk service error: {0}")]
    Service(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}
