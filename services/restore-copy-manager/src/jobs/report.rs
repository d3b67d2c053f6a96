// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Restore completion reports
//!
//! A finished bulk job writes a JSON report manifest listing one CSV result
//! file per task outcome. The rows of the `succeeded` files are exactly the
//! objects that were restored, so they become the copy manifest.

use serde::Deserialize;

use restore_copy_types::{ObjectLocation, manifest_fields};

use super::JobError;

/// Columns in every task result row: bucket, key, version id, task status,
/// error code, HTTP status, result message
pub const RESULT_COLUMNS: usize = 7;

const SUCCEEDED: &str = "succeeded";

/// One result file listed by a report manifest
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReportResult {
    pub task_execution_status: String,
    pub bucket: String,
    pub key: String,
}

/// Report manifest written when a bulk job finishes
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CompletionReport {
    #[serde(default)]
    pub results: Vec<ReportResult>,
}

impl CompletionReport {
    pub fn parse(location: &ObjectLocation, body: &[u8]) -> Result<Self, JobError> {
        serde_json::from_slice(body).map_err(|e| {
            JobError::Submission(format!("unreadable completion report {}: {}", location, e))
        })
    }

    /// Result files holding the rows whose task succeeded
    pub fn succeeded(&self) -> Vec<ObjectLocation> {
        self.results
            .iter()
            .filter(|r| r.task_execution_status.eq_ignore_ascii_case(SUCCEEDED))
            .map(|r| ObjectLocation::new(r.bucket.clone(), r.key.clone()))
            .collect()
    }
}

/// Manifest fields for a task result file whose leading columns carry
/// `field_count` object fields; the rest are ignored.
pub fn result_fields(field_count: u8) -> Vec<String> {
    let mut fields = manifest_fields(field_count);
    fields.resize(RESULT_COLUMNS, "Ignore".to_string());
    fields
}

/// Join result files into one manifest body, one row per line
pub fn concat_results(parts: &[Vec<u8>]) -> Vec<u8> {
    let mut body = Vec::with_capacity(parts.iter().map(Vec::len).sum());
    for part in parts {
        if part.is_empty() {
            continue;
        }
        body.extend_from_slice(part);
        if !part.ends_with(b"\n") {
            body.push(b'\n');
        }
    }
    body
}
