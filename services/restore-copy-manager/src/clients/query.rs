// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Query engine client
//!
//! The query engine answers SQL over the object inventory catalog. The
//! workflow asks it for a row count and then for one manifest per chunk,
//! materialized as CSV under a scratch prefix.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use restore_copy_types::{
    ArchiveSelection, ChunkPlan, ManifestFile, ObjectLocation, VersionMode,
};

use crate::http::{build_client, join_url};

/// Query engine errors
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Query rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid query engine response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Run a `SELECT COUNT(*)` query and return the count
    async fn count(&self, sql: &str) -> Result<u64, QueryError>;

    /// Run a page query and write its rows as one manifest under `output`
    async fn export(
        &self,
        sql: &str,
        output: &ObjectLocation,
        field_count: u8,
    ) -> Result<ManifestFile, QueryError>;
}

/// Quote a string literal for the query engine
fn literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Quote an identifier for the query engine
fn identifier(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Inventory query for one workflow run.
#[derive(Debug, Clone)]
pub struct InventoryQuery {
    pub database: String,
    pub table: String,
    pub source_bucket: String,
    pub partition_date: String,
    pub archive_selection: ArchiveSelection,
    pub version_mode: VersionMode,
}

impl InventoryQuery {
    fn source(&self) -> String {
        format!("{}.{}", identifier(&self.database), identifier(&self.table))
    }

    fn predicate(&self) -> String {
        let classes: Vec<String> = self
            .archive_selection
            .storage_classes()
            .iter()
            .map(|class| format!("storage_class = {}", literal(class)))
            .collect();

        let storage = if classes.len() == 1 {
            classes.join("")
        } else {
            format!("({})", classes.join(" OR "))
        };

        let mut clauses = vec![
            storage,
            "is_delete_marker = false".to_string(),
            format!("bucket = {}", literal(&self.source_bucket)),
            format!("dt = {}", literal(&self.partition_date)),
        ];
        if self.version_mode == VersionMode::Current {
            clauses.push("is_latest = true".to_string());
        }
        clauses.join(" AND ")
    }

    pub fn count_sql(&self) -> String {
        format!(
            "SELECT COUNT(*) FROM {} WHERE {}",
            self.source(),
            self.predicate()
        )
    }

    /// Page query for one chunk, ordered by modification date
    pub fn page_sql(&self, plan: &ChunkPlan) -> String {
        let columns = match self.version_mode {
            VersionMode::Current => "bucket, key".to_string(),
            VersionMode::All => "bucket, key, \
                 CASE WHEN version_id IS NULL THEN 'null' ELSE version_id END AS version_id"
                .to_string(),
        };
        format!(
            "SELECT {} FROM {} WHERE {} ORDER BY last_modified_date ASC OFFSET {} LIMIT {}",
            columns,
            self.source(),
            self.predicate(),
            plan.offset,
            plan.limit
        )
    }
}

#[derive(Debug, Serialize)]
struct CountRequest<'a> {
    query: &'a str,
    database: &'a str,
    workgroup: &'a str,
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: u64,
}

#[derive(Debug, Serialize)]
struct ExportRequest<'a> {
    query: &'a str,
    database: &'a str,
    workgroup: &'a str,
    output: &'a ObjectLocation,
    format: &'static str,
}

#[derive(Debug, Deserialize)]
struct ExportResponse {
    location: ObjectLocation,
    #[serde(default)]
    row_count: Option<u64>,
}

/// HTTP query engine client
pub struct HttpQueryEngine {
    client: Client,
    base_url: String,
    database: String,
    workgroup: String,
}

impl HttpQueryEngine {
    pub fn new(
        base_url: String,
        database: String,
        workgroup: String,
        timeout_secs: u64,
    ) -> Result<Self, QueryError> {
        Ok(Self {
            client: build_client(timeout_secs)?,
            base_url,
            database,
            workgroup,
        })
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, QueryError>
    where
        B: Serialize + Sync,
        R: serde::de::DeserializeOwned + Send,
    {
        let url = join_url(&self.base_url, path);
        let response = self.client.post(&url).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, url = %url, "Query engine rejected request");
            return Err(QueryError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| QueryError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl QueryEngine for HttpQueryEngine {
    async fn count(&self, sql: &str) -> Result<u64, QueryError> {
        let response: CountResponse = self
            .post(
                "queries/count",
                &CountRequest {
                    query: sql,
                    database: &self.database,
                    workgroup: &self.workgroup,
                },
            )
            .await?;
        Ok(response.count)
    }

    async fn export(
        &self,
        sql: &str,
        output: &ObjectLocation,
        field_count: u8,
    ) -> Result<ManifestFile, QueryError> {
        let response: ExportResponse = self
            .post(
                "queries/export",
                &ExportRequest {
                    query: sql,
                    database: &self.database,
                    workgroup: &self.workgroup,
                    output,
                    format: "csv",
                },
            )
            .await?;

        if response.location.key.is_empty() {
            return Err(QueryError::InvalidResponse(
                "export returned an empty manifest key".to_string(),
            ));
        }

        Ok(ManifestFile {
            location: response.location,
            row_count: response.row_count,
            field_count,
            fingerprint: None,
        })
    }
}
