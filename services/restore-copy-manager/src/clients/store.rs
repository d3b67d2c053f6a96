// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Object store access for manifests
//!
//! Listing the manifests a run produced, reading a manifest's current
//! fingerprint right before it is submitted, and reading completion reports
//! back to write the copy manifests derived from them.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use chrono::{DateTime, Utc};
use thiserror::Error;

use restore_copy_types::ObjectLocation;

/// Object store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Object store request failed: {0}")]
    Request(String),
}

/// Metadata for a stored object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub location: ObjectLocation,
    pub last_modified: Option<DateTime<Utc>>,
    pub etag: Option<String>,
    pub size: u64,
}

#[async_trait]
pub trait ManifestStore: Send + Sync {
    /// List every object under `prefix`
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<StoredObject>, StoreError>;

    async fn head(&self, location: &ObjectLocation) -> Result<StoredObject, StoreError>;

    async fn get(&self, location: &ObjectLocation) -> Result<Vec<u8>, StoreError>;

    /// Write `body`, replacing any existing object
    async fn put(&self, location: &ObjectLocation, body: Vec<u8>) -> Result<(), StoreError>;
}

fn to_chrono(dt: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())
}

fn map_sdk_error<E>(err: SdkError<E>, location: &str) -> StoreError
where
    E: std::error::Error + Send + Sync + 'static,
{
    if let SdkError::ServiceError(ref service_err) = err
        && service_err.raw().status().as_u16() == 404
    {
        return StoreError::NotFound(location.to_string());
    }
    StoreError::Request(format!("{}: {}", location, DisplayErrorContext(&err)))
}

/// S3-compatible manifest store
pub struct S3ManifestStore {
    client: Client,
}

impl S3ManifestStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the ambient AWS configuration, optionally pointed
    /// at an S3-compatible endpoint
    pub async fn from_settings(
        region: Option<String>,
        endpoint: Option<String>,
        force_path_style: bool,
    ) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region));
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        if force_path_style {
            builder = builder.force_path_style(true);
        }

        Self::new(Client::from_conf(builder.build()))
    }
}

#[async_trait]
impl ManifestStore for S3ManifestStore {
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<StoredObject>, StoreError> {
        let mut results = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix);

            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }

            let output = request
                .send()
                .await
                .map_err(|e| map_sdk_error(e, &format!("s3://{}/{}", bucket, prefix)))?;

            for obj in output.contents() {
                if let Some(key) = obj.key() {
                    results.push(StoredObject {
                        location: ObjectLocation::new(bucket, key),
                        last_modified: obj.last_modified().and_then(to_chrono),
                        etag: obj.e_tag().map(str::to_string),
                        size: obj.size().and_then(|s| u64::try_from(s).ok()).unwrap_or(0),
                    });
                }
            }

            if output.is_truncated() == Some(true) {
                continuation_token = output.next_continuation_token().map(|s| s.to_string());
            } else {
                break;
            }
        }

        Ok(results)
    }

    async fn head(&self, location: &ObjectLocation) -> Result<StoredObject, StoreError> {
        let output = self
            .client
            .head_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, &location.to_string()))?;

        Ok(StoredObject {
            location: location.clone(),
            last_modified: output.last_modified().and_then(to_chrono),
            etag: output.e_tag().map(str::to_string),
            size: output
                .content_length()
                .and_then(|s| u64::try_from(s).ok())
                .unwrap_or(0),
        })
    }

    async fn get(&self, location: &ObjectLocation) -> Result<Vec<u8>, StoreError> {
        let output = self
            .client
            .get_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, &location.to_string()))?;

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| StoreError::Request(format!("{}: {}", location, e)))?
            .into_bytes();

        Ok(bytes.to_vec())
    }

    async fn put(&self, location: &ObjectLocation, body: Vec<u8>) -> Result<(), StoreError> {
        self.client
            .put_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .content_type("text/csv")
            .body(body.into())
            .send()
            .await
            .map_err(|e| map_sdk_error(e, &location.to_string()))?;
        Ok(())
    }
}
