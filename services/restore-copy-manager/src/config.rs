// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Configuration for the restore-and-copy manager

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::Duration;
use serde::Deserialize;
use tokio::sync::watch;

use restore_copy_types::{ArchiveSelection, RetrievalTier, VersionMode};

/// Copy delays, in hours, for one archive class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct TierDelays {
    pub standard_hours: u32,
    pub bulk_hours: u32,
}

impl TierDelays {
    /// Time a restored object needs before it can be copied
    pub fn delay(&self, tier: RetrievalTier) -> Duration {
        let hours = match tier {
            RetrievalTier::Standard => self.standard_hours,
            RetrievalTier::Bulk => self.bulk_hours,
        };
        Duration::hours(i64::from(hours))
    }
}

/// Copy delays keyed by archive class selection and retrieval tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DelayTable {
    pub glacier: TierDelays,
    pub deep_archive: TierDelays,
}

impl Default for DelayTable {
    fn default() -> Self {
        Self {
            glacier: TierDelays {
                standard_hours: 5,
                bulk_hours: 12,
            },
            deep_archive: TierDelays {
                standard_hours: 12,
                bulk_hours: 48,
            },
        }
    }
}

impl DelayTable {
    /// Delays for a run's archive selection. A mixed selection waits for the
    /// slower class.
    pub fn for_selection(&self, selection: ArchiveSelection) -> TierDelays {
        match selection {
            ArchiveSelection::Glacier => self.glacier,
            ArchiveSelection::DeepArchive | ArchiveSelection::GlacierAndDeepArchive => {
                self.deep_archive
            }
        }
    }
}

/// Manager configuration loaded from environment variables or JSON file
///
/// Configuration can be loaded from:
/// 1. Environment variables (primary method, see `from_env()`)
/// 2. JSON config file (for SIGUSR1-based reloading, see `from_file()`)
///
/// Endpoints and bucket names are fixed for the life of the process. The JSON
/// file only carries the tuning fields that are safe to change between
/// workflow steps.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// PostgreSQL connection URL for the job ledger
    #[serde(skip)]
    pub database_url: String,

    /// Base URL of the query engine
    #[serde(skip)]
    pub query_engine_url: String,

    /// Base URL of the bulk-operation service
    #[serde(skip)]
    pub bulk_service_url: String,

    /// Notification webhook; notifications are only logged when unset
    #[serde(skip)]
    pub notify_url: Option<String>,

    #[serde(skip)]
    pub notify_topic: String,

    /// Bucket whose archived objects are restored
    #[serde(skip)]
    pub source_bucket: String,

    /// Scratch bucket where chunk manifests are written
    #[serde(skip)]
    pub manifest_bucket: String,

    /// Bucket receiving bulk job completion reports
    #[serde(skip)]
    pub report_bucket: String,

    #[serde(skip)]
    pub destination_bucket: String,

    #[serde(skip)]
    pub destination_prefix: String,

    /// Inventory catalog queried for archived keys
    #[serde(skip)]
    pub catalog_database: String,

    #[serde(skip)]
    pub catalog_table: String,

    #[serde(skip)]
    pub query_workgroup: String,

    /// Role the bulk-operation service assumes to run jobs
    #[serde(skip)]
    pub bulk_job_role: String,

    /// Tag key correlating bulk jobs with this workflow
    #[serde(skip)]
    pub job_tag_key: String,

    #[serde(skip)]
    pub s3_region: Option<String>,

    #[serde(skip)]
    pub s3_endpoint: Option<String>,

    #[serde(skip)]
    pub s3_force_path_style: bool,

    /// In-process sweep interval; 0 leaves sweeping to external callers
    #[serde(skip)]
    pub sweep_interval_secs: u64,

    /// HTTP client timeout in seconds
    #[serde(skip)]
    pub http_timeout_secs: u64,

    pub archive_selection: ArchiveSelection,
    pub version_mode: VersionMode,
    pub restore_tier: RetrievalTier,
    pub restore_expiration_days: u32,
    pub copy_storage_class: String,
    pub max_rows_per_chunk: u64,
    pub bulk_job_priority: u32,
    pub ledger_page_size: usize,
    pub ledger_retention_days: u32,
    pub delays: DelayTable,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            query_engine_url: String::new(),
            bulk_service_url: String::new(),
            notify_url: None,
            notify_topic: "restore-copy".to_string(),
            source_bucket: String::new(),
            manifest_bucket: String::new(),
            report_bucket: String::new(),
            destination_bucket: String::new(),
            destination_prefix: String::new(),
            catalog_database: String::new(),
            catalog_table: String::new(),
            query_workgroup: "primary".to_string(),
            bulk_job_role: String::new(),
            job_tag_key: "auto-restore-copy".to_string(),
            s3_region: None,
            s3_endpoint: None,
            s3_force_path_style: false,
            sweep_interval_secs: 0,
            http_timeout_secs: 30,
            archive_selection: ArchiveSelection::GlacierAndDeepArchive,
            version_mode: VersionMode::Current,
            restore_tier: RetrievalTier::Bulk,
            restore_expiration_days: 7,
            copy_storage_class: "STANDARD".to_string(),
            max_rows_per_chunk: 1_000_000,
            bulk_job_priority: 10,
            ledger_page_size: 100,
            ledger_retention_days: 60,
            delays: DelayTable::default(),
        }
    }
}

fn required(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("{} environment variable required", name))
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parsed_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional(name) {
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid {}: {} ({})", name, raw, e)),
        None => Ok(default),
    }
}

impl ManagerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let default_delays = defaults.delays;

        let delays = DelayTable {
            glacier: TierDelays {
                standard_hours: parsed_or(
                    "GLACIER_STANDARD_DELAY_HOURS",
                    default_delays.glacier.standard_hours,
                )?,
                bulk_hours: parsed_or(
                    "GLACIER_BULK_DELAY_HOURS",
                    default_delays.glacier.bulk_hours,
                )?,
            },
            deep_archive: TierDelays {
                standard_hours: parsed_or(
                    "DEEP_ARCHIVE_STANDARD_DELAY_HOURS",
                    default_delays.deep_archive.standard_hours,
                )?,
                bulk_hours: parsed_or(
                    "DEEP_ARCHIVE_BULK_DELAY_HOURS",
                    default_delays.deep_archive.bulk_hours,
                )?,
            },
        };

        // Accepts "true", "1", "yes" (case-insensitive) as true
        let s3_force_path_style = std::env::var("S3_FORCE_PATH_STYLE")
            .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(false);

        let config = Self {
            database_url: required("DATABASE_URL")?,
            query_engine_url: required("QUERY_ENGINE_URL")?,
            bulk_service_url: required("BULK_SERVICE_URL")?,
            notify_url: optional("NOTIFY_URL"),
            notify_topic: optional("NOTIFY_TOPIC").unwrap_or(defaults.notify_topic),
            source_bucket: required("SOURCE_BUCKET")?,
            manifest_bucket: required("MANIFEST_BUCKET")?,
            report_bucket: required("REPORT_BUCKET")?,
            destination_bucket: required("DESTINATION_BUCKET")?,
            destination_prefix: optional("DESTINATION_PREFIX").unwrap_or_default(),
            catalog_database: required("CATALOG_DATABASE")?,
            catalog_table: required("CATALOG_TABLE")?,
            query_workgroup: optional("QUERY_WORKGROUP").unwrap_or(defaults.query_workgroup),
            bulk_job_role: required("BULK_JOB_ROLE")?,
            job_tag_key: optional("JOB_TAG_KEY").unwrap_or(defaults.job_tag_key),
            s3_region: optional("S3_REGION"),
            s3_endpoint: optional("S3_ENDPOINT"),
            s3_force_path_style,
            sweep_interval_secs: parsed_or("SWEEP_INTERVAL_SECS", defaults.sweep_interval_secs)?,
            http_timeout_secs: parsed_or("HTTP_TIMEOUT_SECS", defaults.http_timeout_secs)?,
            archive_selection: parsed_or("ARCHIVE_STORAGE_CLASS", defaults.archive_selection)?,
            version_mode: parsed_or("INCLUDED_OBJECT_VERSIONS", defaults.version_mode)?,
            restore_tier: parsed_or("RESTORE_TIER", defaults.restore_tier)?,
            restore_expiration_days: parsed_or(
                "RESTORE_EXPIRATION_DAYS",
                defaults.restore_expiration_days,
            )?,
            copy_storage_class: optional("COPY_STORAGE_CLASS")
                .unwrap_or(defaults.copy_storage_class),
            max_rows_per_chunk: parsed_or("MAX_ROWS_PER_CHUNK", defaults.max_rows_per_chunk)?,
            bulk_job_priority: parsed_or("BULK_JOB_PRIORITY", defaults.bulk_job_priority)?,
            ledger_page_size: parsed_or("LEDGER_PAGE_SIZE", defaults.ledger_page_size)?,
            ledger_retention_days: parsed_or(
                "LEDGER_RETENTION_DAYS",
                defaults.ledger_retention_days,
            )?,
            delays,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would stall the workflow
    pub fn validate(&self) -> Result<()> {
        if self.max_rows_per_chunk == 0 {
            anyhow::bail!("MAX_ROWS_PER_CHUNK must be greater than zero");
        }
        if self.ledger_page_size == 0 {
            anyhow::bail!("LEDGER_PAGE_SIZE must be greater than zero");
        }
        Ok(())
    }

    /// Load configuration from a JSON file
    ///
    /// This is used for runtime configuration reloading via SIGUSR1.
    /// Fields marked `skip` keep their defaults here and are never merged.
    pub async fn from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Merge runtime-reloadable fields from another config
    pub fn merge_reloadable(&mut self, other: &ManagerConfig) {
        self.archive_selection = other.archive_selection;
        self.version_mode = other.version_mode;
        self.restore_tier = other.restore_tier;
        self.restore_expiration_days = other.restore_expiration_days;
        self.copy_storage_class = other.copy_storage_class.clone();
        self.max_rows_per_chunk = other.max_rows_per_chunk;
        self.bulk_job_priority = other.bulk_job_priority;
        self.ledger_page_size = other.ledger_page_size;
        self.ledger_retention_days = other.ledger_retention_days;
        self.delays = other.delays;
    }

    /// Start watching for SIGUSR1 to reload config from file
    ///
    /// When SIGUSR1 is received, the config file is re-read and the merged
    /// configuration is sent to subscribers via the watch channel. Request
    /// handlers borrow the latest value on every call.
    #[cfg(unix)]
    pub async fn start_config_watcher(
        config_file: std::path::PathBuf,
        current_config: Self,
        config_tx: watch::Sender<Self>,
    ) {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigusr1 = match signal(SignalKind::user_defined1()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "Failed to register SIGUSR1 handler");
                return;
            }
        };

        let mut config = current_config;

        loop {
            sigusr1.recv().await;
            tracing::info!(
                config_file = %config_file.display(),
                "Received SIGUSR1, reloading config"
            );

            match Self::from_file(&config_file).await {
                Ok(new_config) => {
                    config.merge_reloadable(&new_config);

                    if config_tx.send(config.clone()).is_err() {
                        tracing::warn!("No config subscribers, reload had no effect");
                    } else {
                        tracing::info!(
                            restore_tier = %config.restore_tier,
                            archive_selection = %config.archive_selection,
                            max_rows_per_chunk = config.max_rows_per_chunk,
                            "Config reloaded successfully"
                        );
                    }
                }
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        config_file = %config_file.display(),
                        "Failed to reload config"
                    );
                }
            }
        }
    }

    /// Return a display-safe version of the database URL (password masked)
    pub fn database_url_display(&self) -> String {
        // URL format: scheme://[user[:password]@]host[:port]/path
        let authority_start = match self.database_url.find("://") {
            Some(pos) => pos + 3,
            None => return self.database_url.clone(),
        };

        // The last @ ends the userinfo; passwords may contain '@'
        let at_pos = match self.database_url[authority_start..].rfind('@') {
            Some(pos) => authority_start + pos,
            None => return self.database_url.clone(),
        };

        match self.database_url[authority_start..at_pos].find(':') {
            Some(relative_colon_pos) => {
                let colon_pos = authority_start + relative_colon_pos;
                format!(
                    "{}****{}",
                    &self.database_url[..colon_pos + 1],
                    &self.database_url[at_pos..]
                )
            }
            None => self.database_url.clone(),
        }
    }
}
