// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Restore-and-Copy Manager Service
//!
//! Serves the workflow step API. Each step is one request:
//!
//! - Counts archived keys and writes one manifest per chunk
//! - Submits each manifest as a restore job
//! - Records completions in the PostgreSQL ledger
//! - Submits copy jobs once each restore's tier delay has passed

use anyhow::{Context, Result};
use dropshot::{ConfigDropshot, ConfigLogging, ConfigLoggingLevel, HttpServerStarter};
use tokio::sync::watch;
use tracing::info;

use restore_copy_manager::RestoreCopyManagerImpl;
use restore_copy_manager::config::ManagerConfig;
use restore_copy_manager::context::ApiContext;
use restore_copy_manager::http::install_crypto_provider;
use restore_copy_manager::jobs::scheduler;
use restore_copy_manager::metrics;

/// Default bind address for the HTTP server.
const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8890";

/// Default maximum request body size (bytes).
const DEFAULT_BODY_MAX_BYTES: usize = 10 * 1024 * 1024; // 10MB

fn print_version() {
    let version = env!("CARGO_PKG_VERSION");
    let name = env!("CARGO_PKG_NAME");
    let buildstamp = option_env!("STAMP").unwrap_or("no-STAMP");
    println!("{} {} ({})", name, version, buildstamp);
}

fn print_help(program: &str) {
    print_version();
    println!("Usage: {} [OPTIONS]", program);
    println!();
    println!("Options:");
    println!("  -h, --help       Display this information");
    println!("  -V, --version    Display the program's version number");
    println!();
    println!("Environment variables (required):");
    println!("  DATABASE_URL         PostgreSQL connection URL for the job ledger");
    println!("  QUERY_ENGINE_URL     Query engine base URL");
    println!("  BULK_SERVICE_URL     Bulk-operation service base URL");
    println!("  SOURCE_BUCKET        Bucket whose archived objects are restored");
    println!("  MANIFEST_BUCKET      Scratch bucket for chunk manifests");
    println!("  REPORT_BUCKET        Bucket for bulk job completion reports");
    println!("  DESTINATION_BUCKET   Bucket restored objects are copied to");
    println!("  CATALOG_DATABASE     Inventory catalog database");
    println!("  CATALOG_TABLE        Inventory catalog table");
    println!("  BULK_JOB_ROLE        Role the bulk-operation service assumes");
    println!();
    println!("Environment variables (optional):");
    println!(
        "  BIND_ADDRESS         Server bind address (default: {})",
        DEFAULT_BIND_ADDRESS
    );
    println!("  ARCHIVE_STORAGE_CLASS  GLACIER, DEEP_ARCHIVE or GLACIER_AND_DEEP_ARCHIVE");
    println!("  INCLUDED_OBJECT_VERSIONS  Current or All (default: Current)");
    println!("  RESTORE_TIER         STANDARD or BULK (default: BULK)");
    println!("  MAX_ROWS_PER_CHUNK   Rows per manifest (default: 1000000)");
    println!("  SWEEP_INTERVAL_SECS  In-process sweep interval, 0 disables (default: 0)");
    println!("  NOTIFY_URL           Notification webhook (default: log only)");
    println!("  CONFIG_FILE          Path to JSON config file for SIGUSR1 reloading");
    println!(
        "  RUST_LOG             Log filter (default: restore_copy_manager=info,dropshot=info)"
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    #[allow(clippy::never_loop)] // early return on first recognized arg
    for arg in &args[1..] {
        match arg.as_str() {
            "-V" | "--version" => {
                print_version();
                return Ok(());
            }
            "-h" | "--help" => {
                print_help(&args[0]);
                return Ok(());
            }
            _ => {
                eprintln!("Unknown option: {}", arg);
                std::process::exit(1);
            }
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "restore_copy_manager=info,dropshot=info".to_string()),
        ))
        .init();

    print_version();
    install_crypto_provider();
    metrics::register_metrics();

    let config = ManagerConfig::from_env().context("Failed to load configuration")?;
    info!("Database URL: {}", config.database_url_display());
    info!("Query engine URL: {}", config.query_engine_url);
    info!("Bulk service URL: {}", config.bulk_service_url);

    let (config_tx, config_rx) = watch::channel(config.clone());

    #[cfg(unix)]
    if let Ok(config_file) = std::env::var("CONFIG_FILE") {
        use std::path::PathBuf;

        let config_path = PathBuf::from(&config_file);
        if tokio::fs::try_exists(&config_path).await.unwrap_or(false) {
            tokio::spawn(ManagerConfig::start_config_watcher(
                config_path,
                config.clone(),
                config_tx,
            ));
            info!(
                config_file = %config_file,
                "Config watcher started - send SIGUSR1 to reload"
            );
        } else {
            tracing::warn!(
                config_file = %config_file,
                "CONFIG_FILE specified but file does not exist, config reloading disabled"
            );
        }
    }

    let api_context = ApiContext::new(config_rx)
        .await
        .context("Failed to create API context")?;

    if config.sweep_interval_secs > 0 {
        tokio::spawn(scheduler::run_periodic(
            api_context.scheduler(),
            api_context.config_receiver(),
            std::time::Duration::from_secs(config.sweep_interval_secs),
        ));
        info!(
            interval_secs = config.sweep_interval_secs,
            "Periodic copy sweeps enabled"
        );
    }

    let api = restore_copy_manager_api::restore_copy_manager_api_mod::api_description::<
        RestoreCopyManagerImpl,
    >()
    .map_err(|e| anyhow::anyhow!("Failed to create API description: {}", e))?;

    let bind_address = std::env::var("BIND_ADDRESS")
        .unwrap_or_else(|_| DEFAULT_BIND_ADDRESS.to_string())
        .parse()
        .context("Invalid BIND_ADDRESS")?;

    let config_dropshot = ConfigDropshot {
        bind_address,
        default_request_body_max_bytes: DEFAULT_BODY_MAX_BYTES,
        default_handler_task_mode: dropshot::HandlerTaskMode::Detached,
        ..Default::default()
    };

    let config_logging = ConfigLogging::StderrTerminal {
        level: ConfigLoggingLevel::Info,
    };

    let log = config_logging
        .to_logger("restore-copy-manager")
        .map_err(|error| anyhow::anyhow!("failed to create logger: {}", error))?;

    let server = HttpServerStarter::new(&config_dropshot, api, api_context, &log)
        .map_err(|error| anyhow::anyhow!("failed to create server: {}", error))?
        .start();

    info!("Restore-and-copy manager running on http://{}", bind_address);

    server
        .await
        .map_err(|error| anyhow::anyhow!("server failed: {}", error))
}
