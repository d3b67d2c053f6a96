// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Prometheus metrics for the restore-and-copy manager

use std::sync::Once;

use prometheus::{Counter, Opts, Registry, TextEncoder};

// Metric definitions are constant; a failure here is a programming error.
// The module scopes the clippy allow to just these definitions.
#[allow(clippy::expect_used)]
mod metrics_impl {
    use super::*;
    use lazy_static::lazy_static;

    lazy_static! {
        /// Registry for all manager metrics
        pub static ref REGISTRY: Registry = Registry::new();

        pub static ref RESTORE_SUBMISSIONS: Counter = Counter::with_opts(
            Opts::new(
                "restore_copy_manager_restore_submissions_total",
                "Restore jobs accepted by the bulk-operation service"
            )
        ).expect("valid metric name");

        pub static ref COPY_SUBMISSIONS: Counter = Counter::with_opts(
            Opts::new(
                "restore_copy_manager_copy_submissions_total",
                "Copy jobs accepted by the bulk-operation service"
            )
        ).expect("valid metric name");

        /// Job submissions the bulk-operation service rejected or that
        /// returned no job id
        pub static ref SUBMISSION_FAILURES: Counter = Counter::with_opts(
            Opts::new(
                "restore_copy_manager_submission_failures_total",
                "Bulk job submissions that failed"
            )
        ).expect("valid metric name");

        /// Ledger writes that failed after a job was already submitted
        pub static ref LEDGER_WRITE_FAILURES: Counter = Counter::with_opts(
            Opts::new(
                "restore_copy_manager_ledger_write_failures_total",
                "Ledger writes that failed"
            )
        ).expect("valid metric name");

        pub static ref NOTIFICATION_FAILURES: Counter = Counter::with_opts(
            Opts::new(
                "restore_copy_manager_notification_failures_total",
                "Notifications that could not be published"
            )
        ).expect("valid metric name");
    }
}

pub use metrics_impl::{
    COPY_SUBMISSIONS, LEDGER_WRITE_FAILURES, NOTIFICATION_FAILURES, REGISTRY,
    RESTORE_SUBMISSIONS, SUBMISSION_FAILURES,
};

static REGISTER: Once = Once::new();

/// Register all metrics with the registry
///
/// Called during application startup. Later calls do nothing, so tests
/// sharing one process may each call it.
/// Panics if registration fails (indicates a programming error).
#[allow(clippy::expect_used)]
pub fn register_metrics() {
    REGISTER.call_once(|| {
        REGISTRY
            .register(Box::new(RESTORE_SUBMISSIONS.clone()))
            .expect("Failed to register RESTORE_SUBMISSIONS");
        REGISTRY
            .register(Box::new(COPY_SUBMISSIONS.clone()))
            .expect("Failed to register COPY_SUBMISSIONS");
        REGISTRY
            .register(Box::new(SUBMISSION_FAILURES.clone()))
            .expect("Failed to register SUBMISSION_FAILURES");
        REGISTRY
            .register(Box::new(LEDGER_WRITE_FAILURES.clone()))
            .expect("Failed to register LEDGER_WRITE_FAILURES");
        REGISTRY
            .register(Box::new(NOTIFICATION_FAILURES.clone()))
            .expect("Failed to register NOTIFICATION_FAILURES");
    });
}

/// Get metrics in Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}

pub fn record_restore_submission() {
    RESTORE_SUBMISSIONS.inc();
}

pub fn record_copy_submission() {
    COPY_SUBMISSIONS.inc();
}

pub fn record_submission_failure() {
    SUBMISSION_FAILURES.inc();
}

/// Record a ledger write failure
///
/// Call this when the ledger could not record a job that the bulk service
/// already accepted; the job is running but the ledger does not know it.
pub fn record_ledger_write_failure() {
    LEDGER_WRITE_FAILURES.inc();
}

pub fn record_notification_failure() {
    NOTIFICATION_FAILURES.inc();
}
