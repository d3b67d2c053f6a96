// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Shared HTTP client construction

use std::time::Duration;

use reqwest::Client;

/// Install the process-wide rustls crypto provider.
///
/// reqwest is built without a provider, so this must run before the first
/// client is built. Repeated calls are harmless.
pub fn install_crypto_provider() {
    // Err only means a provider is already installed
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Build a reqwest client with the configured request timeout
pub fn build_client(timeout_secs: u64) -> Result<Client, reqwest::Error> {
    install_crypto_provider();
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
}

/// Join a base URL and a path without doubling the separator
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
