// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Operator notifications
//!
//! Notifications are fire-and-forget: a failed publish is logged and
//! counted, never propagated into the workflow step that triggered it.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::http::build_client;
use crate::metrics;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, topic: &str, subject: &str, message: &str) -> anyhow::Result<()>;
}

/// Publish and swallow failures
pub async fn notify(notifier: &dyn Notifier, topic: &str, subject: &str, message: &str) {
    if let Err(e) = notifier.publish(topic, subject, message).await {
        metrics::record_notification_failure();
        tracing::warn!(error = %e, subject = %subject, "Failed to publish notification");
    }
}

#[derive(Debug, Serialize)]
struct WebhookMessage<'a> {
    topic: &'a str,
    subject: &'a str,
    message: &'a str,
}

/// Posts notifications to a webhook as JSON
pub struct HttpNotifier {
    client: Client,
    url: String,
}

impl HttpNotifier {
    pub fn new(url: String, timeout_secs: u64) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_client(timeout_secs)?,
            url,
        })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn publish(&self, topic: &str, subject: &str, message: &str) -> anyhow::Result<()> {
        self.client
            .post(&self.url)
            .json(&WebhookMessage {
                topic,
                subject,
                message,
            })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Writes notifications to the log only
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn publish(&self, topic: &str, subject: &str, message: &str) -> anyhow::Result<()> {
        tracing::info!(topic = %topic, subject = %subject, "{}", message);
        Ok(())
    }
}
