// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Clients for the external services the workflow drives
//!
//! Each collaborator is a narrow trait so the workflow steps can run against
//! in-memory fakes; the concrete implementations talk HTTP or S3.

pub mod bulk;
pub mod notify;
pub mod query;
pub mod store;

pub use bulk::{BulkError, BulkService, HttpBulkService};
pub use notify::{HttpNotifier, LogNotifier, Notifier};
pub use query::{HttpQueryEngine, InventoryQuery, QueryEngine, QueryError};
pub use store::{ManifestStore, S3ManifestStore, StoreError, StoredObject};
