// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Remote object storage

pub mod gcs;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::Result;

pub use gcs::GcsStore;

/// An object in the remote bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteObject {
    /// Full object name, e.g. `images/emg_101501.jpg`
    pub name: String,
    #[serde(default)]
    pub updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub size: Option<u64>,
}

impl RemoteObject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            updated: None,
            size: None,
        }
    }

    /// Last path component of the object name
    pub fn basename(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    /// Size and upload time from the listing, formatted for log lines
    pub fn details(&self) -> String {
        match (self.size, self.updated) {
            (Some(size), Some(updated)) => format!(" ({} bytes, uploaded {})", size, updated.to_rfc3339()),
            (Some(size), None) => format!(" ({} bytes)", size),
            (None, Some(updated)) => format!(" (uploaded {})", updated.to_rfc3339()),
            (None, None) => String::new(),
        }
    }
}

/// Read access to a bucket of uploaded images
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// List every object whose name starts with `prefix`
    async fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>>;

    /// Write the contents of `object` to `destination`
    async fn download(&self, object: &RemoteObject, destination: &Path) -> Result<()>;
}
