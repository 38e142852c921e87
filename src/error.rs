// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Error types for bucketwatch

use thiserror::Error;

/// Result type alias for bucketwatch operations
pub type Result<T> = std::result::Result<T, BucketwatchError>;

/// bucketwatch error types
#[derive(Error, Debug)]
pub enum BucketwatchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid filename: {0:?}")]
    InvalidFilename(String),

    #[error("Location unavailable: {0}")]
    LocationUnavailable(String),

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("Notification error: {0}")]
    Notification(String),
}

impl BucketwatchError {
    /// True when the error means "the file is not there"
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::FileSystem(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}
