// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Local mirror of downloaded images
//!
//! The presence of a file under the cache root is the only record that an
//! object was downloaded. Transfers land in a hidden `.part` file first and
//! are renamed into place once complete.

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::{BucketwatchError, Result};

#[derive(Debug, Clone)]
pub struct LocalImageCache {
    root: PathBuf,
    suffix: String,
}

impl LocalImageCache {
    /// Open the cache at `root`, creating the directory if needed
    pub fn open(root: &Path, suffix: &str) -> Result<Self> {
        if !root.exists() {
            std::fs::create_dir_all(root)?;
            info!("Created cache directory: {:?}", root);
        }
        let root = root.canonicalize()?;
        Ok(Self {
            root,
            suffix: suffix.to_string(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Check that `filename` names a plain image file directly under the root
    pub fn validate<'a>(&self, filename: &'a str) -> Result<&'a str> {
        let invalid = || BucketwatchError::InvalidFilename(filename.to_string());

        if filename.is_empty() || filename.starts_with('.') {
            return Err(invalid());
        }
        if filename.chars().any(|c| matches!(c, '/' | '\\' | '\0' | ':')) {
            return Err(invalid());
        }
        if !filename.ends_with(&self.suffix) || filename.len() == self.suffix.len() {
            return Err(invalid());
        }
        Ok(filename)
    }

    /// Path where `filename` lives once downloaded
    pub fn local_path(&self, filename: &str) -> Result<PathBuf> {
        let name = self.validate(filename)?;
        let path = self.root.join(name);
        if path.parent() != Some(self.root.as_path()) {
            return Err(BucketwatchError::InvalidFilename(filename.to_string()));
        }
        Ok(path)
    }

    /// Staging path for an in-progress download of `filename`
    pub fn partial_path(&self, filename: &str) -> Result<PathBuf> {
        let name = self.validate(filename)?;
        Ok(self.root.join(format!(".{}.part", name)))
    }

    /// Whether `filename` has already been downloaded
    pub async fn contains(&self, filename: &str) -> Result<bool> {
        let path = self.local_path(filename)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    /// Move a finished download into place
    pub async fn commit(&self, partial: &Path, filename: &str) -> Result<PathBuf> {
        let path = self.local_path(filename)?;
        tokio::fs::rename(partial, &path).await?;
        debug!("Committed {:?}", path);
        Ok(path)
    }

    /// Remove a staging file left by a failed download
    pub async fn discard(&self, partial: &Path) {
        if let Err(e) = tokio::fs::remove_file(partial).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!("Could not remove partial file {:?}: {}", partial, e);
            }
        }
    }

    /// Resolve an existing cached file for serving
    ///
    /// Follows symlinks and rejects anything that ends up outside the root.
    pub async fn open_path(&self, filename: &str) -> Result<PathBuf> {
        let path = self.local_path(filename)?;
        let resolved = tokio::fs::canonicalize(&path).await?;
        if !resolved.starts_with(&self.root) {
            return Err(BucketwatchError::InvalidFilename(filename.to_string()));
        }
        Ok(resolved)
    }

    /// Cached image names, sorted by name
    pub async fn list_images(&self) -> Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut names = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if self.validate(&name).is_err() {
                continue;
            }
            if entry.file_type().await?.is_file() {
                names.push(name);
            }
        }

        names.sort();
        Ok(names)
    }
}
