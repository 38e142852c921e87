// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Google Cloud Storage JSON API client

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Url};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::{RemoteObject, RemoteStore};
use crate::config::StorageConfig;
use crate::{BucketwatchError, Result};

/// Bucket client for `storage/v1`
pub struct GcsStore {
    client: Client,
    endpoint: String,
    bucket: String,
    token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    items: Vec<ListedObject>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct ListedObject {
    name: String,
    updated: Option<DateTime<Utc>>,
    // the API encodes 64-bit sizes as strings
    size: Option<String>,
}

impl From<ListedObject> for RemoteObject {
    fn from(item: ListedObject) -> Self {
        Self {
            size: item.size.and_then(|s| s.parse().ok()),
            updated: item.updated,
            name: item.name,
        }
    }
}

impl GcsStore {
    /// Create a client from config, reading the bearer token from the environment
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        let token = std::env::var(&config.access_token_env)
            .ok()
            .filter(|t| !t.trim().is_empty());
        if token.is_none() {
            debug!("{} not set, using unauthenticated requests", config.access_token_env);
        }
        Self::new(
            &config.endpoint,
            &config.bucket,
            token,
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn new(endpoint: &str, bucket: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            bucket: bucket.to_string(),
            token,
        })
    }

    /// `{endpoint}/storage/v1/b/{bucket}/o[/{object}]` with each part percent-encoded
    fn objects_url(&self, object: Option<&str>) -> Result<Url> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| BucketwatchError::Config(format!("Invalid storage endpoint: {}", e)))?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                BucketwatchError::Config(format!("Storage endpoint cannot be a base: {}", self.endpoint))
            })?;
            segments
                .pop_if_empty()
                .extend(["storage", "v1", "b", self.bucket.as_str(), "o"]);
            if let Some(name) = object {
                segments.push(name);
            }
        }
        Ok(url)
    }

    fn get(&self, url: Url) -> RequestBuilder {
        let request = self.client.get(url);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl RemoteStore for GcsStore {
    async fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>> {
        let mut objects = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = self.objects_url(None)?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("prefix", prefix);
                query.append_pair("fields", "items(name,updated,size),nextPageToken");
                if let Some(token) = &page_token {
                    query.append_pair("pageToken", token);
                }
            }

            let response = self.get(url).send().await?;
            if !response.status().is_success() {
                return Err(BucketwatchError::Storage(format!(
                    "listing {:?} returned status {}",
                    prefix,
                    response.status()
                )));
            }

            let page: ListResponse = response.json().await?;
            objects.extend(page.items.into_iter().map(RemoteObject::from));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!("Listed {} objects under {:?}", objects.len(), prefix);
        Ok(objects)
    }

    async fn download(&self, object: &RemoteObject, destination: &Path) -> Result<()> {
        let mut url = self.objects_url(Some(&object.name))?;
        url.query_pairs_mut().append_pair("alt", "media");

        let mut response = self.get(url).send().await?;
        if !response.status().is_success() {
            return Err(BucketwatchError::Storage(format!(
                "downloading {} returned status {}",
                object.name,
                response.status()
            )));
        }

        let mut file = tokio::fs::File::create(destination).await?;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        Ok(())
    }
}
