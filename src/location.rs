// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Last-known location lookup

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::AppConfig;
use crate::{BucketwatchError, Result};

/// A latitude/longitude pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

/// Key/value source of the last-known location
#[async_trait]
pub trait LocationStore: Send + Sync {
    /// Read the location stored under `key`
    async fn read(&self, key: &str) -> Result<Location>;
}

/// Realtime-database style store: `GET {base}/{key}.json`
pub struct HttpLocationStore {
    client: Client,
    base_url: String,
}

/// Coordinates are stored either as numbers or as numeric strings
#[derive(Deserialize)]
#[serde(untagged)]
enum Coordinate {
    Number(f64),
    Text(String),
}

#[derive(Deserialize)]
struct StoredLocation {
    latitude: Coordinate,
    longitude: Coordinate,
}

impl Coordinate {
    fn value(self, field: &str) -> Result<f64> {
        match self {
            Coordinate::Number(n) => Ok(n),
            Coordinate::Text(s) => s.trim().parse().map_err(|_| {
                BucketwatchError::LocationUnavailable(format!("{} is not a number: {:?}", field, s))
            }),
        }
    }
}

impl HttpLocationStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl LocationStore for HttpLocationStore {
    async fn read(&self, key: &str) -> Result<Location> {
        let url = format!("{}/{}.json", self.base_url, key.trim_matches('/'));
        debug!("Reading location from {}", url);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(BucketwatchError::LocationUnavailable(format!(
                "store returned status {}",
                response.status()
            )));
        }

        let value: Option<StoredLocation> = response.json().await.map_err(|e| {
            BucketwatchError::LocationUnavailable(format!("unexpected payload: {}", e))
        })?;
        let stored = value.ok_or_else(|| {
            BucketwatchError::LocationUnavailable(format!("no value under {:?}", key))
        })?;

        Ok(Location {
            latitude: stored.latitude.value("latitude")?,
            longitude: stored.longitude.value("longitude")?,
        })
    }
}

/// Store that always answers with configured coordinates
pub struct StaticLocationStore(pub Location);

#[async_trait]
impl LocationStore for StaticLocationStore {
    async fn read(&self, _key: &str) -> Result<Location> {
        Ok(self.0)
    }
}

/// Store used when no location source is configured
pub struct NoLocationStore;

#[async_trait]
impl LocationStore for NoLocationStore {
    async fn read(&self, _key: &str) -> Result<Location> {
        Err(BucketwatchError::LocationUnavailable("no location source configured".to_string()))
    }
}

/// Pick the location source described by `config`
pub fn from_config(config: &AppConfig) -> Result<Arc<dyn LocationStore>> {
    if let Some(url) = &config.location.database_url {
        let timeout = Duration::from_secs(config.storage.timeout_secs);
        return Ok(Arc::new(HttpLocationStore::new(url, timeout)?));
    }
    match config.location.fixed {
        Some(location) => Ok(Arc::new(StaticLocationStore(location))),
        None => Ok(Arc::new(NoLocationStore)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Path, routing::get, Json, Router};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    async fn fake_db() -> String {
        let router = Router::new().route(
            "/:key",
            get(|Path(key): Path<String>| async move {
                match key.as_str() {
                    "location.json" => Json(serde_json::json!({ "latitude": "12.9716", "longitude": 77.5946 })),
                    "bad.json" => Json(serde_json::json!({ "latitude": "north", "longitude": 1 })),
                    _ => Json(serde_json::Value::Null),
                }
            }),
        );
        serve(router).await
    }

    #[tokio::test]
    async fn test_http_store_reads_mixed_coordinates() {
        let base = fake_db().await;
        let store = HttpLocationStore::new(&base, Duration::from_secs(5)).unwrap();
        let location = store.read("location").await.unwrap();
        assert_eq!(location, Location { latitude: 12.9716, longitude: 77.5946 });
    }

    #[tokio::test]
    async fn test_http_store_missing_value() {
        let base = fake_db().await;
        let store = HttpLocationStore::new(&base, Duration::from_secs(5)).unwrap();
        let err = store.read("elsewhere").await.unwrap_err();
        assert!(matches!(err, BucketwatchError::LocationUnavailable(_)));
    }

    #[tokio::test]
    async fn test_http_store_bad_coordinate() {
        let base = fake_db().await;
        let store = HttpLocationStore::new(&base, Duration::from_secs(5)).unwrap();
        assert!(matches!(
            store.read("bad").await,
            Err(BucketwatchError::LocationUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_from_config_prefers_fixed_over_nothing() {
        let mut config = AppConfig::default();
        assert!(from_config(&config).unwrap().read("location").await.is_err());

        config.location.fixed = Some(Location { latitude: 1.0, longitude: 2.0 });
        let store = from_config(&config).unwrap();
        tokio_test::assert_ok!(store.read("location").await);
    }
}
