// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Real-time fan-out to connected web clients
//!
//! Two paths reach a client. Every fresh download is broadcast to all
//! subscribers. On connect, a client additionally receives the "just
//! arrived" images that no earlier client has been sent; that bookkeeping
//! uses one seen-set shared by all connections.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

use crate::config::RecencyConfig;
use crate::location::Location;
use crate::recency::recent_images;
use crate::seen::SeenSet;

/// Broadcast channel capacity
const BROADCAST_CAPACITY: usize = 256;

/// Server-to-client event, sent as a JSON text frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    NewImage { filename: String },
    LocationData(Location),
}

impl ClientEvent {
    pub fn new_image(filename: impl Into<String>) -> Self {
        Self::NewImage { filename: filename.into() }
    }
}

pub struct Notifier {
    broadcaster: broadcast::Sender<ClientEvent>,
    seen: Mutex<SeenSet>,
    recency: RecencyConfig,
    suffix: String,
}

impl Notifier {
    pub fn new(recency: RecencyConfig, suffix: &str) -> Self {
        let (broadcaster, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            broadcaster,
            seen: Mutex::new(SeenSet::new(recency.seen_capacity)),
            recency,
            suffix: suffix.to_string(),
        }
    }

    /// Send `event` to every connected client; returns how many received it
    pub fn broadcast(&self, event: ClientEvent) -> usize {
        // no subscribers is fine
        self.broadcaster.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.broadcaster.subscribe()
    }

    pub fn client_count(&self) -> usize {
        self.broadcaster.receiver_count()
    }

    /// The recent subset of `images` without seen-set bookkeeping
    pub fn recent(&self, images: &[String]) -> Vec<String> {
        recent_images(images, &self.suffix, self.recency.window, self.recency.max_minutes)
    }

    /// Catch-up events for a newly connected client
    ///
    /// Each recent image is marked seen in the same critical section that
    /// checks it, so concurrent connections never both receive it.
    pub fn catch_up(&self, images: &[String]) -> Vec<ClientEvent> {
        let recent = self.recent(images);
        let mut seen = self.seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let fresh: Vec<ClientEvent> = recent
            .into_iter()
            .filter(|name| seen.insert(name))
            .map(ClientEvent::new_image)
            .collect();

        debug!("Catch-up: {} new of {} cached", fresh.len(), images.len());
        fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn notifier() -> Notifier {
        Notifier::new(RecencyConfig::default(), ".jpg")
    }

    #[test]
    fn test_wire_format() {
        let json = serde_json::to_value(ClientEvent::new_image("emg_101501.jpg")).unwrap();
        assert_eq!(json, serde_json::json!({ "event": "new_image", "data": { "filename": "emg_101501.jpg" } }));

        let json = serde_json::to_value(ClientEvent::LocationData(Location {
            latitude: 12.9716,
            longitude: 77.5946,
        }))
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "event": "location_data", "data": { "latitude": 12.9716, "longitude": 77.5946 } })
        );
    }

    #[test]
    fn test_catch_up_pushes_each_name_once_across_clients() {
        let notifier = notifier();
        let images = names(&["emg_100000.jpg", "emg_100100.jpg", "emg_100200.jpg"]);

        assert_eq!(notifier.catch_up(&images).len(), 3);
        for _ in 0..5 {
            assert!(notifier.catch_up(&images).is_empty());
        }

        let more = names(&["emg_100000.jpg", "emg_100100.jpg", "emg_100200.jpg", "emg_100300.jpg"]);
        assert_eq!(notifier.catch_up(&more), vec![ClientEvent::new_image("emg_100300.jpg")]);
    }

    #[test]
    fn test_catch_up_on_empty_cache() {
        assert!(notifier().catch_up(&[]).is_empty());
    }

    #[test]
    fn test_catch_up_respects_seen_capacity() {
        let recency = RecencyConfig { seen_capacity: 1, ..RecencyConfig::default() };
        let notifier = Notifier::new(recency, ".jpg");

        notifier.catch_up(&names(&["a_100000.jpg"]));
        notifier.catch_up(&names(&["b_100000.jpg"]));
        // "a" was evicted and counts as unseen again
        assert_eq!(
            notifier.catch_up(&names(&["a_100000.jpg"])),
            vec![ClientEvent::new_image("a_100000.jpg")]
        );
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_subscribers() {
        let notifier = notifier();
        assert_eq!(notifier.broadcast(ClientEvent::new_image("lost.jpg")), 0);

        let mut first = notifier.subscribe();
        let mut second = notifier.subscribe();
        assert_eq!(notifier.client_count(), 2);
        assert_eq!(notifier.broadcast(ClientEvent::new_image("x_101500.jpg")), 2);

        assert_eq!(first.recv().await.unwrap(), ClientEvent::new_image("x_101500.jpg"));
        assert_eq!(second.recv().await.unwrap(), ClientEvent::new_image("x_101500.jpg"));
    }

    #[test]
    fn test_broadcast_ignores_seen_set() {
        let notifier = notifier();
        let images = names(&["x_101500.jpg"]);
        notifier.catch_up(&images);

        let mut rx = notifier.subscribe();
        notifier.broadcast(ClientEvent::new_image("x_101500.jpg"));
        assert_eq!(rx.try_recv().unwrap(), ClientEvent::new_image("x_101500.jpg"));
    }
}
