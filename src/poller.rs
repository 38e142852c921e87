// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Fixed-interval bucket poller
//!
//! Each cycle lists the bucket, downloads images that are not cached yet and
//! announces them. Cycles run as independent tasks, so a slow cycle never
//! holds back the next tick. A per-name in-flight claim keeps overlapping
//! cycles from fetching the same object twice.

use futures_util::future::join_all;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::cache::LocalImageCache;
use crate::desktop::DesktopNotifier;
use crate::notifier::{ClientEvent, Notifier};
use crate::storage::{RemoteObject, RemoteStore};
use crate::Result;

/// Outcome of one poll cycle
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PollReport {
    /// Objects returned by the listing
    pub listed: usize,
    /// Basenames downloaded in this cycle
    pub downloaded: Vec<String>,
    /// Basenames whose download failed
    pub failed: Vec<String>,
}

/// Names currently being downloaded
#[derive(Clone, Default)]
struct InFlight {
    names: Arc<Mutex<HashSet<String>>>,
}

/// Releases an in-flight claim when dropped
struct InFlightGuard {
    names: Arc<Mutex<HashSet<String>>>,
    name: String,
}

impl InFlight {
    fn claim(&self, name: &str) -> Option<InFlightGuard> {
        let mut names = self.names.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !names.insert(name.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            names: Arc::clone(&self.names),
            name: name.to_string(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut names = self.names.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        names.remove(&self.name);
    }
}

#[derive(Clone)]
pub struct Poller {
    store: Arc<dyn RemoteStore>,
    cache: LocalImageCache,
    notifier: Arc<Notifier>,
    desktop: Arc<dyn DesktopNotifier>,
    prefix: String,
    alert_title: String,
    in_flight: InFlight,
}

impl Poller {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        cache: LocalImageCache,
        notifier: Arc<Notifier>,
        desktop: Arc<dyn DesktopNotifier>,
        prefix: &str,
        alert_title: &str,
    ) -> Self {
        Self {
            store,
            cache,
            notifier,
            desktop,
            prefix: prefix.to_string(),
            alert_title: alert_title.to_string(),
            in_flight: InFlight::default(),
        }
    }

    /// Run one list-then-download cycle
    ///
    /// Fails only when the listing fails; per-object failures are logged
    /// and reported in [`PollReport::failed`].
    pub async fn poll_once(&self) -> Result<PollReport> {
        let objects = self.store.list(&self.prefix).await?;
        let mut report = PollReport {
            listed: objects.len(),
            ..PollReport::default()
        };

        let mut downloads = Vec::new();
        for object in objects {
            if !object.name.ends_with(self.cache.suffix()) {
                continue;
            }
            let filename = object.basename().to_string();
            if let Err(e) = self.cache.validate(&filename) {
                warn!("Skipping remote object {:?}: {}", object.name, e);
                continue;
            }

            // claim first, then check, so a finished download is always visible
            let Some(guard) = self.in_flight.claim(&filename) else {
                debug!("{} already downloading", filename);
                continue;
            };
            match self.cache.contains(&filename).await {
                Ok(true) => continue,
                Ok(false) => downloads.push(self.fetch(object, filename, guard)),
                Err(e) => warn!("Cannot check cache for {}: {}", filename, e),
            }
        }

        for (filename, outcome) in join_all(downloads).await {
            match outcome {
                Ok(()) => report.downloaded.push(filename),
                Err(e) => {
                    error!("Error downloading {}: {}", filename, e);
                    report.failed.push(filename);
                }
            }
        }

        Ok(report)
    }

    async fn fetch(
        &self,
        object: RemoteObject,
        filename: String,
        _guard: InFlightGuard,
    ) -> (String, Result<()>) {
        let outcome = self.download(&object, &filename).await;
        if outcome.is_ok() {
            self.announce(&filename);
        }
        (filename, outcome)
    }

    async fn download(&self, object: &RemoteObject, filename: &str) -> Result<()> {
        let partial = self.cache.partial_path(filename)?;
        if let Err(e) = self.store.download(object, &partial).await {
            self.cache.discard(&partial).await;
            return Err(e);
        }
        let path = match self.cache.commit(&partial, filename).await {
            Ok(path) => path,
            Err(e) => {
                self.cache.discard(&partial).await;
                return Err(e);
            }
        };
        info!("Downloaded {:?}{}", path, object.details());
        Ok(())
    }

    /// Tell web clients and the desktop about a fresh download
    fn announce(&self, filename: &str) {
        let clients = self.notifier.broadcast(ClientEvent::new_image(filename));
        debug!("Broadcast {} to {} clients", filename, clients);

        let body = format!("Image {} has been downloaded.", filename);
        if let Err(e) = self.desktop.notify(&self.alert_title, &body) {
            warn!("Desktop notification failed: {}", e);
        }
        if let Err(e) = self.desktop.play_alert() {
            warn!("Alert sound failed: {}", e);
        }
    }

    /// Poll every `interval` until `shutdown` flips to true
    pub async fn run(self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Polling {:?} every {:?}", self.prefix, interval);

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    let poller = self.clone();
                    tokio::spawn(async move {
                        match poller.poll_once().await {
                            Ok(report) if !report.downloaded.is_empty() || !report.failed.is_empty() => {
                                info!(
                                    "Poll cycle: {} listed, {} downloaded, {} failed",
                                    report.listed,
                                    report.downloaded.len(),
                                    report.failed.len()
                                );
                            }
                            Ok(report) => debug!("Poll cycle: {} listed, nothing new", report.listed),
                            Err(e) => error!("Error listing bucket: {}", e),
                        }
                    });
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Poller stopped");
    }
}
