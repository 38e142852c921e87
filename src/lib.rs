// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! bucketwatch: Bucket Poller & Live Image Feed
//!
//! Polls a storage bucket for new images, mirrors them into a local cache,
//! raises desktop alerts and pushes every arrival to connected browsers.

pub mod cache;
pub mod config;
pub mod desktop;
pub mod error;
pub mod location;
pub mod notifier;
pub mod poller;
pub mod recency;
pub mod seen;
pub mod storage;
pub mod web;

pub use config::AppConfig;
pub use error::{BucketwatchError, Result};
