// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Recency filter over filename-encoded timestamps
//!
//! Uploaded images carry their capture time in the six characters right
//! before the suffix, e.g. `emg_101501.jpg`. The first two digits are the
//! hour and the next two the minute. The last two are opaque and ignored.

use chrono::{NaiveTime, Timelike};

/// Width of the timestamp field before the suffix
const STAMP_WIDTH: usize = 6;

/// Hour and minute decoded from a filename
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilenameTime {
    time: NaiveTime,
}

impl FilenameTime {
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(|time| Self { time })
    }

    pub fn hour(&self) -> u32 {
        self.time.hour()
    }

    pub fn minute(&self) -> u32 {
        self.time.minute()
    }

    /// Minutes since midnight
    pub fn minute_of_day(&self) -> i32 {
        (self.hour() * 60 + self.minute()) as i32
    }
}

/// Decode the timestamp field of `filename`
///
/// The six characters before `suffix` are `HHMMxx`; the trailing pair is
/// never inspected. Returns `None` when the suffix is missing, the field is
/// too short, or `HHMM` is not a valid hour and minute.
pub fn extract_time(filename: &str, suffix: &str) -> Option<FilenameTime> {
    let stem = filename.strip_suffix(suffix)?;
    let start = stem.len().checked_sub(STAMP_WIDTH)?;
    let stamp = stem.get(start..)?;
    if !stamp.as_bytes()[..4].iter().all(u8::is_ascii_digit) {
        return None;
    }

    let hour = stamp[0..2].parse().ok()?;
    let minute = stamp[2..4].parse().ok()?;
    FilenameTime::new(hour, minute)
}

/// Select the files that arrived "just now"
///
/// Considers the last `window` entries of `files` (in listing order) and
/// keeps those whose minute-of-day lies within `[0, max_minutes]` behind the
/// final entry. There is no midnight rollover: entries from the previous day
/// compute a negative or oversized distance and drop out.
pub fn recent_images(files: &[String], suffix: &str, window: usize, max_minutes: i32) -> Vec<String> {
    let start = files.len().saturating_sub(window);
    let candidates = &files[start..];

    let Some(last) = candidates.last() else {
        return Vec::new();
    };
    let Some(reference) = extract_time(last, suffix) else {
        tracing::debug!("Most recent file {:?} has no timestamp, skipping recency", last);
        return Vec::new();
    };

    candidates
        .iter()
        .filter(|name| match extract_time(name, suffix) {
            Some(time) => {
                let diff = reference.minute_of_day() - time.minute_of_day();
                (0..=max_minutes).contains(&diff)
            }
            None => false,
        })
        .cloned()
        .collect()
}
