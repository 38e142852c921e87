// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use std::sync::OnceLock;

use bucketwatch::cache::LocalImageCache;
use bucketwatch::recency::{extract_time, recent_images};

#[derive(Arbitrary, Debug)]
struct Input {
    names: Vec<String>,
    window: u8,
    max_minutes: u8,
}

fn cache() -> &'static LocalImageCache {
    static CACHE: OnceLock<LocalImageCache> = OnceLock::new();
    CACHE.get_or_init(|| {
        let root = std::env::temp_dir().join("bucketwatch-fuzz");
        LocalImageCache::open(&root, ".jpg").expect("fuzz cache dir")
    })
}

fuzz_target!(|input: Input| {
    for name in &input.names {
        if let Some(time) = extract_time(name, ".jpg") {
            assert!(time.hour() < 24 && time.minute() < 60);
        }
        if let Ok(path) = cache().local_path(name) {
            assert_eq!(path.parent(), Some(cache().root()));
        }
    }

    let recent = recent_images(&input.names, ".jpg", input.window as usize, input.max_minutes as i32);
    assert!(recent.len() <= input.window as usize);
    assert!(recent.iter().all(|r| input.names.contains(r)));
});
