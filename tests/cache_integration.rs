// Copyright (C) 2024 GhostFS contributors
// Licensed under the GNU General Public License, version 2.0 (GPL-2.0-only).
// This program is free software: you can redistribute it and/or modify it
// under the terms of that license.
// This program is distributed in the hope that it will be useful, but
// WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU General Public License for more details.

//! Integration coverage for the concrete scenarios in SPEC_FULL.md §8:
//! pool + slot + read path + prefetcher wired together against an
//! in-memory fake protocol handler (no real network or FUSE mount).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ghostfs::cache::pool::BlockPool;
use ghostfs::cache::{prefetch, read_path};
use ghostfs::error::{GhostError, Result};
use ghostfs::file::File;
use ghostfs::protocol::ProtocolHandler;

const URL: &str = "fake://resource";

struct FakeHandler {
    content: Vec<u8>,
}

impl ProtocolHandler for FakeHandler {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn is_url_valid(&self, _url: &str) -> bool {
        true
    }

    fn get_content_length_for_url(&self, _url: &str) -> Result<u64> {
        Ok(self.content.len() as u64)
    }

    fn get_block(
        &self,
        _url: &str,
        block_id: u64,
        block_size: usize,
        _attrs: &HashMap<String, String>,
        out: &mut [u8],
    ) -> Result<usize> {
        let start = block_id as usize * block_size;
        if start >= self.content.len() {
            return Ok(0);
        }
        let end = (start + block_size).min(self.content.len());
        let n = end - start;
        out[..n].copy_from_slice(&self.content[start..end]);
        Ok(n)
    }
}

fn make_file(length: u64, block_size: usize) -> File {
    let file = File::new_empty();
    file.update_length(length, block_size);
    file.set_attribute("url", URL);
    file
}

#[test]
fn static_file_hit_bypasses_cache() {
    let pool = BlockPool::new(2, 4);
    let file = File::new_static(b"Hello World!\n");
    let handler = FakeHandler { content: Vec::new() };
    let (bytes, _) = read_path::read(&pool, &file, 0, 13, &handler, "").unwrap();
    assert_eq!(bytes, b"Hello World!\n");
    let stats = pool.stats();
    assert_eq!(stats.hits, 0);
    assert_eq!(stats.misses, 0);
}

#[test]
fn cold_miss_then_hit() {
    let pool = BlockPool::new(2, 4);
    let file = make_file(10, 4);
    let handler = FakeHandler {
        content: b"ABCDEFGHIJ".to_vec(),
    };

    let (bytes, _) = read_path::read(&pool, &file, 0, 4, &handler, URL).unwrap();
    assert_eq!(bytes, b"ABCD");
    assert_eq!(pool.stats().misses, 1);
    assert_eq!(pool.stats().hits, 0);

    let (bytes, _) = read_path::read(&pool, &file, 0, 4, &handler, URL).unwrap();
    assert_eq!(bytes, b"ABCD");
    assert_eq!(pool.stats().misses, 1);
    assert_eq!(pool.stats().hits, 1);
}

#[test]
fn eviction_keeps_used_within_capacity() {
    let pool = BlockPool::new(2, 4);
    let file = make_file(12, 4);
    let handler = FakeHandler {
        content: b"ABCDEFGHIJKL".to_vec(),
    };

    read_path::read(&pool, &file, 0, 4, &handler, URL).unwrap(); // block 0: miss
    read_path::read(&pool, &file, 4, 4, &handler, URL).unwrap(); // block 1: miss
    let (bytes, _) = read_path::read(&pool, &file, 8, 4, &handler, URL).unwrap(); // block 2: miss, evicts block 0
    assert_eq!(bytes, b"IJKL");
    assert_eq!(pool.stats().misses, 3);

    // Block 0 was evicted to make room for block 2; reading it again misses.
    let (bytes, _) = read_path::read(&pool, &file, 0, 4, &handler, URL).unwrap();
    assert_eq!(bytes, b"ABCD");
    assert_eq!(pool.stats().misses, 4);
}

#[test]
fn round_trip_matches_single_read() {
    let pool = BlockPool::new(4, 4);
    let file = make_file(12, 4);
    let handler = FakeHandler {
        content: b"ABCDEFGHIJKL".to_vec(),
    };

    let (whole, _) = read_path::read(&pool, &file, 0, 12, &handler, URL).unwrap();

    let pool2 = BlockPool::new(4, 4);
    let (first, _) = read_path::read(&pool2, &file, 0, 5, &handler, URL).unwrap();
    let (second, _) = read_path::read(&pool2, &file, 5, 7, &handler, URL).unwrap();
    let mut pieced = first;
    pieced.extend_from_slice(&second);

    assert_eq!(whole, pieced);
}

#[test]
fn short_read_on_non_final_block_surfaces_io_error() {
    struct ShortHandler;
    impl ProtocolHandler for ShortHandler {
        fn name(&self) -> &'static str {
            "short"
        }
        fn is_url_valid(&self, _url: &str) -> bool {
            true
        }
        fn get_content_length_for_url(&self, _url: &str) -> Result<u64> {
            Ok(8)
        }
        fn get_block(
            &self,
            _url: &str,
            _block_id: u64,
            _block_size: usize,
            _attrs: &HashMap<String, String>,
            out: &mut [u8],
        ) -> Result<usize> {
            Ok(out.len() - 1)
        }
    }

    let pool = BlockPool::new(2, 4);
    let file = make_file(8, 4); // 3 slots: block 0 and 1 are not final
    let handler = ShortHandler;

    let result = read_path::read(&pool, &file, 0, 4, &handler, URL);
    assert!(matches!(result, Err(GhostError::Io(_))));
    // the slot was released empty, not left pinned or resident
    assert_eq!(pool.stats().misses, 1);
}

#[test]
fn concurrent_reads_of_the_same_block_count_one_miss() {
    let pool = Arc::new(BlockPool::new(2, 4));
    let file = Arc::new(make_file(10, 4));
    let handler = Arc::new(FakeHandler {
        content: b"ABCDEFGHIJ".to_vec(),
    });

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let pool = pool.clone();
            let file = file.clone();
            let handler = handler.clone();
            std::thread::spawn(move || {
                read_path::read(&pool, &file, 0, 4, handler.as_ref(), URL).unwrap()
            })
        })
        .collect();

    for handle in handles {
        let (bytes, _) = handle.join().unwrap();
        assert_eq!(bytes, b"ABCD");
    }
    assert_eq!(pool.stats().misses, 1);
    assert_eq!(pool.stats().hits, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn prefetch_populates_the_next_block_without_a_read() {
    let pool = Arc::new(BlockPool::new(4, 4));
    let file = Arc::new(make_file(12, 4));
    let handler: Arc<dyn ProtocolHandler> = Arc::new(FakeHandler {
        content: b"ABCDEFGHIJKL".to_vec(),
    });
    let rt = tokio::runtime::Handle::current();

    prefetch::try_prefetch(&rt, pool.clone(), handler.clone(), file.clone(), 0, URL.to_string());

    // Give the detached task a bounded window to complete (§5 "Cancellation
    // and timeouts": no cancellation, but this test still needs to avoid
    // spinning forever on a broken implementation). The read itself takes
    // the slot's blocking mutex, which panics if called directly on an
    // async task's thread, so it runs via spawn_blocking like a real FUSE
    // callback thread would.
    let mut attempts = 0;
    loop {
        let pool = pool.clone();
        let file = file.clone();
        let handler = handler.clone();
        let (bytes, _) = tokio::task::spawn_blocking(move || {
            read_path::read(&pool, &file, 0, 4, handler.as_ref(), URL).unwrap()
        })
        .await
        .unwrap();
        if bytes == b"ABCD" && pool.stats().hits >= 1 {
            break;
        }
        attempts += 1;
        assert!(attempts < 200, "prefetch did not complete in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // The prefetch's own fetch should have counted as the single miss; the
    // read above should have hit the now-resident block.
    assert_eq!(pool.stats().misses, 1);
}
