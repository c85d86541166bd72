// Copyright (C) 2024 GhostFS contributors
// Licensed under the GNU General Public License, version 2.0 (GPL-2.0-only).
// This program is free software: you can redistribute it and/or modify it
// under the terms of that license.
// This program is distributed in the hope that it will be useful, but
// WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU General Public License for more details.

//! A single virtual file: its attributes, its static content (if any), and
//! the block slots backing a remote `url` attribute (§3 "File").
//!
//! Grounded on `ghost_file.h`/`ghost_file.cc` in the original source.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::cache::slot::{BlockSlot, SlotHandle};

pub const URL_ATTR: &str = "url";

pub struct File {
    /// Built-in files (`/HELLO`, `/CREDITS`) serve straight from here,
    /// bypassing the cache entirely (§4.3 step 2).
    static_content: Option<&'static [u8]>,
    length: AtomicU64,
    attributes: RwLock<HashMap<String, String>>,
    slots: RwLock<Vec<SlotHandle>>,
}

impl File {
    pub fn new_empty() -> Self {
        File {
            static_content: None,
            length: AtomicU64::new(0),
            attributes: RwLock::new(HashMap::new()),
            slots: RwLock::new(Vec::new()),
        }
    }

    pub fn new_static(content: &'static [u8]) -> Self {
        File {
            static_content: Some(content),
            length: AtomicU64::new(content.len() as u64),
            attributes: RwLock::new(HashMap::new()),
            slots: RwLock::new(Vec::new()),
        }
    }

    pub fn is_static(&self) -> bool {
        self.static_content.is_some()
    }

    pub fn static_content(&self) -> Option<&'static [u8]> {
        self.static_content
    }

    pub fn length(&self) -> u64 {
        self.length.load(Ordering::Relaxed)
    }

    /// Recompute the slot vector for a newly learned content length. Called
    /// only from `setxattr("url", ...)`.
    pub fn update_length(&self, new_length: u64, block_size: usize) {
        self.length.store(new_length, Ordering::Relaxed);
        let num_slots = (new_length as usize) / block_size + 1;
        let mut slots = self.slots.write();
        slots.clear();
        slots.reserve(num_slots);
        for _ in 0..num_slots {
            slots.push(SlotHandle::new(BlockSlot::new()));
        }
    }

    pub fn num_slots(&self) -> usize {
        self.slots.read().len()
    }

    pub fn slot(&self, blk_id: usize) -> SlotHandle {
        self.slots.read()[blk_id].clone()
    }

    pub fn set_attribute(&self, name: &str, value: &str) {
        self.attributes.write().insert(name.to_string(), value.to_string());
    }

    pub fn remove_attribute(&self, name: &str) -> bool {
        self.attributes.write().remove(name).is_some()
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        self.attributes.read().get(name).cloned()
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.read().contains_key(name)
    }

    pub fn attribute_names(&self) -> Vec<String> {
        self.attributes.read().keys().cloned().collect()
    }

    pub fn url(&self) -> Option<String> {
        self.attribute(URL_ATTR)
    }

    pub fn attributes_snapshot(&self) -> HashMap<String, String> {
        self.attributes.read().clone()
    }
}

#[cfg(test)]
mod file_test {
    use super::File;

    #[test]
    fn update_length_sizes_slots_to_cover_a_partial_final_block() {
        let file = File::new_empty();
        file.update_length(9, 4);
        assert_eq!(file.num_slots(), 3); // blocks [0,4) [4,8) [8,9)
        for i in 0..3 {
            file.slot(i); // does not panic
        }
    }

    #[test]
    fn attributes_round_trip_and_remove() {
        let file = File::new_empty();
        assert!(!file.has_attribute("url"));
        file.set_attribute("url", "http://example/x");
        assert_eq!(file.url().as_deref(), Some("http://example/x"));
        assert!(file.remove_attribute("url"));
        assert!(!file.has_attribute("url"));
        assert!(!file.remove_attribute("url"));
    }

    #[test]
    fn static_file_reports_its_content_as_length() {
        let file = File::new_static(b"hi\n");
        assert!(file.is_static());
        assert_eq!(file.length(), 3);
        assert_eq!(file.static_content(), Some(&b"hi\n"[..]));
    }
}
