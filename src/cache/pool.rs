// Copyright (C) 2024 GhostFS contributors
// Licensed under the GNU General Public License, version 2.0 (GPL-2.0-only).
// This program is free software: you can redistribute it and/or modify it
// under the terms of that license.
// This program is distributed in the hope that it will be useful, but
// WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU General Public License for more details.

//! The fixed-size block pool: a set of [`Buffer`]s, the LRU ordering among
//! the unpinned ones, and allocation/eviction (§4.1).
//!
//! Grounded on `cache.h`/`cache.cc` in the original source: `allocate_block`,
//! `lock_block` and `unlock_block` map directly to [`BlockPool::allocate`],
//! [`BlockPool::pin`] and [`BlockPool::unpin`] below. The LRU list there is
//! an intrusive `boost::intrusive::list` embedded in `struct block`; here it
//! is an index-based arena of doubly-linked nodes (§9), since Rust has no
//! equivalent of an intrusive list without unsafe pointer juggling.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::buffer::{Buffer, BufferId};
use super::slot::{SlotHandle, SlotLock};
use crate::error::{GhostError, Result};

#[derive(Debug, Clone, Copy, Default)]
struct LruLink {
    prev: Option<BufferId>,
    next: Option<BufferId>,
    in_lru: bool,
}

struct PoolInner {
    buffers: Vec<Arc<Buffer>>,
    owners: Vec<Option<SlotHandle>>,
    links: Vec<LruLink>,
    head: Option<BufferId>,
    tail: Option<BufferId>,
    used: usize,
}

impl PoolInner {
    fn unlink(&mut self, id: BufferId) {
        let (prev, next) = {
            let link = &self.links[id.0];
            (link.prev, link.next)
        };
        match prev {
            Some(p) => self.links[p.0].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.links[n.0].prev = prev,
            None => self.tail = prev,
        }
        let link = &mut self.links[id.0];
        link.prev = None;
        link.next = None;
        link.in_lru = false;
    }

    fn push_front(&mut self, id: BufferId) {
        let old_head = self.head;
        self.links[id.0] = LruLink {
            prev: None,
            next: old_head,
            in_lru: true,
        };
        match old_head {
            Some(h) => self.links[h.0].prev = Some(id),
            None => self.tail = Some(id),
        }
        self.head = Some(id);
    }

    fn pop_back(&mut self) -> Option<BufferId> {
        let victim = self.tail?;
        self.unlink(victim);
        Some(victim)
    }
}

pub struct PoolStats {
    pub hits: u64,
    pub misses: u64,
}

impl PoolStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

pub struct BlockPool {
    inner: Mutex<PoolInner>,
    block_size: usize,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl BlockPool {
    pub fn new(capacity: usize, block_size: usize) -> Self {
        BlockPool {
            inner: Mutex::new(PoolInner {
                buffers: Vec::with_capacity(capacity),
                owners: Vec::with_capacity(capacity),
                links: Vec::with_capacity(capacity),
                head: None,
                tail: None,
                used: 0,
            }),
            block_size,
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Assign a pinned buffer to `slot`. Preconditions (§4.1): the caller
    /// holds `slot`'s lock (proven by the `guard: &impl SlotLock` parameter,
    /// satisfied by either `SlotGuard` on the read path or `OwnedSlotGuard`
    /// on the prefetch path) and the slot is currently `Empty`
    /// (`guard.buffer_id().is_none()`).
    pub fn allocate(&self, slot: &SlotHandle, guard: &impl SlotLock) -> Result<BufferId> {
        debug_assert!(guard.buffer_id().is_none(), "allocate on a non-empty slot");
        let mut inner = self.inner.lock();

        let id = if inner.used < self.capacity {
            let id = BufferId(inner.used);
            inner.buffers.push(Arc::new(Buffer::new(self.block_size)));
            inner.owners.push(Some(slot.clone()));
            inner.links.push(LruLink::default());
            inner.used += 1;
            id
        } else {
            let victim = inner.pop_back().ok_or_else(|| {
                GhostError::InvariantViolation(
                    "block pool exhausted with no unpinned buffer available".to_string(),
                )
            })?;
            let prior_owner = inner.owners[victim.0]
                .take()
                .expect("lru member always has an owner");
            // Safe without taking the prior owner's coarse lock: the
            // buffer was unpinned, so by the pin/lock duality invariant
            // nobody holds `prior_owner`'s SlotGuard right now.
            prior_owner.evict();
            inner.owners[victim.0] = Some(slot.clone());
            victim
        };

        guard.set_loading(id);
        trace!(buffer = id.0, "allocated buffer");
        Ok(id)
    }

    /// Remove a buffer from the LRU list (pin it). Returns a handle to its
    /// bytes, usable without holding `pool_mutex`.
    pub fn pin(&self, id: BufferId) -> Arc<Buffer> {
        let mut inner = self.inner.lock();
        debug_assert!(inner.links[id.0].in_lru, "pin of an already-pinned buffer");
        inner.unlink(id);
        inner.buffers[id.0].clone()
    }

    /// Look up a buffer already known to be pinned (e.g. one just returned
    /// by [`BlockPool::allocate`], which never adds its buffer to the LRU
    /// list), without touching LRU state.
    pub fn buffer(&self, id: BufferId) -> Arc<Buffer> {
        self.inner.lock().buffers[id.0].clone()
    }

    /// Return a buffer to the front of the LRU list (unpin it), making it
    /// the most-recently-used eviction candidate.
    pub fn unpin(&self, id: BufferId) {
        let mut inner = self.inner.lock();
        debug_assert!(!inner.links[id.0].in_lru, "double unpin of buffer {:?}", id);
        inner.push_front(id);
        debug!(buffer = id.0, "unpinned buffer");
    }
}

#[cfg(test)]
mod pool_test {
    use super::BlockPool;
    use crate::cache::slot::{BlockSlot, SlotLock};

    #[test]
    fn allocate_reuses_buffers_once_at_capacity() {
        let pool = BlockPool::new(1, 16);
        let slot_a = BlockSlot::new().into();
        let guard_a = slot_a.lock();
        let id_a = pool.allocate(&slot_a, &guard_a).unwrap();
        pool.unpin(id_a);

        let slot_b = BlockSlot::new().into();
        let guard_b = slot_b.lock();
        let id_b = pool.allocate(&slot_b, &guard_b).unwrap();
        pool.unpin(id_b);

        // capacity 1: the second allocate recycled the same buffer.
        assert_eq!(id_a, id_b);
        assert!(!guard_a.is_present());
    }

    #[test]
    fn allocate_fails_when_every_buffer_is_pinned() {
        let pool = BlockPool::new(1, 16);
        let slot_a = BlockSlot::new().into();
        let guard_a = slot_a.lock();
        pool.allocate(&slot_a, &guard_a).unwrap(); // never unpinned

        let slot_b = BlockSlot::new().into();
        let guard_b = slot_b.lock();
        assert!(pool.allocate(&slot_b, &guard_b).is_err());
    }
}
