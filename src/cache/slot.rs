// Copyright (C) 2024 GhostFS contributors
// Licensed under the GNU General Public License, version 2.0 (GPL-2.0-only).
// This program is free software: you can redistribute it and/or modify it
// under the terms of that license.
// This program is distributed in the hope that it will be useful, but
// WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU General Public License for more details.

//! Per (file, block index) cache metadata.
//!
//! A [`BlockSlot`] holds two independent locks, following the "separate
//! concerns" alternative from the design notes rather than overloading one
//! mutex as both single-writer lock and pin:
//!
//! - `lock`, the coarse single-writer lock serializing an entire miss-fetch
//!   or prefetch against concurrent operations on this slot. It is backed by
//!   `tokio::sync::Mutex` rather than `parking_lot::Mutex` because the two
//!   callers need different guard flavors over the same lock: the read path
//!   (§4.3) blocks synchronously on a plain OS thread (`blocking_lock`),
//!   while the prefetcher (§4.4) must hold the lock across a `tokio::spawn`
//!   boundary, which requires an owned, `'static` guard (`try_lock_owned`).
//!   A single `parking_lot::Mutex` cannot produce the latter; two separate
//!   locks would stop mutually excluding the two paths.
//! - `state`, an inner, always-uncontended `parking_lot::Mutex` guarding
//!   `(present, buffer)`. The pool touches it directly when evicting a
//!   *different* slot's buffer, without ever acquiring that slot's `lock` —
//!   by the time a buffer is unpinned and eligible for eviction, nobody
//!   holds the owning slot's `lock` (see the pin/lock duality invariant),
//!   so this is never contended. Keeping it as its own lock, always
//!   innermost, keeps the global lock order (`slot.lock` < `pool.mutex` <
//!   any `slot.state`) acyclic even though eviction runs while `pool.mutex`
//!   is already held.
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard, OwnedMutexGuard};

use super::buffer::BufferId;

#[derive(Default)]
struct SlotState {
    present: bool,
    buffer: Option<BufferId>,
}

pub struct BlockSlot {
    lock: Arc<AsyncMutex<()>>,
    state: Mutex<SlotState>,
}

impl Default for BlockSlot {
    fn default() -> Self {
        BlockSlot {
            lock: Arc::new(AsyncMutex::new(())),
            state: Mutex::new(SlotState::default()),
        }
    }
}

impl BlockSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the single-writer lock, blocking the calling (non-async) OS
    /// thread. Used by the read path.
    pub fn lock(&self) -> SlotGuard<'_> {
        SlotGuard {
            slot: self,
            _guard: self.lock.blocking_lock(),
        }
    }

    /// Only called by [`super::pool::BlockPool`] on the *victim* of an
    /// eviction, which is guaranteed unpinned and therefore not guarded by
    /// anyone's [`SlotGuard`]/[`OwnedSlotGuard`] at this instant.
    pub(super) fn evict(&self) {
        let mut state = self.state.lock();
        state.present = false;
        state.buffer = None;
    }
}

/// Shared, non-owning handle to a slot: cloned into a
/// [`super::buffer::Buffer`]'s current-owner back-reference so the pool can
/// reach the slot on eviction without a file table lookup, and cloned into
/// an [`OwnedSlotGuard`] so the prefetcher can hold the lock across a
/// `tokio::spawn` boundary (§9 "Back-reference cycle").
pub type SlotHandle = Arc<BlockSlot>;

/// Operations common to both guard flavors; [`super::pool::BlockPool::allocate`]
/// is generic over this trait so either guard serves as the
/// type-level proof that the slot's single-writer lock is held.
pub trait SlotLock {
    fn is_present(&self) -> bool;
    fn buffer_id(&self) -> Option<BufferId>;
    fn set_loading(&self, id: BufferId);
    fn mark_resident(&self);
    fn mark_empty(&self);
}

fn is_present(state: &Mutex<SlotState>) -> bool {
    state.lock().present
}

fn buffer_id(state: &Mutex<SlotState>) -> Option<BufferId> {
    state.lock().buffer
}

fn set_loading(state: &Mutex<SlotState>, id: BufferId) {
    let mut s = state.lock();
    s.present = false;
    s.buffer = Some(id);
}

fn mark_resident(state: &Mutex<SlotState>) {
    let mut s = state.lock();
    debug_assert!(s.buffer.is_some());
    s.present = true;
}

fn mark_empty(state: &Mutex<SlotState>) {
    let mut s = state.lock();
    s.present = false;
    s.buffer = None;
}

/// Guard returned by [`BlockSlot::lock`]: borrowed, used synchronously on
/// the thread that acquired it (the read path never crosses an `await`
/// while holding it).
pub struct SlotGuard<'a> {
    slot: &'a BlockSlot,
    _guard: AsyncMutexGuard<'a, ()>,
}

impl<'a> SlotLock for SlotGuard<'a> {
    fn is_present(&self) -> bool {
        is_present(&self.slot.state)
    }
    fn buffer_id(&self) -> Option<BufferId> {
        buffer_id(&self.slot.state)
    }
    fn set_loading(&self, id: BufferId) {
        set_loading(&self.slot.state, id)
    }
    fn mark_resident(&self) {
        mark_resident(&self.slot.state)
    }
    fn mark_empty(&self) {
        mark_empty(&self.slot.state)
    }
}

/// Guard returned by [`try_lock_owned`]: owns a clone of the slot handle and
/// an owned mutex guard, so it is `'static` and can be moved into a spawned
/// task (§4.4, §9 "Detached prefetch task").
pub struct OwnedSlotGuard {
    slot: SlotHandle,
    _guard: OwnedMutexGuard<()>,
}

impl SlotLock for OwnedSlotGuard {
    fn is_present(&self) -> bool {
        is_present(&self.slot.state)
    }
    fn buffer_id(&self) -> Option<BufferId> {
        buffer_id(&self.slot.state)
    }
    fn set_loading(&self, id: BufferId) {
        set_loading(&self.slot.state, id)
    }
    fn mark_resident(&self) {
        mark_resident(&self.slot.state)
    }
    fn mark_empty(&self) {
        mark_empty(&self.slot.state)
    }
}

/// `if !slot.mutex.try_lock(): return` from §4.4, step 1 — contended means
/// a fetch (read-path miss or another prefetch) is already in flight; skip,
/// a future read will re-prefetch.
pub fn try_lock_owned(slot: &SlotHandle) -> Option<OwnedSlotGuard> {
    let guard = slot.lock.clone().try_lock_owned().ok()?;
    Some(OwnedSlotGuard {
        slot: slot.clone(),
        _guard: guard,
    })
}

#[cfg(test)]
mod slot_test {
    use super::{try_lock_owned, BlockSlot, SlotHandle, SlotLock};
    use crate::cache::buffer::BufferId;

    #[test]
    fn fresh_slot_is_empty() {
        let slot: SlotHandle = BlockSlot::new().into();
        let guard = slot.lock();
        assert!(!guard.is_present());
        assert_eq!(guard.buffer_id(), None);
    }

    #[test]
    fn set_loading_then_mark_resident_round_trips_the_buffer_id() {
        let slot: SlotHandle = BlockSlot::new().into();
        let guard = slot.lock();
        guard.set_loading(BufferId(7));
        assert!(!guard.is_present());
        assert_eq!(guard.buffer_id(), Some(BufferId(7)));
        guard.mark_resident();
        assert!(guard.is_present());
        assert_eq!(guard.buffer_id(), Some(BufferId(7)));
    }

    #[test]
    fn try_lock_owned_fails_while_the_sync_guard_is_held() {
        let slot: SlotHandle = BlockSlot::new().into();
        let guard = slot.lock();
        assert!(try_lock_owned(&slot).is_none());
        drop(guard);
        assert!(try_lock_owned(&slot).is_some());
    }
}
