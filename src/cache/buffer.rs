// Copyright (C) 2024 GhostFS contributors
// Licensed under the GNU General Public License, version 2.0 (GPL-2.0-only).
// This program is free software: you can redistribute it and/or modify it
// under the terms of that license.
// This program is distributed in the hope that it will be useful, but
// WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU General Public License for more details.

//! A single fixed-size buffer owned by the [`super::pool::BlockPool`] arena.
//!
//! A `Buffer` is never reallocated: its backing storage is sized once and
//! only ever reassigned between slots on eviction. `BufferId` is the
//! arena-relative index used everywhere instead of a pointer, so the
//! pool/slot mutual reference (§3, §9 of the design) is a pair of plain
//! indices/handles rather than a cycle of raw pointers.
//!
//! The bytes themselves live behind their own `Mutex`, independent of the
//! pool-wide `pool_mutex`: the pin/slot-lock discipline already guarantees
//! exclusive access whenever a buffer's contents are touched, so this lock
//! is never contended in practice — it exists only so callers get a safe
//! `&mut [u8]` without `unsafe`, without serializing on the pool lock for
//! the duration of a (potentially slow) fetch.

use parking_lot::{Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub usize);

pub struct Buffer {
    data: Mutex<Vec<u8>>,
}

impl Buffer {
    pub fn new(block_size: usize) -> Self {
        Buffer {
            data: Mutex::new(vec![0u8; block_size]),
        }
    }

    pub fn data(&self) -> MutexGuard<'_, Vec<u8>> {
        self.data.lock()
    }
}
