// Copyright (C) 2024 GhostFS contributors
// Licensed under the GNU General Public License, version 2.0 (GPL-2.0-only).
// This program is free software: you can redistribute it and/or modify it
// under the terms of that license.
// This program is distributed in the hope that it will be useful, but
// WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU General Public License for more details.

//! The block cache subsystem (§2-§5 of the design): a bounded, fixed-block
//! content cache with LRU eviction, per-block single-writer locks, and
//! single-flight prefetch.

pub mod buffer;
pub mod pool;
pub mod prefetch;
pub mod read_path;
pub mod slot;

pub use pool::{BlockPool, PoolStats};
