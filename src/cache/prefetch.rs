// Copyright (C) 2024 GhostFS contributors
// Licensed under the GNU General Public License, version 2.0 (GPL-2.0-only).
// This program is free software: you can redistribute it and/or modify it
// under the terms of that license.
// This program is distributed in the hope that it will be useful, but
// WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU General Public License for more details.

//! Single-block readahead (§4.4).
//!
//! Grounded on `try_prefetch`/`do_prefetch` in `ghost_fs.cc` of the original
//! source: after satisfying a read, fire off a best-effort fetch of the
//! next block so a sequential reader rarely blocks on network I/O. Single
//! flight per slot is enforced by `try_lock` on the slot: a contended slot
//! means a fetch (another prefetch, or a racing read-path miss) is already
//! under way, so this prefetch is simply dropped.

use std::sync::Arc;

use tracing::{trace, warn};

use super::pool::BlockPool;
use super::slot::{try_lock_owned, SlotLock};
use crate::file::File;
use crate::protocol::ProtocolHandler;

/// Best-effort: fetch block `blk_id` of `file` into the cache if it is not
/// already resident and nobody else is already fetching it. Spawns a
/// detached `tokio` task and returns immediately; errors are logged, not
/// propagated, since no caller is waiting on a prefetch's outcome.
pub fn try_prefetch(
    rt: &tokio::runtime::Handle,
    pool: Arc<BlockPool>,
    handler: Arc<dyn ProtocolHandler>,
    file: Arc<File>,
    blk_id: usize,
    url: String,
) {
    if blk_id >= file.num_slots() {
        return;
    }
    let slot = file.slot(blk_id);
    let guard = match try_lock_owned(&slot) {
        Some(g) => g,
        None => {
            trace!(blk_id, "prefetch skipped: slot contended");
            return;
        }
    };
    if guard.buffer_id().is_some() {
        trace!(blk_id, "prefetch skipped: already resident");
        return;
    }

    let block_size = pool.block_size();
    // `fs` calls into this from plain `fuser` callback threads, not from
    // inside a tokio task, so the task is spawned against an explicit
    // `Handle` rather than the ambient `tokio::spawn` (which panics outside
    // a runtime context).
    rt.spawn(async move {
        let attrs = file.attributes_snapshot();
        let id = match pool.allocate(&slot, &guard) {
            Ok(id) => id,
            Err(e) => {
                warn!(blk_id, error = %e, "prefetch allocation failed");
                return;
            }
        };
        let buf = pool.buffer(id);

        // The handler is a blocking call (reqwest::blocking / positioned
        // file reads); run it on a blocking-pool thread so it never stalls
        // the tokio reactor that other prefetches and timers share.
        let result = tokio::task::spawn_blocking(move || {
            let mut data = buf.data();
            let n = handler.get_block(&url, blk_id as u64, block_size, &attrs, &mut data[..]);
            drop(data);
            n
        })
        .await;

        match result {
            Ok(Ok(_)) => {
                guard.mark_resident();
                trace!(blk_id, "prefetch complete");
            }
            Ok(Err(e)) => {
                warn!(blk_id, error = %e, "prefetch fetch failed");
                guard.mark_empty();
            }
            Err(join_err) => {
                warn!(blk_id, error = %join_err, "prefetch task panicked");
                guard.mark_empty();
            }
        }
        // §4.4 step 5: unpin unconditionally, whether the fetch succeeded
        // or failed, so the buffer rejoins the LRU list either way.
        pool.unpin(id);
        // `guard` (and with it the slot's single-writer lock) is released
        // here, on drop, regardless of which arm above ran.
    });
}
