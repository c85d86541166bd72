// Copyright (C) 2024 GhostFS contributors
// Licensed under the GNU General Public License, version 2.0 (GPL-2.0-only).
// This program is free software: you can redistribute it and/or modify it
// under the terms of that license.
// This program is distributed in the hope that it will be useful, but
// WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU General Public License for more details.

//! The read path (§4.3): turn a `(file, offset, size)` request into bytes,
//! resolving each covered block through the cache.
//!
//! Grounded on `ghost_read` in `ghost_fs.cc` of the original source: clamp
//! against the file length, walk the covered blocks one at a time, and for
//! each one either copy straight out of a resident buffer or fetch it
//! through the file's protocol handler. `slot.lock()` is held for the
//! entire fetch, so a second reader landing on the same block simply
//! blocks on the same lock and finds the block already resident when it
//! wakes — no separate "fetch in progress" case to handle.

use std::io;

use tracing::trace;

use super::slot::SlotLock;
use crate::cache::pool::BlockPool;
use crate::error::{GhostError, Result};
use crate::file::File;
use crate::protocol::ProtocolHandler;

/// Read up to `size` bytes starting at `offset` from `file`. Returns fewer
/// bytes than requested only at end-of-file, matching POSIX `read(2)`/FUSE
/// `read` semantics (§4.3 edge cases). Returns the block index one past the
/// last block touched, so the caller can kick off a prefetch for it.
pub fn read(
    pool: &BlockPool,
    file: &File,
    offset: u64,
    size: u32,
    handler: &dyn ProtocolHandler,
    url: &str,
) -> Result<(Vec<u8>, usize)> {
    if let Some(content) = file.static_content() {
        return Ok((read_static(content, offset, size), 0));
    }

    let length = file.length();
    if offset >= length {
        return Ok((Vec::new(), 0));
    }
    let want = (size as u64).min(length - offset) as usize;
    let block_size = pool.block_size() as u64;
    let attrs = file.attributes_snapshot();

    let mut out = Vec::with_capacity(want);
    let mut remaining = want as u64;
    let mut pos = offset;
    let mut last_blk_id = (pos / block_size) as usize;

    while remaining > 0 {
        let blk_id = (pos / block_size) as usize;
        let blk_off = (pos % block_size) as usize;
        let this_len = remaining.min(block_size - blk_off as u64) as usize;
        last_blk_id = blk_id;

        let slot = file.slot(blk_id);
        let guard = slot.lock();

        let short = match guard.buffer_id() {
            Some(id) => {
                pool.record_hit();
                let buf = pool.pin(id);
                copy_and_unpin(pool, id, &buf, blk_off, this_len, this_len, &mut out)
            }
            None => {
                pool.record_miss();
                let id = pool.allocate(&slot, &guard)?;
                let buf = pool.buffer(id);
                let fetched = {
                    let mut data = buf.data();
                    handler.get_block(url, blk_id as u64, block_size as usize, &attrs, &mut data[..])
                };
                let fetched = match fetched {
                    Ok(n) => n,
                    Err(e) => {
                        guard.mark_empty();
                        pool.unpin(id);
                        return Err(e);
                    }
                };
                // §9 open question: a short fetch is only tolerated on the
                // file's last slot (end-of-file); anywhere else it's an I/O
                // error and the slot is released empty so the next read
                // retries the fetch (§7).
                let is_final_slot = blk_id + 1 == file.num_slots();
                let available = fetched.saturating_sub(blk_off);
                if available < this_len && !is_final_slot {
                    guard.mark_empty();
                    pool.unpin(id);
                    return Err(GhostError::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!(
                            "short read on block {}: got {} bytes, needed {}",
                            blk_id,
                            fetched,
                            blk_off + this_len
                        ),
                    )));
                }
                guard.mark_resident();
                copy_and_unpin(pool, id, &buf, blk_off, available.min(this_len), this_len, &mut out)
            }
        };

        if short {
            break;
        }
        pos += this_len as u64;
        remaining -= this_len as u64;
    }

    trace!(bytes = out.len(), offset, "read path complete");
    Ok((out, last_blk_id + 1))
}

/// Copies `copy_len` bytes starting at `blk_off` out of `buf` into `out`,
/// then unpins `id`. Returns whether fewer than `requested_len` bytes were
/// available (end of a partial final block), which ends the read loop just
/// like a short `pread` would.
fn copy_and_unpin(
    pool: &BlockPool,
    id: super::buffer::BufferId,
    buf: &super::buffer::Buffer,
    blk_off: usize,
    copy_len: usize,
    requested_len: usize,
    out: &mut Vec<u8>,
) -> bool {
    let data = buf.data();
    out.extend_from_slice(&data[blk_off..blk_off + copy_len]);
    drop(data);
    pool.unpin(id);
    copy_len < requested_len
}

fn read_static(content: &[u8], offset: u64, size: u32) -> Vec<u8> {
    let offset = offset as usize;
    if offset >= content.len() {
        return Vec::new();
    }
    let end = (offset + size as usize).min(content.len());
    content[offset..end].to_vec()
}
