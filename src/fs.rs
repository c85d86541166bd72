// Copyright (C) 2024 GhostFS contributors
// Licensed under the GNU General Public License, version 2.0 (GPL-2.0-only).
// This program is free software: you can redistribute it and/or modify it
// under the terms of that license.
// This program is distributed in the hope that it will be useful, but
// WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU General Public License for more details.

//! The filesystem adapter (§6.1): a `fuser::Filesystem` over a flat
//! `Namespace`, translating FUSE callbacks into Read Path / attribute
//! operations on the cache.
//!
//! Grounded on `ghost_fs.h`/`ghostfs.cc` (the `fuse_operations` table) in
//! the original source, reimplemented against the `fuser` crate's
//! `Filesystem` trait rather than raw libfuse callbacks.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyXattr, Request,
};
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::cache::pool::BlockPool;
use crate::cache::{prefetch, read_path};
use crate::error::GhostError;
use crate::file::{File, URL_ATTR};
use crate::protocol::HandlerRegistry;

const ROOT_INO: u64 = 1;
const TTL: Duration = Duration::from_secs(1);
const FILE_MODE: u16 = 0o444;
const DIR_MODE: u16 = 0o555;

struct Entry {
    name: String,
    file: Arc<File>,
}

/// `path -> File` map for the flat root directory (§9 "Namespace"), guarded
/// by one `RwLock` — read-mostly, off the hot read path.
struct Namespace {
    entries: RwLock<HashMap<u64, Entry>>,
    by_name: RwLock<HashMap<String, u64>>,
    next_ino: AtomicU64,
}

impl Namespace {
    fn new() -> Self {
        Namespace {
            entries: RwLock::new(HashMap::new()),
            by_name: RwLock::new(HashMap::new()),
            next_ino: AtomicU64::new(2),
        }
    }

    fn insert(&self, name: &str, file: File) -> u64 {
        let ino = self.next_ino.fetch_add(1, Ordering::Relaxed);
        self.entries.write().insert(
            ino,
            Entry {
                name: name.to_string(),
                file: Arc::new(file),
            },
        );
        self.by_name.write().insert(name.to_string(), ino);
        ino
    }

    fn ino_of(&self, name: &str) -> Option<u64> {
        self.by_name.read().get(name).copied()
    }

    fn file(&self, ino: u64) -> Option<Arc<File>> {
        self.entries.read().get(&ino).map(|e| e.file.clone())
    }

    fn list(&self) -> Vec<(u64, String)> {
        self.entries
            .read()
            .iter()
            .map(|(ino, e)| (*ino, e.name.clone()))
            .collect()
    }
}

/// `fuser::Filesystem` adapter wrapping the cache (§4) and the protocol
/// handler registry (§6.2).
pub struct GhostFs {
    pool: Arc<BlockPool>,
    registry: Arc<HandlerRegistry>,
    ns: Namespace,
    rt: tokio::runtime::Handle,
}

impl GhostFs {
    pub fn new(
        pool: Arc<BlockPool>,
        registry: Arc<HandlerRegistry>,
        rt: tokio::runtime::Handle,
    ) -> Self {
        let fs = GhostFs {
            pool,
            registry,
            ns: Namespace::new(),
            rt,
        };
        fs.seed_static_files();
        fs
    }

    /// The two built-in files served straight from memory, bypassing the
    /// cache entirely (§6.1, scenario 1 in §8). Carried over verbatim from
    /// the original's `add_static_files()`.
    fn seed_static_files(&self) {
        self.ns
            .insert("HELLO", File::new_static(b"Hello World!\n"));
        self.ns.insert(
            "CREDITS",
            File::new_static(b"Raphael S. Carvalho <raphael.scarv@gmail.com>\n"),
        );
    }

    fn dir_attr(&self) -> FileAttr {
        let now = SystemTime::now();
        FileAttr {
            ino: ROOT_INO,
            size: 0,
            blocks: 0,
            atime: now,
            mtime: now,
            ctime: now,
            crtime: now,
            kind: FileType::Directory,
            perm: DIR_MODE,
            nlink: 2,
            uid: 0,
            gid: 0,
            rdev: 0,
            blksize: self.pool.block_size() as u32,
            flags: 0,
        }
    }

    fn file_attr(&self, ino: u64, file: &File) -> FileAttr {
        let now = SystemTime::now();
        let length = file.length();
        let block_size = self.pool.block_size() as u64;
        FileAttr {
            ino,
            size: length,
            blocks: (length + 511) / 512,
            atime: now,
            mtime: now,
            ctime: now,
            crtime: now,
            kind: FileType::RegularFile,
            perm: FILE_MODE,
            nlink: 1,
            uid: 0,
            gid: 0,
            rdev: 0,
            blksize: block_size as u32,
            flags: 0,
        }
    }

    /// Drives the Read Path (§4.3) for `file`, then fires the Prefetcher
    /// (§4.4) on the successor slot. Static files never reach the cache.
    fn do_read(&self, file: &Arc<File>, offset: u64, size: u32) -> Result<Vec<u8>, GhostError> {
        if file.is_static() {
            let (bytes, _) = read_path::read(&self.pool, file, offset, size, &NoopHandler, "")?;
            return Ok(bytes);
        }
        let url = match file.url() {
            Some(u) => u,
            None => return Ok(Vec::new()),
        };
        let handler = self
            .registry
            .get_handler(&url)
            .ok_or_else(|| GhostError::Protocol(format!("no handler for url {}", url)))?;
        let (bytes, next_blk) = read_path::read(&self.pool, file, offset, size, handler, &url)?;
        prefetch::try_prefetch(
            &self.rt,
            self.pool.clone(),
            self.registry.handler_arc(&url).expect("handler resolved above"),
            file.clone(),
            next_blk,
            url,
        );
        Ok(bytes)
    }
}

/// Placeholder passed to [`read_path::read`] for static files: its
/// `file.static_content()` branch returns before ever calling into the
/// handler, so `get_block` here is unreachable in practice. Exists so the
/// read path's signature doesn't need an `Option<&dyn ProtocolHandler>`
/// just for the static-file case.
struct NoopHandler;

impl crate::protocol::ProtocolHandler for NoopHandler {
    fn name(&self) -> &'static str {
        "noop"
    }
    fn is_url_valid(&self, _url: &str) -> bool {
        false
    }
    fn get_content_length_for_url(&self, _url: &str) -> crate::error::Result<u64> {
        Ok(0)
    }
    fn get_block(
        &self,
        _url: &str,
        _block_id: u64,
        _block_size: usize,
        _attrs: &HashMap<String, String>,
        _out: &mut [u8],
    ) -> crate::error::Result<usize> {
        unreachable!("static files never fetch blocks")
    }
}

impl Filesystem for GhostFs {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        if parent != ROOT_INO {
            reply.error(libc::ENOENT);
            return;
        }
        let name = match name.to_str() {
            Some(n) => n,
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };
        match self.ns.ino_of(name) {
            Some(ino) => {
                let file = self.ns.file(ino).expect("ino in by_name implies entry exists");
                reply.entry(&TTL, &self.file_attr(ino, &file), 0);
            }
            None => reply.error(libc::ENOENT),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        if ino == ROOT_INO {
            reply.attr(&TTL, &self.dir_attr());
            return;
        }
        match self.ns.file(ino) {
            Some(file) => reply.attr(&TTL, &self.file_attr(ino, &file)),
            None => reply.error(libc::ENOENT),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        if ino != ROOT_INO && self.ns.file(ino).is_none() {
            reply.error(libc::ENOENT);
            return;
        }
        if flags & (libc::O_WRONLY | libc::O_RDWR) != 0 {
            reply.error(libc::EACCES);
            return;
        }
        reply.opened(0, 0);
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        if parent != ROOT_INO {
            reply.error(libc::ENOENT);
            return;
        }
        let name = match name.to_str() {
            Some(n) => n,
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };
        if let Some(ino) = self.ns.ino_of(name) {
            if flags & libc::O_EXCL != 0 {
                reply.error(libc::EEXIST);
                return;
            }
            let file = self.ns.file(ino).expect("ino in by_name implies entry exists");
            reply.created(&TTL, &self.file_attr(ino, &file), 0, 0, 0);
            return;
        }
        let ino = self.ns.insert(name, File::new_empty());
        let file = self.ns.file(ino).expect("just inserted");
        info!(name, ino, "created virtual file");
        reply.created(&TTL, &self.file_attr(ino, &file), 0, 0, 0);
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        if ino != ROOT_INO {
            reply.error(libc::ENOTDIR);
            return;
        }
        let mut rows = vec![
            (ROOT_INO, FileType::Directory, ".".to_string()),
            (ROOT_INO, FileType::Directory, "..".to_string()),
        ];
        let mut files = self.ns.list();
        files.sort_by(|a, b| a.0.cmp(&b.0));
        for (ino, name) in files {
            rows.push((ino, FileType::RegularFile, name));
        }
        for (i, (ino, kind, name)) in rows.into_iter().enumerate().skip(offset as usize) {
            if reply.add(ino, (i + 1) as i64, kind, &name) {
                break;
            }
        }
        reply.ok();
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let file = match self.ns.file(ino) {
            Some(f) => f,
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };
        if offset < 0 {
            reply.error(libc::EINVAL);
            return;
        }
        match self.do_read(&file, offset as u64, size) {
            Ok(bytes) => reply.data(&bytes),
            Err(e) => {
                warn!(ino, error = %e, "read failed");
                reply.error(e.errno());
            }
        }
    }

    fn setxattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        name: &OsStr,
        value: &[u8],
        _flags: i32,
        _position: u32,
        reply: ReplyEmpty,
    ) {
        let file = match self.ns.file(ino) {
            Some(f) => f,
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };
        let name = match name.to_str() {
            Some(n) => n,
            None => {
                reply.error(libc::EINVAL);
                return;
            }
        };
        let value = match std::str::from_utf8(value) {
            Ok(v) => v,
            Err(_) => {
                reply.error(libc::EINVAL);
                return;
            }
        };
        file.set_attribute(name, value);
        if name != URL_ATTR {
            reply.ok();
            return;
        }
        let url = value.to_string();
        let handler = match self.registry.get_handler(&url) {
            Some(h) => h,
            None => {
                reply.error(GhostError::Protocol(format!("no handler for url {}", url)).errno());
                return;
            }
        };
        let length = match handler.get_content_length_for_url(&url) {
            Ok(len) => len,
            Err(e) => {
                warn!(ino, %url, error = %e, "failed to resolve content length");
                reply.error(e.errno());
                return;
            }
        };
        file.update_length(length, self.pool.block_size());
        info!(ino, %url, length, "url attribute set");
        reply.ok();
        prefetch::try_prefetch(
            &self.rt,
            self.pool.clone(),
            self.registry.handler_arc(&url).expect("handler resolved above"),
            file,
            0,
            url,
        );
    }

    fn getxattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        name: &OsStr,
        size: u32,
        reply: ReplyXattr,
    ) {
        let file = match self.ns.file(ino) {
            Some(f) => f,
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };
        let name = match name.to_str() {
            Some(n) => n,
            None => {
                reply.error(libc::EINVAL);
                return;
            }
        };
        let value = match file.attribute(name) {
            Some(v) => v,
            None => {
                reply.error(libc::ENODATA);
                return;
            }
        };
        if size == 0 {
            reply.size(value.len() as u32);
        } else if value.len() > size as usize {
            reply.error(libc::ERANGE);
        } else {
            reply.data(value.as_bytes());
        }
    }

    fn listxattr(&mut self, _req: &Request<'_>, ino: u64, size: u32, reply: ReplyXattr) {
        let file = match self.ns.file(ino) {
            Some(f) => f,
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };
        let mut buf = Vec::new();
        for name in file.attribute_names() {
            buf.extend_from_slice(name.as_bytes());
            buf.push(0);
        }
        if size == 0 {
            reply.size(buf.len() as u32);
        } else if buf.len() > size as usize {
            reply.error(libc::ERANGE);
        } else {
            reply.data(&buf);
        }
    }

    fn removexattr(&mut self, _req: &Request<'_>, ino: u64, name: &OsStr, reply: ReplyEmpty) {
        let file = match self.ns.file(ino) {
            Some(f) => f,
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };
        let name = match name.to_str() {
            Some(n) => n,
            None => {
                reply.error(libc::EINVAL);
                return;
            }
        };
        if file.remove_attribute(name) {
            reply.ok();
        } else {
            reply.error(libc::ENODATA);
        }
    }
}
