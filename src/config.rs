// Copyright (C) 2024 GhostFS contributors
// Licensed under the GNU General Public License, version 2.0 (GPL-2.0-only).
// This program is free software: you can redistribute it and/or modify it
// under the terms of that license.
// This program is distributed in the hope that it will be useful, but
// WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU General Public License for more details.

//! Runtime configuration (§10.1): CLI flags via `clap`'s derive API, with
//! `GHOSTFS_*` environment-variable fallback, in place of the original's
//! `CACHE_SIZE`/`BLOCK_SIZE` compile-time constants.

use std::path::PathBuf;

use anyhow::{ensure, Result};
use clap::Parser;

const DEFAULT_CACHE_SIZE: usize = 1024;
const DEFAULT_BLOCK_SIZE: usize = 1 << 20;

#[derive(Parser, Debug)]
#[command(name = "ghostfs", about = "Mount remote byte-addressable resources as read-only files")]
pub struct Config {
    /// Where to mount the filesystem.
    pub mountpoint: PathBuf,

    /// Number of blocks held by the cache.
    #[arg(long, env = "GHOSTFS_CACHE_SIZE", default_value_t = DEFAULT_CACHE_SIZE)]
    pub cache_size: usize,

    /// Bytes per cached block. Must be a power of two.
    #[arg(long, env = "GHOSTFS_BLOCK_SIZE", default_value_t = DEFAULT_BLOCK_SIZE)]
    pub block_size: usize,

    /// Stay attached to the controlling terminal instead of the FUSE
    /// session running detached.
    #[arg(short, long, env = "GHOSTFS_FOREGROUND")]
    pub foreground: bool,

    /// Pass `allow_other` to the FUSE mount so other users can access it.
    #[arg(long, env = "GHOSTFS_ALLOW_OTHER")]
    pub allow_other: bool,

    /// `tracing_subscriber::EnvFilter` directive, also read from `RUST_LOG`.
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_filter: String,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.block_size.is_power_of_two(),
            "block_size must be a power of two, got {}",
            self.block_size
        );
        ensure!(self.cache_size > 0, "cache_size must be at least 1");
        Ok(())
    }
}
