// Copyright (C) 2024 GhostFS contributors
// Licensed under the GNU General Public License, version 2.0 (GPL-2.0-only).
// This program is free software: you can redistribute it and/or modify it
// under the terms of that license.
// This program is distributed in the hope that it will be useful, but
// WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU General Public License for more details.

//! GhostFS: remote byte-addressable resources presented as read-only files
//! under a FUSE mount, backed by a bounded block cache (see `cache`).

pub mod cache;
pub mod config;
pub mod error;
pub mod file;
pub mod fs;
pub mod protocol;

use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Initializes the `tracing`/`tracing-subscriber` stack against
/// `config.log_filter` (§10.2). Mirrors the teacher's `init_log`, but
/// targets `tracing` instead of `stderrlog`/`log`.
pub fn init_log(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
