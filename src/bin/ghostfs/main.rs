// Copyright (C) 2024 GhostFS contributors
// Licensed under the GNU General Public License, version 2.0 (GPL-2.0-only).
// This program is free software: you can redistribute it and/or modify it
// under the terms of that license.
// This program is distributed in the hope that it will be useful, but
// WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU General Public License for more details.

//! CLI entry point (§10): parse flags, init logging, build the handler
//! registry and the cache, mount via `fuser`.
//!
//! Grounded on `ghost_main` in the original source and on the teacher's
//! binaries' overall shape (parse args, init log, run).

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use fuser::MountOption;
use tracing::info;

use ghostfs::cache::BlockPool;
use ghostfs::config::Config;
use ghostfs::fs::GhostFs;
use ghostfs::protocol::HandlerRegistry;

fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    config.validate()?;
    ghostfs::init_log(&config);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the tokio runtime")?;

    let pool = Arc::new(BlockPool::new(config.cache_size, config.block_size));
    let registry = Arc::new(HandlerRegistry::with_builtin_handlers());
    let fs = GhostFs::new(pool, registry, runtime.handle().clone());

    let mut options = vec![
        MountOption::RO,
        MountOption::FSName("ghostfs".to_string()),
        MountOption::AutoUnmount,
    ];
    if config.allow_other {
        options.push(MountOption::AllowOther);
    }

    // `fuser` has no libfuse-style daemonize step (unlike the original,
    // which forked unless run with its own `-f`); `foreground` is kept as
    // a config knob for parity and only changes what we log.
    info!(
        mountpoint = %config.mountpoint.display(),
        cache_size = config.cache_size,
        block_size = config.block_size,
        foreground = config.foreground,
        "mounting ghostfs"
    );
    fuser::mount2(fs, &config.mountpoint, &options)
        .with_context(|| format!("failed to mount at {}", config.mountpoint.display()))?;
    info!("unmounted");
    Ok(())
}
