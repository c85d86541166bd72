// Copyright (C) 2024 GhostFS contributors
// Licensed under the GNU General Public License, version 2.0 (GPL-2.0-only).
// This program is free software: you can redistribute it and/or modify it
// under the terms of that license.
// This program is distributed in the hope that it will be useful, but
// WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU General Public License for more details.

//! Error kinds surfaced by the cache and its collaborators, and the single
//! place where they are translated to POSIX errno values at the FUSE
//! boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GhostError {
    #[error("not found")]
    NotFound,

    #[error("permission denied")]
    PermissionDenied,

    #[error("already exists")]
    AlreadyExists,

    #[error("attribute value too large for buffer")]
    OutOfRange,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol handler error: {0}")]
    Protocol(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl GhostError {
    /// POSIX errno this error is reported as at the `fuser` boundary.
    pub fn errno(&self) -> i32 {
        match self {
            GhostError::NotFound => libc::ENOENT,
            GhostError::PermissionDenied => libc::EACCES,
            GhostError::AlreadyExists => libc::EEXIST,
            GhostError::OutOfRange => libc::ERANGE,
            GhostError::Io(_) => libc::EIO,
            GhostError::Protocol(_) => libc::EIO,
            // Not a legitimate runtime outcome, but fuser has no "panic" reply.
            GhostError::InvariantViolation(_) => libc::EIO,
        }
    }
}

pub type Result<T> = std::result::Result<T, GhostError>;
