// Copyright (C) 2024 GhostFS contributors
// Licensed under the GNU General Public License, version 2.0 (GPL-2.0-only).
// This program is free software: you can redistribute it and/or modify it
// under the terms of that license.
// This program is distributed in the hope that it will be useful, but
// WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU General Public License for more details.

//! HTTP(S) range-request handler.
//!
//! Grounded on `protocol/http_protocol.cc` in the original source, which
//! issues a `CURLOPT_RANGE` request per block and a `HEAD` (`CURLOPT_NOBODY`)
//! to learn content length. This is the same shape, built on
//! `reqwest::blocking` instead of hand-rolled libcurl calls, called from
//! `spawn_blocking` contexts so the blocking client never stalls the tokio
//! reactor (§4.4, §9 "Detached prefetch task").

use std::collections::HashMap;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{CONTENT_LENGTH, RANGE};
use tracing::{trace, warn};

use super::{protocol_err, ProtocolHandler};
use crate::error::Result;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpHandler {
    scheme: &'static str,
    client: Client,
}

impl HttpHandler {
    pub fn new(scheme: &'static str) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to build HTTP client");
        HttpHandler { scheme, client }
    }
}

impl ProtocolHandler for HttpHandler {
    fn name(&self) -> &'static str {
        self.scheme
    }

    // TODO: verify the server actually honors range requests (Accept-Ranges)
    // before relying on them for block fetches.
    fn is_url_valid(&self, _url: &str) -> bool {
        true
    }

    fn get_content_length_for_url(&self, url: &str) -> Result<u64> {
        let resp = self
            .client
            .head(url)
            .send()
            .map_err(|e| protocol_err(format!("HEAD {} failed: {}", url, e)))?;
        let len = resp
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or_else(|| protocol_err(format!("{} did not report Content-Length", url)))?;
        Ok(len)
    }

    fn get_block(
        &self,
        url: &str,
        block_id: u64,
        block_size: usize,
        _attrs: &HashMap<String, String>,
        out: &mut [u8],
    ) -> Result<usize> {
        let start = block_id * block_size as u64;
        let end = start + block_size as u64 - 1;
        let range = format!("bytes={}-{}", start, end);
        trace!(%url, %range, "range request");

        let resp = self
            .client
            .get(url)
            .header(RANGE, range)
            .send()
            .map_err(|e| protocol_err(format!("GET {} failed: {}", url, e)))?;
        let bytes = resp
            .bytes()
            .map_err(|e| protocol_err(format!("reading body of {} failed: {}", url, e)))?;

        let n = bytes.len().min(out.len());
        if bytes.len() > out.len() {
            warn!(url, block_id, "handler returned more bytes than block_size, truncating");
        }
        out[..n].copy_from_slice(&bytes[..n]);
        Ok(n)
    }
}
