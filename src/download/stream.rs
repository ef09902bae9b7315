// MediaFetch - background network fetch and download engine
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Streaming a response body straight to disk
//!
//! # Behaviour
//! - Redirects are resolved from headers before any byte is written
//! - The body is copied in `chunk_size` reads through a buffered writer
//! - The progress callback runs after every chunk
//! - The cancel flag is checked before every chunk
//! - On cancel or any error the partial file is removed
//!
//! Callers that care about the final name (the queue workers) pass a temp
//! path here and rename after validation.

use crate::config::HttpOptions;
use crate::download::cancel::CancelFlag;
use crate::download::progress::{ProgressTracker, TransferProgress};
use crate::error::{EngineError, Result};
use crate::http::fetch::{open, OpenResponse};
use crate::http::response::body_error;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

/// Buffered writes are flushed at this size
const WRITE_BUFFER_SZ: usize = 256 * 1024;

/// Download `url` into `dest`, returning the number of bytes written.
///
/// `on_progress` sees a [`TransferProgress`] after each chunk; its
/// `percent()` is available when the server sent a `Content-Length`.
pub fn download_to_file<F>(
    url: &str,
    dest: &Path,
    mut on_progress: F,
    cancel: &CancelFlag,
    opts: &HttpOptions,
) -> Result<u64>
where
    F: FnMut(&TransferProgress),
{
    if cancel.is_cancelled() {
        return Err(EngineError::Cancelled);
    }

    let response = open(url, opts)?.require_success()?;

    if cancel.is_cancelled() {
        return Err(EngineError::Cancelled);
    }

    if let Some(parent) = dest.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let file = File::create(dest)?;

    tracing::debug!(
        url = %response.url,
        dest = %dest.display(),
        length = ?response.head.content_length(),
        "streaming body to file"
    );

    match stream_body(response, file, &mut on_progress, cancel, opts) {
        Ok(written) => Ok(written),
        Err(err) => {
            remove_partial(dest);
            if err.is_cancelled() {
                tracing::info!(dest = %dest.display(), "download cancelled, partial file removed");
            } else {
                tracing::warn!(dest = %dest.display(), error = %err, "download failed, partial file removed");
            }
            Err(err)
        }
    }
}

fn stream_body<F>(
    response: OpenResponse,
    file: File,
    on_progress: &mut F,
    cancel: &CancelFlag,
    opts: &HttpOptions,
) -> Result<u64>
where
    F: FnMut(&TransferProgress),
{
    let OpenResponse { url, head, mut body } = response;
    let expected = head.content_length();

    let mut writer = BufWriter::with_capacity(WRITE_BUFFER_SZ, file);
    let mut tracker = ProgressTracker::new(expected);
    let mut buf = vec![0u8; opts.chunk_size.max(1)];
    let mut written: u64 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let n = match body.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(body_error(e, opts.io_timeout_secs)),
        };

        writer.write_all(&buf[..n])?;
        written += n as u64;
        on_progress(&tracker.update(written));
    }

    if let Some(expected) = expected {
        if !body.is_complete() {
            return Err(EngineError::protocol(format!(
                "body from {} ended after {} of {} bytes",
                url, written, expected
            )));
        }
    }

    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;

    tracing::debug!(url = %url, bytes = written, "body written");
    Ok(written)
}

fn remove_partial(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "could not remove partial file");
        }
    }
}
