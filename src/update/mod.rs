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


//! Self-update: the third download queue
//!
//! # Flow
//! 1. A release manifest (JSON) names the version, URL, size and checksum
//! 2. The binary is fetched by the external helper ([`monitor`]) or, with
//!    `use_helper = false`, by the built-in streaming downloader
//! 3. It must clear `min_binary_bytes` and match `sha256` when given
//! 4. [`install`] swaps it in, keeping the old binary as `.old`

pub mod install;
pub mod monitor;

pub use install::install_binary;
pub use monitor::monitor_helper_download;

use crate::config::{EngineConfig, HttpOptions, UpdateConfig};
use crate::download::cancel::CancelFlag;
use crate::download::progress::TransferProgress;
use crate::download::queue::{QueueItem, QueuePolicy};
use crate::download::stream::download_to_file;
use crate::download::validate::check_min_size;
use crate::error::{EngineError, Result};
use crate::http;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

/// Largest manifest we are willing to read
const MANIFEST_MAX_BYTES: usize = 64 * 1024;

/// One published release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    pub version: String,

    /// Download URL of the binary
    pub url: String,

    /// Size in bytes, if the manifest states it
    #[serde(default)]
    pub size: Option<u64>,

    /// Lower- or upper-case hex digest
    #[serde(default)]
    pub sha256: Option<String>,
}

impl ReleaseInfo {
    /// Fetch and decode a release manifest
    pub fn fetch(manifest_url: &str, opts: &HttpOptions) -> Result<Self> {
        let release: ReleaseInfo = http::fetch(manifest_url, MANIFEST_MAX_BYTES, opts)?.json()?;
        if release.version.trim().is_empty() || release.version.contains('|') {
            return Err(EngineError::protocol("release manifest has no usable version"));
        }
        tracing::info!(version = %release.version, url = %release.url, "release manifest fetched");
        Ok(release)
    }
}

/// Queue policy for the application binary
#[derive(Debug, Clone)]
pub struct UpdatePolicy {
    release: ReleaseInfo,
    update: UpdateConfig,
    http: HttpOptions,
}

impl UpdatePolicy {
    pub fn new(config: &EngineConfig, release: ReleaseInfo) -> Self {
        Self {
            release,
            update: config.update.clone(),
            http: config.http.clone(),
        }
    }

    pub fn release(&self) -> &ReleaseInfo {
        &self.release
    }

    /// Expected size: manifest first, then a metadata request
    fn expected_size(&self, url: &str) -> Option<u64> {
        if let Some(size) = self.release.size {
            return Some(size);
        }
        match http::probe(url, &self.http) {
            Ok(info) => info.content_length,
            Err(e) => {
                tracing::warn!(url, error = %e, "size probe failed, progress will be byte counts only");
                None
            }
        }
    }
}

impl QueuePolicy for UpdatePolicy {
    fn name(&self) -> &str {
        "update"
    }

    fn temp_dir(&self) -> PathBuf {
        match self.update.target_binary.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    fn destination(&self, _id: &str, _title: &str, _source_url: &str) -> PathBuf {
        self.update.target_binary.clone()
    }

    fn source_url(&self, id: &str) -> Option<String> {
        (id == self.release.version).then(|| self.release.url.clone())
    }

    fn transfer(
        &self,
        item: &QueueItem,
        temp: &Path,
        cancel: &CancelFlag,
        progress: &mut dyn FnMut(&TransferProgress),
    ) -> Result<u64> {
        if item.source_url.is_empty() {
            return Err(EngineError::InvalidUrl(format!("no release URL for {}", item.id)));
        }

        if self.update.use_helper {
            let expected = self.expected_size(&item.source_url);
            monitor_helper_download(&item.source_url, temp, expected, &self.update, cancel, progress)
        } else {
            download_to_file(&item.source_url, temp, |p| progress(p), cancel, &self.http)
        }
    }

    fn validate(&self, _item: &QueueItem, temp: &Path) -> Result<()> {
        let size = check_min_size(temp, self.update.min_binary_bytes)?;
        if let Some(expected) = self.release.size {
            if size != expected {
                return Err(EngineError::validation(format!(
                    "binary is {} bytes, manifest says {}",
                    size, expected
                )));
            }
        }

        if let Some(expected) = &self.release.sha256 {
            let actual = sha256_file(temp)?;
            if !actual.eq_ignore_ascii_case(expected.trim()) {
                tracing::warn!(expected = %expected, actual = %actual, "checksum mismatch");
                return Err(EngineError::validation("checksum mismatch"));
            }
        }
        Ok(())
    }

    fn commit(&self, item: &QueueItem, temp: &Path) -> Result<PathBuf> {
        install_binary(temp, &item.destination_path)
    }
}

/// Hex SHA-256 of a file
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}
