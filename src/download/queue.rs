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


//! Download queue with one background worker
//!
//! # Queue Management
//! - Ordered, duplicate-free list of items keyed by id
//! - One worker thread per queue, draining pending items FIFO
//! - Status record polled by the UI every frame
//! - Queue file rewritten after every structural change
//!
//! # Item Lifecycle
//! ```text
//! Pending -> InProgress -> Complete (removed from the queue)
//!                       -> Failed   (kept; reset to Pending by the next start)
//!                       -> cancel   (removed, not counted as a failure)
//! ```
//!
//! The mutex guards the item list and the status record. It is never held
//! across a network call: the worker copies the item out, releases the lock,
//! transfers, then re-locks to settle the outcome.
//!
//! What a queue actually downloads is decided by its [`QueuePolicy`]; the
//! podcast, audio-track and self-update queues differ only there.

use crate::config::EngineConfig;
use crate::download::cancel::CancelFlag;
use crate::download::media::MediaPolicy;
use crate::download::persist::{self, check_id, clean_title};
use crate::download::progress::TransferProgress;
use crate::error::{EngineError, Result};
use crate::file::paths::temp_path;
use crate::sync::lock_recover;
use crate::update::{ReleaseInfo, UpdatePolicy};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// State of a single queue item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ItemStatus {
    Pending,
    InProgress,
    /// Only observable transiently; completed items leave the queue
    Complete,
    Failed,
}

/// One unit of download work
#[derive(Debug, Clone, Serialize)]
pub struct QueueItem {
    /// Stable key (video id, episode URL, release tag)
    pub id: String,

    pub title: String,

    pub source_url: String,

    /// Where the finished file is meant to land
    pub destination_path: PathBuf,

    pub status: ItemStatus,

    /// 0..=100
    pub progress_percent: u8,

    pub added_at: DateTime<Utc>,

    /// Reason for the last failure of this item
    pub error: Option<String>,
}

/// Aggregate progress for one queue, polled by the UI.
///
/// Best-effort telemetry: it can trail the item list by one step.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueStatus {
    /// 1-based position of the item being worked on in this run
    pub current_index: usize,

    /// Items in this run (including ones added while running)
    pub total_items: usize,

    pub completed_count: usize,

    pub failed_count: usize,

    pub current_title: Option<String>,

    /// Last human-readable error of this queue
    pub last_error: Option<String>,

    pub progress_percent: u8,

    pub bytes_written: u64,

    pub total_bytes: Option<u64>,

    pub bytes_per_sec: f64,

    pub running: bool,
}

/// Result of [`DownloadQueue::add`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    AlreadyQueued,
}

/// What differs between queue instances
pub trait QueuePolicy: Send + Sync {
    /// Short name used in logs, temp names and the queue file
    fn name(&self) -> &str;

    /// Directory that holds in-flight temp files (same filesystem as the
    /// destination so the final rename is atomic)
    fn temp_dir(&self) -> PathBuf;

    /// Final path for a new item
    fn destination(&self, id: &str, title: &str, source_url: &str) -> PathBuf;

    /// Source URL for an id restored from the queue file
    fn source_url(&self, id: &str) -> Option<String>;

    /// Move the bytes into `temp`, reporting progress
    fn transfer(
        &self,
        item: &QueueItem,
        temp: &Path,
        cancel: &CancelFlag,
        progress: &mut dyn FnMut(&TransferProgress),
    ) -> Result<u64>;

    /// Reject a bad artifact before it is committed
    fn validate(&self, item: &QueueItem, temp: &Path) -> Result<()>;

    /// Move a validated temp file into place, returning the final path
    fn commit(&self, item: &QueueItem, temp: &Path) -> Result<PathBuf>;
}

struct ActiveItem {
    id: String,
    cancel: CancelFlag,
}

struct QueueState {
    items: Vec<QueueItem>,
    status: QueueStatus,
    worker: Option<JoinHandle<()>>,
    active: Option<ActiveItem>,
    stop: CancelFlag,
}

struct Shared {
    policy: Box<dyn QueuePolicy>,
    queue_file: Option<PathBuf>,
    state: Mutex<QueueState>,
}

/// A download queue and its worker. Cheap to clone; clones share the queue.
#[derive(Clone)]
pub struct DownloadQueue {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for DownloadQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadQueue")
            .field("name", &self.name())
            .field("queue_file", &self.shared.queue_file)
            .finish()
    }
}

impl DownloadQueue {
    /// Queue driven by `policy`, persisted to `queue_file` when given
    pub fn new<P>(policy: P, queue_file: Option<PathBuf>) -> Self
    where
        P: QueuePolicy + 'static,
    {
        Self {
            shared: Arc::new(Shared {
                policy: Box::new(policy),
                queue_file,
                state: Mutex::new(QueueState {
                    items: Vec::new(),
                    status: QueueStatus::default(),
                    worker: None,
                    active: None,
                    stop: CancelFlag::new(),
                }),
            }),
        }
    }

    /// Podcast episode queue; ids are usually the episode enclosure URL
    pub fn podcast(config: &EngineConfig) -> Self {
        let policy = MediaPolicy::podcast(config);
        let file = config.queue_file(policy.name());
        Self::new(policy, Some(file))
    }

    /// Audio-track queue; sources come from `audio_source_template`
    pub fn audio(config: &EngineConfig) -> Self {
        let policy = MediaPolicy::audio(config);
        let file = config.queue_file(policy.name());
        Self::new(policy, Some(file))
    }

    /// Self-update queue for one release
    pub fn self_update(config: &EngineConfig, release: ReleaseInfo) -> Self {
        let policy = UpdatePolicy::new(config, release);
        let file = config.queue_file(policy.name());
        Self::new(policy, Some(file))
    }

    pub fn name(&self) -> &str {
        self.shared.policy.name()
    }

    /// Enqueue an item. An id already in the queue is left untouched.
    pub fn add(&self, id: &str, title: &str, source_url: &str) -> Result<AddOutcome> {
        check_id(id)?;
        let id = id.trim();
        let title = clean_title(title);

        let mut state = lock_recover(&self.shared.state);
        if state.items.iter().any(|item| item.id == id) {
            tracing::debug!(queue = self.name(), id, "already queued");
            return Ok(AddOutcome::AlreadyQueued);
        }

        let destination_path = self.shared.policy.destination(id, &title, source_url);
        state.items.push(QueueItem {
            id: id.to_string(),
            title,
            source_url: source_url.trim().to_string(),
            destination_path,
            status: ItemStatus::Pending,
            progress_percent: 0,
            added_at: Utc::now(),
            error: None,
        });
        if state.status.running {
            state.status.total_items += 1;
        }
        tracing::info!(queue = self.name(), id, "item queued");

        self.shared.persist_locked(&state);
        Ok(AddOutcome::Added)
    }

    /// Remove an item; an in-progress item is cancelled first.
    ///
    /// Returns false if no item had that id.
    pub fn remove(&self, id: &str) -> bool {
        let mut state = lock_recover(&self.shared.state);
        let Some(index) = state.items.iter().position(|item| item.id == id) else {
            return false;
        };

        if state.items[index].status == ItemStatus::InProgress {
            if let Some(active) = state.active.as_ref().filter(|a| a.id == id) {
                active.cancel.cancel();
            }
        }
        state.items.remove(index);
        tracing::info!(queue = self.name(), id, "item removed");

        self.shared.persist_locked(&state);
        true
    }

    /// Start the worker. Failed items are reset to pending first.
    ///
    /// Returns `Ok(false)` when a worker is already running or there is
    /// nothing to do.
    pub fn start(&self) -> Result<bool> {
        let mut state = lock_recover(&self.shared.state);
        if state.status.running {
            tracing::debug!(queue = self.name(), "worker already running");
            return Ok(false);
        }

        // A finished worker's handle; dropping it detaches the exited thread
        state.worker = None;

        for item in state.items.iter_mut().filter(|i| i.status == ItemStatus::Failed) {
            item.status = ItemStatus::Pending;
            item.progress_percent = 0;
        }

        let pending = state
            .items
            .iter()
            .filter(|i| i.status == ItemStatus::Pending)
            .count();
        if pending == 0 {
            return Ok(false);
        }

        state.stop.reset();
        state.status = QueueStatus {
            total_items: pending,
            last_error: state.status.last_error.take(),
            running: true,
            ..QueueStatus::default()
        };

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(format!("{}-queue", self.name()))
            .spawn(move || run_worker(shared));

        match spawned {
            Ok(handle) => {
                state.worker = Some(handle);
                tracing::info!(queue = self.name(), pending, "worker started");
                Ok(true)
            }
            Err(e) => {
                state.status.running = false;
                Err(EngineError::Io(e))
            }
        }
    }

    /// Stop the worker after its current chunk and drop the in-progress item.
    ///
    /// Pending items stay queued for the next start.
    pub fn cancel(&self) {
        let mut state = lock_recover(&self.shared.state);
        state.stop.cancel();

        let Some(active) = state.active.take() else {
            return;
        };
        active.cancel.cancel();
        let before = state.items.len();
        state
            .items
            .retain(|i| !(i.id == active.id && i.status == ItemStatus::InProgress));
        if state.items.len() != before {
            tracing::info!(queue = self.name(), id = %active.id, "in-progress item cancelled");
            self.shared.persist_locked(&state);
        }
    }

    /// Snapshot of the status record
    pub fn status(&self) -> QueueStatus {
        lock_recover(&self.shared.state).status.clone()
    }

    /// Snapshot of the items, in queue order
    pub fn items(&self) -> Vec<QueueItem> {
        lock_recover(&self.shared.state).items.clone()
    }

    pub fn contains(&self, id: &str) -> bool {
        lock_recover(&self.shared.state)
            .items
            .iter()
            .any(|item| item.id == id)
    }

    pub fn len(&self) -> usize {
        lock_recover(&self.shared.state).items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_running(&self) -> bool {
        lock_recover(&self.shared.state).status.running
    }

    /// Restore items from the queue file, appending ids not already queued.
    ///
    /// Everything comes back as pending. Returns the number restored.
    pub fn load(&self) -> Result<usize> {
        let Some(path) = self.shared.queue_file.as_deref() else {
            return Ok(0);
        };
        let entries = persist::load_entries(path)?;

        let mut state = lock_recover(&self.shared.state);
        let mut restored = 0;
        for entry in entries {
            if check_id(&entry.id).is_err() || state.items.iter().any(|i| i.id == entry.id) {
                continue;
            }
            let source_url = self.shared.policy.source_url(&entry.id).unwrap_or_else(|| {
                tracing::warn!(queue = self.name(), id = %entry.id, "no source URL for restored item");
                String::new()
            });
            let destination_path = self
                .shared
                .policy
                .destination(&entry.id, &entry.title, &source_url);
            state.items.push(QueueItem {
                id: entry.id,
                title: entry.title,
                source_url,
                destination_path,
                status: ItemStatus::Pending,
                progress_percent: 0,
                added_at: Utc::now(),
                error: None,
            });
            restored += 1;
        }

        tracing::info!(queue = self.name(), restored, "queue loaded");
        Ok(restored)
    }

    /// Write the queue file now
    pub fn persist(&self) -> Result<()> {
        let state = lock_recover(&self.shared.state);
        self.shared.write_queue_file(&state)
    }

    /// Wait for the current worker (if any) to exit
    pub fn join(&self) {
        let handle = lock_recover(&self.shared.state).worker.take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!(queue = self.name(), "worker thread panicked");
            }
        }
    }
}

impl Shared {
    fn name(&self) -> &str {
        self.policy.name()
    }

    fn write_queue_file(&self, state: &QueueState) -> Result<()> {
        let Some(path) = self.queue_file.as_deref() else {
            return Ok(());
        };
        persist::save_entries(
            path,
            state.items.iter().map(|i| (i.id.as_str(), i.title.as_str())),
        )
    }

    fn persist_locked(&self, state: &QueueState) {
        if let Err(e) = self.write_queue_file(state) {
            tracing::warn!(queue = self.name(), error = %e, "failed to persist queue");
        }
    }

    /// Claim the first pending item, or None when drained or stopped
    fn claim_next(&self) -> Option<(QueueItem, CancelFlag)> {
        let mut state = lock_recover(&self.state);
        if state.stop.is_cancelled() {
            return None;
        }

        let index = state
            .items
            .iter()
            .position(|i| i.status == ItemStatus::Pending)?;
        let cancel = CancelFlag::new();

        let item = &mut state.items[index];
        item.status = ItemStatus::InProgress;
        item.progress_percent = 0;
        item.error = None;
        let claimed = item.clone();

        state.active = Some(ActiveItem {
            id: claimed.id.clone(),
            cancel: cancel.clone(),
        });
        let status = &mut state.status;
        status.current_index += 1;
        status.current_title = Some(claimed.title.clone());
        status.progress_percent = 0;
        status.bytes_written = 0;
        status.total_bytes = None;
        status.bytes_per_sec = 0.0;

        Some((claimed, cancel))
    }

    fn record_progress(&self, id: &str, progress: &TransferProgress) {
        let mut state = lock_recover(&self.state);
        let percent = progress.percent().unwrap_or(0);
        if let Some(item) = state
            .items
            .iter_mut()
            .find(|i| i.id == id && i.status == ItemStatus::InProgress)
        {
            item.progress_percent = percent;
        }
        let status = &mut state.status;
        status.progress_percent = percent;
        status.bytes_written = progress.bytes_written;
        status.total_bytes = progress.total_bytes;
        status.bytes_per_sec = progress.bytes_per_sec;
    }

    fn process(&self, item: &QueueItem, cancel: &CancelFlag) -> Result<PathBuf> {
        let temp = temp_path(&self.policy.temp_dir(), self.name(), &item.id);
        remove_if_present(&temp);

        let result = self.transfer_and_commit(item, &temp, cancel);
        if result.is_err() {
            remove_if_present(&temp);
        }
        result
    }

    fn transfer_and_commit(&self, item: &QueueItem, temp: &Path, cancel: &CancelFlag) -> Result<PathBuf> {
        let mut report = |progress: &TransferProgress| self.record_progress(&item.id, progress);
        let bytes = self.policy.transfer(item, temp, cancel, &mut report)?;
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        tracing::debug!(queue = self.name(), id = %item.id, bytes, "transfer finished, validating");

        self.policy.validate(item, temp)?;
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        self.policy.commit(item, temp)
    }

    fn settle(&self, item: &QueueItem, outcome: Result<PathBuf>) {
        let mut state = lock_recover(&self.state);
        if state.active.as_ref().map_or(false, |a| a.id == item.id) {
            state.active = None;
        }
        let position = state
            .items
            .iter()
            .position(|i| i.id == item.id && i.status == ItemStatus::InProgress);

        match outcome {
            Ok(path) => {
                if let Some(index) = position {
                    state.items.remove(index);
                }
                state.status.completed_count += 1;
                state.status.progress_percent = 100;
                tracing::info!(queue = self.name(), id = %item.id, path = %path.display(), "download complete");
            }
            Err(err) if err.is_cancelled() => {
                if let Some(index) = position {
                    state.items.remove(index);
                }
                tracing::info!(queue = self.name(), id = %item.id, "download cancelled");
            }
            Err(err) => {
                let message = err.user_message();
                if let Some(index) = position {
                    let failed = &mut state.items[index];
                    failed.status = ItemStatus::Failed;
                    failed.progress_percent = 0;
                    failed.error = Some(message.clone());
                }
                state.status.failed_count += 1;
                state.status.last_error = Some(message);
                tracing::warn!(queue = self.name(), id = %item.id, error = %err, "download failed");
            }
        }

        self.persist_locked(&state);
    }
}

/// Clears the running flag however the worker exits
struct RunningGuard<'a>(&'a Shared);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        let mut state = lock_recover(&self.0.state);
        state.status.running = false;
        state.status.current_title = None;
        state.active = None;
        // An item left InProgress by a panic becomes retryable
        for item in state.items.iter_mut().filter(|i| i.status == ItemStatus::InProgress) {
            item.status = ItemStatus::Failed;
        }
    }
}

fn run_worker(shared: Arc<Shared>) {
    let _running = RunningGuard(&shared);

    while let Some((item, cancel)) = shared.claim_next() {
        tracing::info!(queue = shared.name(), id = %item.id, url = %item.source_url, "download starting");
        let outcome = shared.process(&item, &cancel);
        shared.settle(&item, outcome);
    }

    tracing::info!(queue = shared.name(), "worker finished");
}

fn remove_if_present(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "removed temp file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "could not remove temp file"),
    }
}
