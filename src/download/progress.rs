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


//! Transfer progress reporting
//!
//! # Progress Information
//! - Bytes written / expected total (0 if the server sent no length)
//! - Whole-number percent for progress bars
//! - Moving-average speed over a sliding window

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Progress snapshot handed to download callbacks
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TransferProgress {
    /// Bytes written so far
    pub bytes_written: u64,

    /// Expected total in bytes (None if unknown)
    pub total_bytes: Option<u64>,

    /// Current speed in bytes per second
    pub bytes_per_sec: f64,
}

impl TransferProgress {
    /// Percent complete, clamped to 0..=100; None without a known total
    pub fn percent(&self) -> Option<u8> {
        percent_of(self.bytes_written, self.total_bytes?)
    }

    /// Estimated seconds remaining, if total and speed are known
    pub fn eta_seconds(&self) -> Option<u64> {
        let total = self.total_bytes?;
        if self.bytes_per_sec <= 0.0 {
            return None;
        }
        let remaining = total.saturating_sub(self.bytes_written);
        Some((remaining as f64 / self.bytes_per_sec) as u64)
    }

    /// Format speed as human-readable string (e.g., "2.5 MB/s")
    pub fn speed_string(&self) -> String {
        format!("{:.1} MB/s", self.bytes_per_sec / 1_000_000.0)
    }

    /// Format bytes as human-readable string (e.g., "45.2 MB")
    pub fn bytes_string(bytes: u64) -> String {
        format!("{:.1} MB", bytes as f64 / 1_000_000.0)
    }
}

/// `min(100, done * 100 / total)`; None when the total is zero
pub fn percent_of(done: u64, total: u64) -> Option<u8> {
    if total == 0 {
        return None;
    }
    let pct = (done as u128 * 100 / total as u128).min(100);
    Some(pct as u8)
}

/// Speed tracker with moving average
///
/// Uses a sliding window to smooth out flaky Wi-Fi throughput
#[derive(Debug)]
pub struct SpeedTracker {
    samples: VecDeque<SpeedSample>,
    window_duration: Duration,
}

#[derive(Debug, Clone, Copy)]
struct SpeedSample {
    timestamp: Instant,
    position: u64,
}

impl SpeedTracker {
    /// Create new speed tracker with default 5-second window
    pub fn new() -> Self {
        Self::with_window(Duration::from_secs(5))
    }

    pub fn with_window(window_duration: Duration) -> Self {
        Self {
            samples: VecDeque::new(),
            window_duration,
        }
    }

    /// Add a position sample (total bytes written so far)
    pub fn add_position(&mut self, position: u64) {
        self.add_sample(Instant::now(), position);
    }

    fn add_sample(&mut self, now: Instant, position: u64) {
        self.samples.push_back(SpeedSample {
            timestamp: now,
            position,
        });

        // Keep at least two samples so a stalled link still reports something
        while self.samples.len() > 2 {
            match self.samples.front() {
                Some(sample) if now.duration_since(sample.timestamp) > self.window_duration => {
                    self.samples.pop_front();
                }
                _ => break,
            }
        }
    }

    /// Current average speed in bytes per second
    pub fn average_speed(&self) -> f64 {
        let (first, last) = match (self.samples.front(), self.samples.back()) {
            (Some(first), Some(last)) if self.samples.len() >= 2 => (first, last),
            _ => return 0.0,
        };

        let bytes_delta = last.position.saturating_sub(first.position);
        let time_delta = last.timestamp.duration_since(first.timestamp).as_secs_f64();

        if time_delta > 0.0 {
            bytes_delta as f64 / time_delta
        } else {
            0.0
        }
    }
}

impl Default for SpeedTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Combines byte counting with speed tracking for one transfer
#[derive(Debug)]
pub struct ProgressTracker {
    progress: TransferProgress,
    speed: SpeedTracker,
}

impl ProgressTracker {
    pub fn new(total_bytes: Option<u64>) -> Self {
        let mut speed = SpeedTracker::new();
        speed.add_position(0);
        Self {
            progress: TransferProgress {
                bytes_written: 0,
                total_bytes,
                bytes_per_sec: 0.0,
            },
            speed,
        }
    }

    /// Record a new absolute position and return the refreshed snapshot
    pub fn update(&mut self, bytes_written: u64) -> TransferProgress {
        self.speed.add_position(bytes_written);
        self.progress.bytes_written = bytes_written;
        self.progress.bytes_per_sec = self.speed.average_speed();
        self.progress
    }

    pub fn snapshot(&self) -> TransferProgress {
        self.progress
    }
}
