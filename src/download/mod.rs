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


//! Streaming downloads and the background download queues
//!
//! - [`stream`] writes one response body to disk with progress and cancel
//! - [`queue`] runs one worker per queue over a [`QueuePolicy`]
//! - [`media`] holds the podcast and audio-track policies
//! - [`persist`] is the `id|title` queue file

pub mod cancel;
pub mod media;
pub mod persist;
pub mod progress;
pub mod queue;
pub mod stream;
pub mod validate;

// Re-export commonly used types
pub use cancel::CancelFlag;
pub use media::MediaPolicy;
pub use progress::TransferProgress;
pub use queue::{AddOutcome, DownloadQueue, ItemStatus, QueueItem, QueuePolicy, QueueStatus};
pub use stream::download_to_file;
