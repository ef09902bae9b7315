//! Background network fetch and download engine for the media player
//!
//! - [`http`]: hand-framed HTTP/1.1 GET over plain TCP or TLS
//! - [`download`]: streaming downloads and the background download queues
//! - [`update`]: self-update through an external helper process
//! - [`file`]: filesystem-safe naming for downloaded media
//!
//! Everything here is blocking; each queue runs its own worker thread and
//! the UI thread only polls status snapshots.

pub mod config;
pub mod download;
pub mod error;
pub mod file;
pub mod http;
pub mod sync;
pub mod update;

pub use config::{EngineConfig, HttpOptions, UpdateConfig};
pub use download::{
    download_to_file, AddOutcome, CancelFlag, DownloadQueue, ItemStatus, QueueItem, QueueStatus,
    TransferProgress,
};
pub use error::{EngineError, ErrorKind, Result};
pub use http::{fetch, probe, FetchResult, ParsedUrl};
pub use update::ReleaseInfo;
