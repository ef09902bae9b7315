//! Engine configuration
//!
//! Loaded once at startup from a JSON file next to the player's settings.
//! Every field has a default so a partial (or missing) file is fine.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Transport options shared by `fetch`, `probe` and `download_to_file`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpOptions {
    /// Maximum redirect hops before giving up
    pub max_redirects: usize,

    /// Bound on the status line + header block
    pub max_header_bytes: usize,

    /// Read size for streamed bodies
    pub chunk_size: usize,

    /// TCP connect timeout per resolved address
    pub connect_timeout_secs: u64,

    /// Socket read/write timeout
    pub io_timeout_secs: u64,

    /// Value of the User-Agent header
    pub user_agent: String,

    /// Skip TLS certificate and hostname verification.
    ///
    /// On by default: the player talks to self-signed radio and streaming
    /// endpoints. This weakens TLS to encryption-only; turn it off per
    /// deployment when every endpoint has a valid chain.
    pub accept_invalid_certs: bool,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            max_redirects: 10,
            max_header_bytes: 16 * 1024,
            chunk_size: 8 * 1024,
            connect_timeout_secs: 15,
            io_timeout_secs: 30,
            user_agent: concat!("mediafetch/", env!("CARGO_PKG_VERSION")).to_string(),
            accept_invalid_certs: true,
        }
    }
}

impl HttpOptions {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout_secs.max(1))
    }
}

/// Self-update settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// External program that performs the transfer
    pub helper_program: String,

    /// Arguments; `{url}` and `{output}` are substituted
    pub helper_args: Vec<String>,

    /// File-size sampling interval
    pub poll_interval_ms: u64,

    /// Ceiling for the whole helper run
    pub timeout_secs: u64,

    /// Anything smaller is treated as an error page, not a binary
    pub min_binary_bytes: u64,

    /// Installed application binary that gets replaced
    pub target_binary: PathBuf,

    /// Use the external helper instead of the built-in downloader
    pub use_helper: bool,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            helper_program: "curl".to_string(),
            helper_args: vec![
                "-k".to_string(),
                "-L".to_string(),
                "-s".to_string(),
                "-o".to_string(),
                "{output}".to_string(),
                "{url}".to_string(),
            ],
            poll_interval_ms: 500,
            timeout_secs: 180,
            min_binary_bytes: 64 * 1024,
            target_binary: PathBuf::from("mediaplayer.elf"),
            use_helper: true,
        }
    }
}

impl UpdateConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(10))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Where finished media files land
    pub download_dir: PathBuf,

    /// Where queue files are kept
    pub state_dir: PathBuf,

    pub http: HttpOptions,

    /// Byte cap for the title part of a filename
    pub max_title_bytes: usize,

    /// Smallest media file accepted as a real download
    pub min_media_bytes: u64,

    /// Extension for audio-track downloads
    pub audio_extension: String,

    /// Extension for podcast episodes whose URL has none
    pub podcast_extension: String,

    /// Source URL for an audio track, `{id}` is substituted
    pub audio_source_template: Option<String>,

    pub update: UpdateConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("downloads"),
            state_dir: PathBuf::from("state"),
            http: HttpOptions::default(),
            max_title_bytes: 100,
            min_media_bytes: 1024,
            audio_extension: "m4a".to_string(),
            podcast_extension: "mp3".to_string(),
            audio_source_template: None,
            update: UpdateConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration (temp file + rename)
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Reject values that would make the engine misbehave
    pub fn validate(&self) -> Result<()> {
        if self.http.chunk_size == 0 {
            return Err(EngineError::Config("http.chunk_size must be > 0".into()));
        }
        if self.http.max_header_bytes < 64 {
            return Err(EngineError::Config("http.max_header_bytes is too small".into()));
        }
        if self.max_title_bytes < 8 {
            return Err(EngineError::Config("max_title_bytes must be at least 8".into()));
        }
        if let Some(template) = &self.audio_source_template {
            if !template.contains("{id}") {
                return Err(EngineError::Config(
                    "audio_source_template must contain {id}".into(),
                ));
            }
        }
        Ok(())
    }

    /// Queue file for a named queue
    pub fn queue_file(&self, queue_name: &str) -> PathBuf {
        self.state_dir.join(format!("{}_queue.txt", queue_name))
    }
}
