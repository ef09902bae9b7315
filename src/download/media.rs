//! Podcast-episode and audio-track queue policies
//!
//! Both stream over the built-in HTTP client into a temp file, check the
//! container's magic bytes and rename into the download directory under a
//! name derived from the display title.

use crate::config::{EngineConfig, HttpOptions};
use crate::download::cancel::CancelFlag;
use crate::download::progress::TransferProgress;
use crate::download::queue::{QueueItem, QueuePolicy};
use crate::download::stream::download_to_file;
use crate::download::validate::{validate_media, Container};
use crate::error::{EngineError, Result};
use crate::file::paths::{avoid_collision, media_path, url_extension};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Podcast,
    AudioTrack,
}

#[derive(Debug, Clone)]
pub struct MediaPolicy {
    kind: MediaKind,
    download_dir: PathBuf,
    default_extension: String,
    max_title_bytes: usize,
    min_bytes: u64,
    source_template: Option<String>,
    http: HttpOptions,
}

impl MediaPolicy {
    pub fn podcast(config: &EngineConfig) -> Self {
        Self {
            kind: MediaKind::Podcast,
            download_dir: config.download_dir.join("podcasts"),
            default_extension: config.podcast_extension.clone(),
            max_title_bytes: config.max_title_bytes,
            min_bytes: config.min_media_bytes,
            source_template: None,
            http: config.http.clone(),
        }
    }

    pub fn audio(config: &EngineConfig) -> Self {
        Self {
            kind: MediaKind::AudioTrack,
            download_dir: config.download_dir.join("audio"),
            default_extension: config.audio_extension.clone(),
            max_title_bytes: config.max_title_bytes,
            min_bytes: config.min_media_bytes,
            source_template: config.audio_source_template.clone(),
            http: config.http.clone(),
        }
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    fn extension_for(&self, source_url: &str) -> String {
        match self.kind {
            // Feeds link mp3, m4a and ogg alike; trust the enclosure URL
            MediaKind::Podcast => url_extension(source_url)
                .filter(|ext| Container::from_extension(ext).is_some())
                .unwrap_or_else(|| self.default_extension.clone()),
            MediaKind::AudioTrack => self.default_extension.clone(),
        }
    }
}

impl QueuePolicy for MediaPolicy {
    fn name(&self) -> &str {
        match self.kind {
            MediaKind::Podcast => "podcast",
            MediaKind::AudioTrack => "audio",
        }
    }

    fn temp_dir(&self) -> PathBuf {
        self.download_dir.clone()
    }

    fn destination(&self, _id: &str, title: &str, source_url: &str) -> PathBuf {
        let extension = self.extension_for(source_url);
        media_path(&self.download_dir, title, &extension, self.max_title_bytes)
    }

    fn source_url(&self, id: &str) -> Option<String> {
        match self.kind {
            MediaKind::Podcast => {
                let lower = id.to_ascii_lowercase();
                (lower.starts_with("http://") || lower.starts_with("https://")).then(|| id.to_string())
            }
            MediaKind::AudioTrack => self
                .source_template
                .as_ref()
                .map(|template| template.replace("{id}", id)),
        }
    }

    fn transfer(
        &self,
        item: &QueueItem,
        temp: &Path,
        cancel: &CancelFlag,
        progress: &mut dyn FnMut(&TransferProgress),
    ) -> Result<u64> {
        if item.source_url.is_empty() {
            return Err(EngineError::InvalidUrl(format!("no source URL for {}", item.id)));
        }
        download_to_file(&item.source_url, temp, |p| progress(p), cancel, &self.http)
    }

    fn validate(&self, item: &QueueItem, temp: &Path) -> Result<()> {
        let container = item
            .destination_path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Container::from_extension);
        validate_media(temp, container, self.min_bytes)
    }

    fn commit(&self, item: &QueueItem, temp: &Path) -> Result<PathBuf> {
        commit_file(temp, &item.destination_path)
    }
}

/// Rename a validated temp file to `dest`, never overwriting an existing file
pub fn commit_file(temp: &Path, dest: &Path) -> Result<PathBuf> {
    if let Some(parent) = dest.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let final_path = avoid_collision(dest);
    fs::rename(temp, &final_path)?;
    Ok(final_path)
}
