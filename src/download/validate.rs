//! Post-download artifact checks
//!
//! A file is only renamed into place after it passes a minimum size check
//! and, for binary audio containers, a magic-byte check. Servers on captive
//! portals happily return a 200 with an HTML page; this catches that.

use crate::error::{EngineError, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;

const SNIFF_LEN: usize = 16;

/// Container families recognised by their leading bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    /// ISO base media (`ftyp` box at offset 4): m4a, m4b, mp4, aac in mp4
    Mp4,
    /// ID3 tag or MPEG audio frame sync
    Mp3,
    Ogg,
    Flac,
    /// EBML header: webm, mka
    Matroska,
    Wav,
}

impl Container {
    /// Container expected for a file extension, if it is one we can check
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "m4a" | "m4b" | "mp4" | "aac" | "mov" => Some(Container::Mp4),
            "mp3" => Some(Container::Mp3),
            "ogg" | "oga" | "opus" => Some(Container::Ogg),
            "flac" => Some(Container::Flac),
            "webm" | "mka" | "weba" => Some(Container::Matroska),
            "wav" => Some(Container::Wav),
            _ => None,
        }
    }

    pub fn matches(&self, head: &[u8]) -> bool {
        match self {
            Container::Mp4 => head.len() >= 8 && &head[4..8] == b"ftyp",
            Container::Mp3 => {
                head.starts_with(b"ID3")
                    || (head.len() >= 2 && head[0] == 0xFF && (head[1] & 0xE0) == 0xE0)
            }
            Container::Ogg => head.starts_with(b"OggS"),
            Container::Flac => head.starts_with(b"fLaC"),
            Container::Matroska => head.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]),
            Container::Wav => head.len() >= 12 && head.starts_with(b"RIFF") && &head[8..12] == b"WAVE",
        }
    }
}

/// Fail unless `path` holds at least `min_bytes`
pub fn check_min_size(path: &Path, min_bytes: u64) -> Result<u64> {
    let size = std::fs::metadata(path)?.len();
    if size < min_bytes {
        return Err(EngineError::validation(format!(
            "{} is {} bytes, expected at least {}",
            path.display(),
            size,
            min_bytes
        )));
    }
    Ok(size)
}

/// Size check plus a magic-byte check when `container` is known
pub fn validate_media(path: &Path, container: Option<Container>, min_bytes: u64) -> Result<()> {
    check_min_size(path, min_bytes)?;

    let Some(container) = container else {
        return Ok(());
    };

    let mut head = [0u8; SNIFF_LEN];
    let mut file = File::open(path)?;
    let mut filled = 0;
    while filled < head.len() {
        let n = file.read(&mut head[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    if container.matches(&head[..filled]) {
        Ok(())
    } else {
        tracing::warn!(path = %path.display(), ?container, head = ?&head[..filled.min(8)], "magic bytes do not match");
        Err(EngineError::validation(format!(
            "{} does not look like {:?} data",
            path.display(),
            container
        )))
    }
}
