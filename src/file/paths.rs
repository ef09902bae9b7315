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


//! Filesystem-safe names for downloaded media
//!
//! - Titles become filenames with path-unsafe characters stripped
//! - Length caps are in bytes and never split a UTF-8 sequence
//! - Temp files are dot-prefixed, keyed by queue and item id, and end in
//!   `.part`, so they cannot collide with a final name or with each other

use lazy_static::lazy_static;
use regex::Regex;
use std::path::{Path, PathBuf};

/// Suffix shared by every in-flight download
pub const TEMP_SUFFIX: &str = ".part";

const UNSAFE_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

lazy_static! {
    static ref WHITESPACE_RUN: Regex = Regex::new(r"\s+").expect("static regex");
}

/// Turn a display title into a filename stem.
///
/// Unsafe and control characters are removed, whitespace runs collapse to a
/// single space, leading/trailing dots and spaces are trimmed and the result
/// is capped at `max_bytes` on a character boundary.
pub fn sanitize_filename(title: &str, max_bytes: usize) -> String {
    let stripped: String = title
        .chars()
        .filter(|c| !UNSAFE_CHARS.contains(c) && !c.is_control())
        .collect();

    let collapsed = WHITESPACE_RUN.replace_all(&stripped, " ");
    let trimmed = collapsed.trim_matches(|c: char| c == '.' || c.is_whitespace());
    let truncated = truncate_component(trimmed, max_bytes);
    let result = truncated.trim_end_matches(|c: char| c == '.' || c.is_whitespace());

    if result.is_empty() {
        "untitled".to_string()
    } else {
        result.to_string()
    }
}

/// Cut `text` to at most `max_bytes` without splitting a character
pub fn truncate_component(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }

    let mut index = max_bytes;
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    &text[..index]
}

/// Item ids become part of temp names; keep only a conservative alphabet
pub fn sanitize_id(id: &str) -> String {
    let cleaned: String = id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    truncate_component(&cleaned, 64).to_string()
}

/// Final destination for a title: `<dir>/<safe title>.<ext>`
pub fn media_path(dir: &Path, title: &str, extension: &str, max_title_bytes: usize) -> PathBuf {
    let stem = sanitize_filename(title, max_title_bytes);
    let extension = extension.trim_start_matches('.');
    if extension.is_empty() {
        dir.join(stem)
    } else {
        dir.join(format!("{}.{}", stem, extension))
    }
}

/// In-flight path for an item: `<dir>/.<queue>-<id>.part`.
///
/// A different id (or queue) always yields a different path, and no final
/// name produced by [`media_path`] starts with a dot.
pub fn temp_path(dir: &Path, queue_name: &str, id: &str) -> PathBuf {
    dir.join(format!(".{}-{}{}", sanitize_id(queue_name), sanitize_id(id), TEMP_SUFFIX))
}

pub fn is_temp_path(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.') && n.ends_with(TEMP_SUFFIX))
        .unwrap_or(false)
}

/// Avoid filename collision by appending (1), (2), etc.
pub fn avoid_collision(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("file");
    let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");

    let mut counter = 1;
    loop {
        let new_name = if extension.is_empty() {
            format!("{} ({})", stem, counter)
        } else {
            format!("{} ({}).{}", stem, counter, extension)
        };

        let new_path = parent.join(new_name);
        if !new_path.exists() {
            return new_path;
        }

        counter += 1;
        if counter > 9999 {
            return new_path;
        }
    }
}

/// Extension of the last path segment of a URL, if it looks like one
pub fn url_extension(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or("");
    let segment = path.rsplit('/').next().unwrap_or("");
    let (_, ext) = segment.rsplit_once('.')?;
    if !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        Some(ext.to_ascii_lowercase())
    } else {
        None
    }
}
