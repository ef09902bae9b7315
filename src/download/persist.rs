//! Queue file format
//!
//! Plain text, one `id|title` line per queued item, rewritten in full on
//! every mutation (temp file + rename so a crash never leaves half a file).
//! Status is not stored: everything reloads as pending.

use crate::error::{EngineError, Result};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

const SEPARATOR: char = '|';

/// One persisted line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedEntry {
    pub id: String,
    pub title: String,
}

/// Ids are stored verbatim, so they may not contain the separator or a newline
pub fn check_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(EngineError::InvalidInput("item id is empty".into()));
    }
    if id.contains(SEPARATOR) || id.contains(['\n', '\r']) {
        return Err(EngineError::InvalidInput(format!(
            "item id {:?} contains '|' or a line break",
            id
        )));
    }
    Ok(())
}

/// Titles are free text; flatten anything that would break the line format
pub fn clean_title(title: &str) -> String {
    title
        .chars()
        .map(|c| if c == SEPARATOR || c == '\n' || c == '\r' { ' ' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Rewrite the queue file with `entries`, in order
pub fn save_entries<'a, I>(path: &Path, entries: I) -> Result<()>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut contents = String::new();
    for (id, title) in entries {
        contents.push_str(id);
        contents.push(SEPARATOR);
        contents.push_str(&clean_title(title));
        contents.push('\n');
    }

    let temp_path = path.with_extension("txt.tmp");
    {
        let mut file = File::create(&temp_path)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
    }
    fs::rename(&temp_path, path)?;
    Ok(())
}

/// Read the queue file. A missing file is an empty queue.
pub fn load_entries(path: &Path) -> Result<Vec<PersistedEntry>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut entries: Vec<PersistedEntry> = Vec::new();
    for (line_no, line) in contents.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        let Some((id, title)) = line.split_once(SEPARATOR) else {
            tracing::warn!(path = %path.display(), line = line_no + 1, "skipping queue line without separator");
            continue;
        };
        let id = id.trim();
        if id.is_empty() || entries.iter().any(|e| e.id == id) {
            tracing::warn!(path = %path.display(), line = line_no + 1, "skipping empty or duplicate id");
            continue;
        }
        entries.push(PersistedEntry {
            id: id.to_string(),
            title: title.to_string(),
        });
    }
    Ok(entries)
}
