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


//! Progress for transfers done by an external helper process
//!
//! The helper (curl by default) prints nothing we can parse, so progress is
//! approximated by sampling the output file's size on a timer against a
//! size learned beforehand. Completion is signalled by an exit-code marker
//! file written by a small `sh` wrapper once the helper returns.
//!
//! Each tick of the sampling loop, in order:
//! 1. cancel requested: terminate the helper, remove output and marker
//! 2. deadline passed: terminate the helper, fail with `Timeout`
//! 3. sample the output size and report progress
//! 4. marker present (or helper gone): finish with its exit code

use crate::config::UpdateConfig;
use crate::download::cancel::CancelFlag;
use crate::download::progress::{ProgressTracker, TransferProgress};
use crate::error::{EngineError, Result};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Instant;

/// Runs the helper, then records its exit code in the marker file
#[cfg(unix)]
const EXIT_MARKER_WRAPPER: &str = r#"marker="$1"; shift; "$@"; echo $? > "$marker""#;

/// Substitute `{url}` and `{output}` in the helper's argument template
pub fn expand_args(template: &[String], url: &str, output: &Path) -> Vec<String> {
    let output = output.to_string_lossy();
    template
        .iter()
        .map(|arg| arg.replace("{url}", url).replace("{output}", &output))
        .collect()
}

/// Path of the exit marker that belongs to `output`
pub fn marker_path(output: &Path) -> PathBuf {
    let mut name = OsString::from(output.as_os_str());
    name.push(".exit");
    PathBuf::from(name)
}

/// Download `url` to `output` through the configured helper program.
///
/// `expected_total` drives the percentage; without it only byte counts are
/// reported. Returns the size of the finished file.
pub fn monitor_helper_download(
    url: &str,
    output: &Path,
    expected_total: Option<u64>,
    config: &UpdateConfig,
    cancel: &CancelFlag,
    on_progress: &mut dyn FnMut(&TransferProgress),
) -> Result<u64> {
    let marker = marker_path(output);
    remove_quietly(output);
    remove_quietly(&marker);
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let args = expand_args(&config.helper_args, url, output);
    let mut child = spawn_helper(&config.helper_program, &args, &marker)?;
    tracing::info!(
        program = %config.helper_program,
        pid = child.id(),
        url,
        expected = ?expected_total,
        "helper download started"
    );

    let started = Instant::now();
    let deadline = config.timeout();
    let mut tracker = ProgressTracker::new(expected_total);

    loop {
        if cancel.is_cancelled() {
            terminate(&mut child);
            remove_quietly(output);
            remove_quietly(&marker);
            tracing::info!(url, "helper download cancelled");
            return Err(EngineError::Cancelled);
        }

        if started.elapsed() >= deadline {
            terminate(&mut child);
            remove_quietly(output);
            remove_quietly(&marker);
            tracing::warn!(url, timeout_secs = config.timeout_secs, "helper download timed out");
            return Err(EngineError::Timeout(config.timeout_secs));
        }

        let size = file_size(output);
        on_progress(&tracker.update(size));

        let exit_code = match read_marker(&marker) {
            Some(code) => Some(code),
            None => match child.try_wait()? {
                // Helper gone; the marker may have landed in the meantime
                Some(status) => Some(read_marker(&marker).unwrap_or_else(|| status.code().unwrap_or(-1))),
                None => None,
            },
        };

        if let Some(code) = exit_code {
            let _ = child.wait();
            remove_quietly(&marker);
            if code != 0 {
                remove_quietly(output);
                return Err(EngineError::Helper(format!(
                    "{} exited with code {}",
                    config.helper_program, code
                )));
            }

            let size = file_size(output);
            on_progress(&tracker.update(size));
            tracing::info!(url, bytes = size, elapsed_ms = started.elapsed().as_millis() as u64, "helper download finished");
            return Ok(size);
        }

        thread::sleep(config.poll_interval());
    }
}

#[cfg(unix)]
fn spawn_helper(program: &str, args: &[String], marker: &Path) -> Result<Child> {
    use std::os::unix::process::CommandExt;

    Command::new("sh")
        .arg("-c")
        .arg(EXIT_MARKER_WRAPPER)
        .arg("sh")
        .arg(marker)
        .arg(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        // Own process group so a cancel reaches the helper, not just the shell
        .process_group(0)
        .spawn()
        .map_err(|e| EngineError::Helper(format!("failed to start {}: {}", program, e)))
}

#[cfg(not(unix))]
fn spawn_helper(program: &str, args: &[String], _marker: &Path) -> Result<Child> {
    // No wrapper shell: completion is detected from the exit status alone
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| EngineError::Helper(format!("failed to start {}: {}", program, e)))
}

fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        let _ = Command::new("kill")
            .arg("-TERM")
            .arg(format!("-{}", child.id()))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }
    let _ = child.kill();
    // Reap the zombie
    let _ = child.wait();
}

fn read_marker(marker: &Path) -> Option<i32> {
    fs::read_to_string(marker).ok()?.trim().parse().ok()
}

fn file_size(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "could not remove file");
        }
    }
}
