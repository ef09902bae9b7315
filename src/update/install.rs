//! Swap a downloaded binary into place
//!
//! The running binary is renamed to `<target>.old` first and the staged file
//! renamed over the target. If that second rename fails the backup is moved
//! back, so the device always has a bootable binary at `target`.

use crate::error::{EngineError, Result};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

pub fn backup_path(target: &Path) -> PathBuf {
    let mut name = OsString::from(target.as_os_str());
    name.push(".old");
    PathBuf::from(name)
}

/// Install `staged` as `target`, keeping the previous binary as `.old`.
///
/// `staged` must live on the same filesystem as `target`.
pub fn install_binary(staged: &Path, target: &Path) -> Result<PathBuf> {
    if !staged.is_file() {
        return Err(EngineError::InvalidInput(format!(
            "staged binary {} does not exist",
            staged.display()
        )));
    }

    make_executable(staged)?;

    let backup = backup_path(target);
    let had_previous = target.exists();
    if had_previous {
        if backup.exists() {
            fs::remove_file(&backup)?;
        }
        fs::rename(target, &backup)?;
        tracing::debug!(backup = %backup.display(), "previous binary backed up");
    }

    if let Err(err) = fs::rename(staged, target) {
        tracing::error!(target = %target.display(), error = %err, "install rename failed, restoring backup");
        if had_previous {
            if let Err(restore_err) = fs::rename(&backup, target) {
                tracing::error!(error = %restore_err, "could not restore backup binary");
            }
        }
        return Err(err.into());
    }

    tracing::info!(target = %target.display(), "binary installed");
    Ok(target.to_path_buf())
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
