//! File removal for uninstalls

use super::error::{InstallError, InstallResult};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// What an uninstall did with each ledgered path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UninstallReport {
    /// Ledger key of the uninstalled archive
    pub key: String,
    pub removed: Vec<PathBuf>,
    /// Paths that were already gone
    pub missing: Vec<PathBuf>,
    /// Ledgered directories, which are never deleted
    pub skipped_dirs: Vec<PathBuf>,
}

/// Outcome of removing a single path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Removal {
    Removed,
    Missing,
    Directory,
}

/// Delete one file, never a directory.
///
/// A permission failure clears the read-only flag and retries once. If the
/// second attempt also fails the result is
/// [`InstallError::PermissionDenied`].
pub(crate) fn remove_file_safely(path: &Path) -> InstallResult<Removal> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::warn!("File not found: {}", path.display());
            return Ok(Removal::Missing);
        }
        Err(source) => {
            return Err(InstallError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    if meta.is_dir() {
        tracing::info!("Skipping directory: {}", path.display());
        return Ok(Removal::Directory);
    }

    match fs::remove_file(path) {
        Ok(()) => {
            tracing::info!("Deleted file: {}", path.display());
            Ok(Removal::Removed)
        }
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            tracing::error!(
                "Failed to delete {}. Retrying after clearing the read-only flag...",
                path.display()
            );
            clear_readonly(path, meta.permissions());
            match fs::remove_file(path) {
                Ok(()) => {
                    tracing::info!("Deleted file after retry: {}", path.display());
                    Ok(Removal::Removed)
                }
                Err(e) => {
                    tracing::error!("Retry failed for {}: {}", path.display(), e);
                    Err(InstallError::PermissionDenied {
                        path: path.to_path_buf(),
                    })
                }
            }
        }
        Err(source) => Err(InstallError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(unix)]
fn clear_readonly(path: &Path, permissions: fs::Permissions) {
    use std::os::unix::fs::PermissionsExt;
    let writable = fs::Permissions::from_mode(permissions.mode() | 0o200);
    if let Err(e) = fs::set_permissions(path, writable) {
        tracing::warn!("Could not make {} writable: {}", path.display(), e);
    }
}

#[cfg(not(unix))]
#[allow(clippy::permissions_set_readonly_false)]
fn clear_readonly(path: &Path, mut permissions: fs::Permissions) {
    permissions.set_readonly(false);
    if let Err(e) = fs::set_permissions(path, permissions) {
        tracing::warn!("Could not make {} writable: {}", path.display(), e);
    }
}
