//! Errors raised by the install pipeline and the installed-files ledger

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InstallError {
    /// Neither ZIP nor RAR could read the file
    #[error("Unsupported or corrupt archive: {}", path.display())]
    UnsupportedArchive { path: PathBuf },

    #[error(
        "Game installation folder is not set or does not exist. \
         Configure it with 'cybermods config set-game-dir <path>'."
    )]
    GameDirMissing,

    #[error("Archive not found: {}", .0.display())]
    ArchiveNotFound(PathBuf),

    #[error("'{0}' is not tracked as installed")]
    NotInstalled(String),

    /// Deletion was refused even after clearing the read-only flag
    #[error(
        "Could not delete {}. Check its permissions or re-run with elevated privileges.",
        path.display()
    )]
    PermissionDenied { path: PathBuf },

    /// Relocation failed after some files were already placed. Those files
    /// are still ledgered so they can be uninstalled.
    #[error("Install stopped after placing {} file(s): {source}", extracted_files.len())]
    PartialInstall {
        extracted_files: Vec<PathBuf>,
        #[source]
        source: Box<InstallError>,
    },

    #[error("Invalid archive name '{0}': must end with .{1}")]
    InvalidArchiveName(String, String),

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to walk {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Failed to read ZIP entry: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Ledger document is invalid: {0}")]
    Ledger(#[from] serde_json::Error),
}

pub type InstallResult<T> = Result<T, InstallError>;

/// Attach a path to an `io::Error`
pub(crate) trait IoPathExt<T> {
    fn at(self, path: &Path) -> InstallResult<T>;
}

impl<T> IoPathExt<T> for std::io::Result<T> {
    fn at(self, path: &Path) -> InstallResult<T> {
        self.map_err(|source| InstallError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
