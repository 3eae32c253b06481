//! Archive extraction into an isolated staging tree (zip, rar)

use super::error::{InstallError, InstallResult, IoPathExt};
use std::fs::File;
use std::path::Path;
use tempfile::TempDir;

/// Name prefix of staging directories. Snapshots skip anything under them.
pub const STAGING_PREFIX: &str = ".cybermods-staging-";

/// Supported archive formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    Rar,
}

impl ArchiveFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::Rar => "rar",
        }
    }
}

impl std::fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extracted contents of exactly one archive.
///
/// The directory is deleted when the value is dropped, so every early return
/// in the install pipeline discards the staging area.
#[derive(Debug)]
pub struct StagingTree {
    dir: TempDir,
    format: ArchiveFormat,
}

impl StagingTree {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Format the archive was read as
    pub fn format(&self) -> ArchiveFormat {
        self.format
    }

    /// Remove the staging directory, reporting failures instead of ignoring them
    pub fn close(self) -> InstallResult<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close().at(&path)?;
        tracing::info!("Cleaned up temporary extraction directory: {}", path.display());
        Ok(())
    }
}

/// Extract an archive into a fresh staging directory under `staging_parent`.
///
/// ZIP is always tried first regardless of the file extension; RAR is the
/// fallback when the file is not a ZIP. When neither format can read it the
/// result is [`InstallError::UnsupportedArchive`] and nothing is left on disk.
pub fn open_archive(archive: &Path, staging_parent: &Path) -> InstallResult<StagingTree> {
    if !archive.is_file() {
        return Err(InstallError::ArchiveNotFound(archive.to_path_buf()));
    }

    std::fs::create_dir_all(staging_parent).at(staging_parent)?;
    let dir = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(staging_parent)
        .at(staging_parent)?;

    let file = File::open(archive).at(archive)?;
    match zip::ZipArchive::new(file) {
        Ok(mut zip) => {
            extract_zip(&mut zip, dir.path())?;
            tracing::info!("Extracted {} as zip", archive.display());
            return Ok(StagingTree {
                dir,
                format: ArchiveFormat::Zip,
            });
        }
        Err(e) => {
            tracing::debug!("{} is not a ZIP archive ({}), trying RAR", archive.display(), e);
        }
    }

    match extract_rar(archive, dir.path()) {
        Ok(()) => {
            tracing::info!("Extracted {} as rar", archive.display());
            Ok(StagingTree {
                dir,
                format: ArchiveFormat::Rar,
            })
        }
        Err(reason) => {
            tracing::error!("Unsupported file format for {}: {}", archive.display(), reason);
            Err(InstallError::UnsupportedArchive {
                path: archive.to_path_buf(),
            })
        }
    }
}

/// Extract every entry of an opened ZIP archive
fn extract_zip(zip: &mut zip::ZipArchive<File>, dest: &Path) -> InstallResult<()> {
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let relative = sanitize_path(entry.name());
        if relative.is_empty() {
            continue;
        }
        let outpath = dest.join(&relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&outpath).at(&outpath)?;
        } else {
            if let Some(parent) = outpath.parent() {
                std::fs::create_dir_all(parent).at(parent)?;
            }
            let mut outfile = File::create(&outpath).at(&outpath)?;
            std::io::copy(&mut entry, &mut outfile).at(&outpath)?;

            // Set permissions on Unix
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Some(mode) = entry.unix_mode() {
                    // Keep extracted files owner-writable so uninstall can delete them.
                    std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode | 0o200))
                        .at(&outpath)?;
                }
            }
        }
    }

    Ok(())
}

/// Extract a RAR archive, returning a description of the failure
fn extract_rar(archive: &Path, dest: &Path) -> Result<(), String> {
    let archive_str = archive
        .to_str()
        .ok_or("RAR path contains invalid UTF-8")?;
    let dest_str = dest.to_str().ok_or("Staging path contains invalid UTF-8")?;

    rar::Archive::extract_all(archive_str, dest_str, "")
        .map(|_| ())
        .map_err(|e| format!("Failed to extract RAR: {e:?}"))
}

/// Sanitize path to prevent directory traversal
fn sanitize_path(path: &str) -> String {
    path.replace('\\', "/")
        .split('/')
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::write_zip;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(sanitize_path("archive/pc/mod/a.archive"), "archive/pc/mod/a.archive");
        assert_eq!(sanitize_path("bin\\x64\\plugin.dll"), "bin/x64/plugin.dll");
        assert_eq!(sanitize_path("../../../etc/passwd"), "etc/passwd");
        assert_eq!(sanitize_path("./r6/./scripts"), "r6/scripts");
    }

    #[test]
    fn zip_is_extracted_into_prefixed_staging_dir() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("mod_20240101_120000.zip");
        write_zip(
            &archive,
            &[
                ("archive/pc/mod/", ""),
                ("archive/pc/mod/example.archive", "data"),
            ],
        );
        let target = tmp.path().join("game");

        let staging = open_archive(&archive, &target).unwrap();
        assert_eq!(staging.format(), ArchiveFormat::Zip);
        assert!(staging
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(STAGING_PREFIX));
        assert_eq!(
            std::fs::read(staging.path().join("archive/pc/mod/example.archive")).unwrap(),
            b"data"
        );

        let staging_path = staging.path().to_path_buf();
        staging.close().unwrap();
        assert!(!staging_path.exists());
    }

    #[test]
    fn corrupt_file_leaves_no_staging_behind() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("broken.zip");
        std::fs::write(&archive, b"definitely not an archive").unwrap();
        let target = tmp.path().join("game");

        let err = open_archive(&archive, &target).unwrap_err();
        assert!(matches!(err, InstallError::UnsupportedArchive { .. }));
        assert_eq!(std::fs::read_dir(&target).unwrap().count(), 0);
    }

    #[test]
    fn missing_archive_is_reported() {
        let tmp = TempDir::new().unwrap();
        let err = open_archive(&tmp.path().join("nope.zip"), tmp.path()).unwrap_err();
        assert!(matches!(err, InstallError::ArchiveNotFound(_)));
    }

    #[test]
    fn dropping_staging_tree_removes_it() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("m.zip");
        write_zip(&archive, &[("readme.txt", "hi")]);

        let staging = open_archive(&archive, tmp.path()).unwrap();
        let path = staging.path().to_path_buf();
        drop(staging);
        assert!(!path.exists());
    }
}
