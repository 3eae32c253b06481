//! Downloaded archives: naming, the download cache and fetching from Nexus

mod cache;
mod fetch;
pub mod naming;

pub use cache::{DownloadCache, DownloadedFileRecord, ModStatus};
pub use fetch::{download_selected_files, DownloadedArchive};

use anyhow::{bail, Context, Result};
use naming::downloaded_archive_path;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Find the on-disk archive for a cached download.
///
/// Uses the recorded category when present, otherwise searches the output
/// directory for the file name.
pub fn locate_download(
    output_dir: &Path,
    file_name: &str,
    record: &DownloadedFileRecord,
) -> Option<PathBuf> {
    if let Some(category) = record.category.as_deref() {
        let path = downloaded_archive_path(output_dir, category, &record.mod_name, file_name);
        if path.is_file() {
            return Some(path);
        }
    }

    WalkDir::new(output_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .find(|e| e.file_type().is_file() && e.file_name().to_str() == Some(file_name))
        .map(|e| e.into_path())
}

/// Delete a downloaded archive, its folder when that becomes empty, and its
/// cache entry
pub fn delete_downloaded_file(
    cache: &mut DownloadCache,
    output_dir: &Path,
    file_name: &str,
) -> Result<Option<PathBuf>> {
    let Some(record) = cache.get(file_name).cloned() else {
        bail!("'{}' is not in the download cache", file_name);
    };

    let located = locate_download(output_dir, file_name, &record);
    match &located {
        Some(path) => {
            std::fs::remove_file(path)
                .with_context(|| format!("Failed to delete {}", path.display()))?;
            tracing::info!("Deleted file: {}", path.display());

            if let Some(dir) = path.parent() {
                let empty = std::fs::read_dir(dir)
                    .map(|mut entries| entries.next().is_none())
                    .unwrap_or(false);
                if empty {
                    std::fs::remove_dir(dir)
                        .with_context(|| format!("Failed to remove {}", dir.display()))?;
                    tracing::info!("Deleted empty directory: {}", dir.display());
                }
            }
        }
        None => tracing::warn!("File not found on disk: {}", file_name),
    }

    cache.remove(file_name);
    cache.save_logged();
    Ok(located)
}
