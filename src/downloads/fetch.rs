//! Downloading selected mod files into the output directory

use super::cache::DownloadCache;
use super::naming::{download_dir_name, download_file_name, safe_path_component};
use crate::nexus::{Catalog, ProgressCallback, UNCATEGORIZED};
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

/// One file fetched by [`download_selected_files`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedArchive {
    pub file_id: i64,
    pub file_name: String,
    pub path: PathBuf,
    pub size: u64,
    /// A newer upload already exists
    pub outdated: bool,
}

/// Download `file_ids` of a mod to
/// `<output>/<category>/<mod>/<file>/<file>_<timestamp>.zip`, recording each
/// in the download cache.
///
/// Stops at the first file that cannot be downloaded.
pub async fn download_selected_files(
    catalog: &dyn Catalog,
    cache: &mut DownloadCache,
    game: &str,
    mod_id: i64,
    file_ids: &[i64],
    output_dir: &Path,
    progress: Option<ProgressCallback>,
) -> Result<Vec<DownloadedArchive>> {
    tracing::info!("Downloading files for mod ID: {}, file IDs: {:?}", mod_id, file_ids);

    let Some(details) = catalog.fetch_mod_details(game, mod_id).await else {
        bail!("Mod details could not be retrieved for ID {}", mod_id);
    };
    let category = if details.category.trim().is_empty() {
        UNCATEGORIZED.to_string()
    } else {
        details.category.trim().to_string()
    };

    let files = catalog.fetch_mod_files(game, mod_id).await;
    if files.is_empty() {
        bail!("No files found for mod ID {}", mod_id);
    }

    let mod_base_dir = output_dir
        .join(safe_path_component(&category))
        .join(safe_path_component(&details.name));
    tokio::fs::create_dir_all(&mod_base_dir)
        .await
        .with_context(|| format!("Failed to create {}", mod_base_dir.display()))?;

    let mut downloaded = Vec::new();
    for &file_id in file_ids {
        let Some(file) = files.iter().find(|f| f.id == file_id) else {
            bail!("Details for file ID {} could not be retrieved", file_id);
        };

        let file_name = download_file_name(&file.name, file.uploaded_timestamp);
        let file_dir = mod_base_dir.join(download_dir_name(&file_name));
        tokio::fs::create_dir_all(&file_dir)
            .await
            .with_context(|| format!("Failed to create {}", file_dir.display()))?;
        clean_directory(&file_dir).await;

        let Some(url) = catalog.resolve_download_link(game, mod_id, file_id).await else {
            bail!(
                "Download link unavailable for '{}'. Direct downloads through the API require a Nexus Mods Premium account.",
                file.name
            );
        };

        let path = file_dir.join(&file_name);
        tracing::info!("Downloading file: {}", file_name);
        catalog
            .download_to_path(&url, &path, progress.clone())
            .await
            .with_context(|| format!("Download failed for file {}", file_name))?;

        let size = tokio::fs::metadata(&path).await.map(|m| m.len()).unwrap_or(0);
        let outdated = cache.record_download(
            &file_name,
            &details.name,
            mod_id,
            size,
            Some(category.as_str()),
            &files,
        );
        cache.save_logged();
        tracing::info!(
            "File status: {}",
            if outdated { "Outdated" } else { "Up-to-date" }
        );

        downloaded.push(DownloadedArchive {
            file_id,
            file_name,
            path,
            size,
            outdated,
        });
    }

    tracing::info!("Download completed successfully.");
    Ok(downloaded)
}

/// Remove previously downloaded files so the directory only holds the
/// latest version
async fn clean_directory(dir: &Path) {
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        match tokio::fs::remove_file(&path).await {
            Ok(()) => tracing::info!("Removed old file: {}", path.display()),
            Err(e) => tracing::error!("Error deleting file '{}': {}", path.display(), e),
        }
    }
}
