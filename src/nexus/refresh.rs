//! Concurrent catalog refreshes: tracked mods and update checks

use super::{latest_upload, Catalog, ModDetails};
use crate::downloads::naming::format_timestamp;
use crate::downloads::DownloadCache;
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Parallel requests used by refreshes unless configured otherwise
pub const DEFAULT_MAX_CONCURRENT: usize = 10;

/// Fetch the user's tracked mods and their details.
///
/// Mods whose details are unavailable get a placeholder entry; entries
/// without an id are skipped. Results are sorted by name.
pub async fn refresh_tracked_mods(
    catalog: Arc<dyn Catalog>,
    game: &str,
    max_concurrent: usize,
) -> Result<Vec<ModDetails>> {
    let tracked = catalog.fetch_tracked_mods().await?;
    tracing::info!("Fetching details for {} tracked mods", tracked.len());

    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let mut handles = Vec::new();

    for entry in tracked {
        let Some(mod_id) = entry.mod_id.filter(|id| *id > 0) else {
            tracing::warn!("Skipping mod with no ID.");
            continue;
        };
        let semaphore = Arc::clone(&semaphore);
        let catalog = Arc::clone(&catalog);
        let game = game.to_string();

        handles.push(tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire().await else {
                return ModDetails::placeholder(mod_id);
            };
            let details = catalog
                .fetch_mod_details(&game, mod_id)
                .await
                .unwrap_or_else(|| ModDetails::placeholder(mod_id));
            tracing::info!("Fetched data for mod ID {}.", mod_id);
            details
        }));
    }

    let mut mods = Vec::new();
    for handle in handles {
        match handle.await {
            Ok(details) => mods.push(details),
            Err(e) => tracing::error!("Tracked mod task failed: {}", e),
        }
    }

    mods.sort_by_key(|m| m.name.to_lowercase());
    tracing::info!("Finished fetching tracked mods.");
    Ok(mods)
}

/// Refresh `latest_uploaded_timestamp` of every cached download.
///
/// Saves the cache once at the end and returns how many entries changed.
pub async fn check_for_updates(
    catalog: Arc<dyn Catalog>,
    cache: &mut DownloadCache,
    game: &str,
    max_concurrent: usize,
) -> usize {
    tracing::info!("Starting to check for updates to mods in the cache.");
    let total = cache.len();

    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let mut handles = Vec::new();

    for (file_name, record) in cache.files() {
        if record.mod_id <= 0 {
            tracing::warn!("Mod ID missing for file {}. Skipping update.", file_name);
            continue;
        }
        let semaphore = Arc::clone(&semaphore);
        let catalog = Arc::clone(&catalog);
        let game = game.to_string();
        let file_name = file_name.to_string();
        let mod_id = record.mod_id;
        let mod_name = record.mod_name.clone();

        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire().await.ok()?;
            let files = catalog.fetch_mod_files(&game, mod_id).await;
            match latest_upload(&files) {
                Some(latest) => Some((file_name, format_timestamp(latest))),
                None => {
                    tracing::warn!(
                        "Could not determine latest uploaded timestamp for {} (ID: {}).",
                        mod_name,
                        mod_id
                    );
                    None
                }
            }
        }));
    }

    let mut updated = 0;
    for handle in handles {
        let result = match handle.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("Update check task failed: {}", e);
                continue;
            }
        };
        let Some((file_name, latest)) = result else {
            continue;
        };
        if let Some(record) = cache.get_mut(&file_name) {
            if record.latest_uploaded_timestamp != latest {
                tracing::info!(
                    "Found an update for {}: Current file date: {} -> Updated to: {}.",
                    file_name,
                    record.latest_uploaded_timestamp,
                    latest
                );
                record.latest_uploaded_timestamp = latest;
                updated += 1;
            }
        }
    }

    cache.save_logged();
    tracing::info!(
        "Completed update check. {} out of {} mods were updated in the cache.",
        updated,
        total
    );
    updated
}

/// Load the tracked-mods cache written by the last refresh
pub fn load_tracked_mods(path: &Path) -> Result<Vec<ModDetails>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn save_tracked_mods(path: &Path, mods: &[ModDetails]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create cache directory")?;
    }
    let content = serde_json::to_string_pretty(mods).context("Failed to serialize tracked mods")?;
    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    tracing::info!("Saved tracked mods to cache.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nexus::{ModFile, ProgressCallback, TrackedMod};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeCatalog {
        details: HashMap<i64, ModDetails>,
        uploads: HashMap<i64, i64>,
        tracked: Vec<TrackedMod>,
    }

    #[async_trait]
    impl Catalog for FakeCatalog {
        async fn fetch_mod_files(&self, _game: &str, mod_id: i64) -> Vec<ModFile> {
            self.uploads
                .get(&mod_id)
                .map(|ts| {
                    vec![ModFile {
                        id: 1,
                        name: "main".to_string(),
                        size_kb: 1,
                        uploaded_timestamp: Some(*ts),
                        description: None,
                        category_name: None,
                        version: None,
                    }]
                })
                .unwrap_or_default()
        }

        async fn fetch_mod_details(&self, _game: &str, mod_id: i64) -> Option<ModDetails> {
            self.details.get(&mod_id).cloned()
        }

        async fn resolve_download_link(&self, _: &str, _: i64, _: i64) -> Option<String> {
            None
        }

        async fn download_to_path(
            &self,
            _url: &str,
            _dest: &Path,
            _progress: Option<ProgressCallback>,
        ) -> Result<()> {
            Ok(())
        }

        async fn fetch_tracked_mods(&self) -> Result<Vec<TrackedMod>> {
            Ok(self.tracked.clone())
        }
    }

    fn tracked(id: Option<i64>) -> TrackedMod {
        TrackedMod {
            mod_id: id,
            domain_name: Some("cyberpunk2077".to_string()),
        }
    }

    #[tokio::test]
    async fn tracked_mods_fall_back_to_placeholder() {
        let mut catalog = FakeCatalog::default();
        catalog.details.insert(
            1,
            ModDetails {
                name: "Alpha".to_string(),
                category: "Gameplay".to_string(),
                ..ModDetails::placeholder(1)
            },
        );
        catalog.tracked = vec![tracked(Some(1)), tracked(Some(2)), tracked(None)];

        let mods = refresh_tracked_mods(Arc::new(catalog), "cyberpunk2077", 2)
            .await
            .unwrap();
        assert_eq!(mods.len(), 2);
        assert_eq!(mods[0].name, "Alpha");
        assert_eq!(mods[1], ModDetails::placeholder(2));
        assert_eq!(mods[1].category, "Uncategorized");
    }

    #[tokio::test]
    async fn update_check_counts_changed_entries() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("downloaded_files.json");
        let mut cache = DownloadCache::load(&path).unwrap();
        cache.record_download("a_20240101_120000.zip", "A", 1, 1, None, &[]);
        cache.record_download("b_20240101_120000.zip", "B", 2, 1, None, &[]);
        cache.record_download("c_20240101_120000.zip", "C", 0, 1, None, &[]);

        let mut catalog = FakeCatalog::default();
        // 2024-02-01 00:00:00 UTC
        catalog.uploads.insert(1, 1_706_745_600);

        let updated =
            check_for_updates(Arc::new(catalog), &mut cache, "cyberpunk2077", DEFAULT_MAX_CONCURRENT)
                .await;
        assert_eq!(updated, 1);
        assert_eq!(
            cache.get("a_20240101_120000.zip").unwrap().latest_uploaded_timestamp,
            "2024-02-01 00:00:00"
        );
        assert!(path.exists());

        let reloaded = DownloadCache::load(&path).unwrap();
        assert_eq!(
            reloaded.get("a_20240101_120000.zip").unwrap().latest_uploaded_timestamp,
            "2024-02-01 00:00:00"
        );
    }

    #[test]
    fn tracked_cache_round_trips() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cache/cached_tracked_mods.json");
        assert!(load_tracked_mods(&path).unwrap().is_empty());

        save_tracked_mods(&path, &[ModDetails::placeholder(7)]).unwrap();
        assert_eq!(load_tracked_mods(&path).unwrap(), vec![ModDetails::placeholder(7)]);
    }
}
