//! Download cache: metadata about every downloaded archive

use super::naming::{
    base_identity, format_timestamp, parse_file_timestamp, CACHE_TIMESTAMP_FORMAT,
    UNKNOWN_TIMESTAMP,
};
use crate::nexus::{latest_upload, ModFile};
use anyhow::{Context, Result};
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Cached metadata for one downloaded file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadedFileRecord {
    pub mod_name: String,
    #[serde(default)]
    pub mod_id: i64,
    /// Size on disk in bytes
    #[serde(default)]
    pub file_size: u64,
    #[serde(default = "unknown")]
    pub latest_downloaded_timestamp: String,
    #[serde(default = "unknown")]
    pub latest_uploaded_timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

fn unknown() -> String {
    UNKNOWN_TIMESTAMP.to_string()
}

impl DownloadedFileRecord {
    /// Whether the download matches the newest upload
    pub fn is_up_to_date(&self) -> bool {
        self.latest_downloaded_timestamp == self.latest_uploaded_timestamp
    }

    pub fn size_mb(&self) -> f64 {
        self.file_size as f64 / (1024.0 * 1024.0)
    }
}

/// Download state of a mod across all of its cached files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModStatus {
    NotDownloaded,
    UpToDate,
    UpdateAvailable,
}

impl std::fmt::Display for ModStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ModStatus::NotDownloaded => "Not Downloaded",
            ModStatus::UpToDate => "Up-to-date",
            ModStatus::UpdateAvailable => "Update Available",
        })
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheDocument {
    #[serde(default)]
    files: BTreeMap<String, DownloadedFileRecord>,
}

/// Persistent download cache keyed by downloaded file name
#[derive(Debug)]
pub struct DownloadCache {
    path: PathBuf,
    doc: CacheDocument,
}

impl DownloadCache {
    /// Load the cache, starting empty if the document is missing
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let doc = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            if content.trim().is_empty() {
                CacheDocument::default()
            } else {
                serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse {}", path.display()))?
            }
        } else {
            CacheDocument::default()
        };
        Ok(Self { path, doc })
    }

    /// Write the whole cache back to disk
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create data directory")?;
        }
        let content =
            serde_json::to_string_pretty(&self.doc).context("Failed to serialize download cache")?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }

    /// Save, logging instead of failing
    pub fn save_logged(&self) {
        if let Err(e) = self.save() {
            tracing::error!("Failed to save download cache: {:#}", e);
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, file_name: &str) -> Option<&DownloadedFileRecord> {
        self.doc.files.get(file_name)
    }

    pub fn get_mut(&mut self, file_name: &str) -> Option<&mut DownloadedFileRecord> {
        self.doc.files.get_mut(file_name)
    }

    pub fn files(&self) -> impl Iterator<Item = (&str, &DownloadedFileRecord)> {
        self.doc.files.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.doc.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc.files.is_empty()
    }

    pub fn remove(&mut self, file_name: &str) -> Option<DownloadedFileRecord> {
        self.doc.files.remove(file_name)
    }

    /// Record a finished download.
    ///
    /// Earlier downloads of the same file (same base identity) are replaced.
    /// Returns whether the download is already older than the newest upload
    /// among `mod_files`.
    pub fn record_download(
        &mut self,
        file_name: &str,
        mod_name: &str,
        mod_id: i64,
        file_size: u64,
        category: Option<&str>,
        mod_files: &[ModFile],
    ) -> bool {
        tracing::info!("Processing metadata update for file: {}", file_name);
        let identity = base_identity(file_name);
        self.doc
            .files
            .retain(|key, _| base_identity(key) != identity);

        let parsed = parse_file_timestamp(file_name);
        let latest = latest_upload(mod_files);
        let outdated = match (parsed, latest.and_then(|ts| DateTime::from_timestamp(ts, 0))) {
            (Some(downloaded), Some(uploaded)) => downloaded < uploaded.naive_utc(),
            _ => false,
        };

        self.doc.files.insert(
            file_name.to_string(),
            DownloadedFileRecord {
                mod_name: mod_name.to_string(),
                mod_id,
                file_size,
                latest_downloaded_timestamp: parsed
                    .map(|t| t.format(CACHE_TIMESTAMP_FORMAT).to_string())
                    .unwrap_or_else(unknown),
                latest_uploaded_timestamp: latest.map(format_timestamp).unwrap_or_else(unknown),
                category: category.map(str::to_string),
            },
        );
        tracing::info!("Updated metadata entry for file: {}", identity);
        outdated
    }

    /// Status of a mod judged across every cached file with its name
    pub fn mod_status(&self, mod_name: &str) -> ModStatus {
        let mut files = self
            .doc
            .files
            .values()
            .filter(|r| r.mod_name == mod_name)
            .peekable();
        if files.peek().is_none() {
            return ModStatus::NotDownloaded;
        }
        if files.any(DownloadedFileRecord::is_up_to_date) {
            ModStatus::UpToDate
        } else {
            ModStatus::UpdateAvailable
        }
    }
}
