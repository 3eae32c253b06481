//! Installed-file ledger: which files each archive installed

use super::error::{InstallResult, IoPathExt};
use crate::downloads::naming::base_identity;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Ledger entry for one installed archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    #[serde(rename = "mod_name")]
    pub display_name: String,

    /// Upload/download time of the source archive, if known
    #[serde(rename = "author_upload", default)]
    pub source_timestamp: Option<String>,

    /// Absolute paths of the files this archive installed
    #[serde(default)]
    pub extracted_files: Vec<PathBuf>,
}

/// Persistent map of archive key to [`ArchiveRecord`].
///
/// Stored as a single JSON document that is rewritten in full on every save.
#[derive(Debug, Default)]
pub struct Ledger {
    path: PathBuf,
    entries: BTreeMap<String, ArchiveRecord>,
}

impl Ledger {
    /// Empty ledger that will be saved to `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Load the ledger, starting empty when the document does not exist
    pub fn load(path: impl Into<PathBuf>) -> InstallResult<Self> {
        let path = path.into();
        if !path.exists() {
            tracing::debug!("No ledger at {}, starting empty", path.display());
            return Ok(Self::new(path));
        }

        let content = std::fs::read_to_string(&path).at(&path)?;
        let entries = if content.trim().is_empty() {
            BTreeMap::new()
        } else {
            serde_json::from_str(&content)?
        };
        Ok(Self { path, entries })
    }

    /// Write the whole ledger back to disk
    pub fn save(&self) -> InstallResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).at(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.entries)?;
        std::fs::write(&self.path, content).at(&self.path)?;
        tracing::debug!("Saved ledger with {} entries", self.entries.len());
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&ArchiveRecord> {
        self.entries.get(key)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &ArchiveRecord)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Insert or replace the entry for `key`, returning the previous one
    pub fn record(&mut self, key: impl Into<String>, record: ArchiveRecord) -> Option<ArchiveRecord> {
        self.entries.insert(key.into(), record)
    }

    pub fn remove(&mut self, key: &str) -> Option<ArchiveRecord> {
        self.entries.remove(key)
    }

    /// Find the key tracking `file_name`, ignoring the extension and the
    /// `_YYYYMMDD_HHMMSS` download suffix. An exact key match wins.
    pub fn find_by_loose_name(&self, file_name: &str) -> Option<&str> {
        if let Some((key, _)) = self.entries.get_key_value(file_name) {
            return Some(key.as_str());
        }
        let wanted = base_identity(file_name);
        self.entries
            .keys()
            .find(|key| base_identity(key) == wanted)
            .map(String::as_str)
    }

    /// Other entries that also list `path`
    pub fn other_owners(&self, key: &str, path: &Path) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(k, record)| k.as_str() != key && record.extracted_files.iter().any(|p| p == path))
            .map(|(k, _)| k.as_str())
            .collect()
    }

    /// Basenames of every ledgered file ending in `suffix` (ASCII case
    /// ignored), deduplicated and sorted case-insensitively
    pub fn list_archive_outputs(&self, suffix: &str) -> Vec<String> {
        let suffix = suffix.to_ascii_lowercase();
        let names: BTreeSet<String> = self
            .entries
            .values()
            .flat_map(|record| record.extracted_files.iter())
            .filter_map(|path| path.file_name())
            .map(|name| name.to_string_lossy().to_string())
            .filter(|name| name.to_ascii_lowercase().ends_with(&suffix))
            .collect();

        let mut names: Vec<String> = names.into_iter().collect();
        names.sort_by_key(|name| name.to_lowercase());
        names
    }

    /// Point every ledgered file named `old_name` at `new_path`, returning
    /// how many paths changed
    pub fn rename_output(&mut self, old_name: &str, new_path: &Path) -> usize {
        let mut changed = 0;
        for record in self.entries.values_mut() {
            for path in record.extracted_files.iter_mut() {
                if path.file_name().is_some_and(|name| name == old_name) {
                    *path = new_path.to_path_buf();
                    changed += 1;
                }
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(name: &str, files: &[&str]) -> ArchiveRecord {
        ArchiveRecord {
            display_name: name.to_string(),
            source_timestamp: Some("2024-01-01 12:00:00".to_string()),
            extracted_files: files.iter().map(PathBuf::from).collect(),
        }
    }

    #[test]
    fn save_and_load_preserves_entries() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("data/installed_files.json");

        let mut ledger = Ledger::new(&path);
        ledger.record("mod_20240101_120000.zip", record("mod", &["/g/r6/a.reds"]));
        ledger.save().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"mod_name\": \"mod\""));
        assert!(content.contains("\"author_upload\""));

        let loaded = Ledger::load(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(
            loaded.get("mod_20240101_120000.zip"),
            Some(&record("mod", &["/g/r6/a.reds"]))
        );
    }

    #[test]
    fn missing_or_blank_document_is_empty() {
        let tmp = TempDir::new().unwrap();
        assert!(Ledger::load(tmp.path().join("none.json")).unwrap().is_empty());

        let blank = tmp.path().join("blank.json");
        std::fs::write(&blank, "  ").unwrap();
        assert!(Ledger::load(&blank).unwrap().is_empty());
    }

    #[test]
    fn loose_lookup_ignores_extension_and_timestamp() {
        let mut ledger = Ledger::new("unused.json");
        ledger.record("mod_20240101_120000.zip", record("mod", &[]));

        assert_eq!(
            ledger.find_by_loose_name("mod_20240101_120000.rar"),
            Some("mod_20240101_120000.zip")
        );
        assert_eq!(
            ledger.find_by_loose_name("mod_20250202_080000.zip"),
            Some("mod_20240101_120000.zip")
        );
        assert_eq!(ledger.find_by_loose_name("other.zip"), None);
    }

    #[test]
    fn archive_outputs_are_deduplicated_and_sorted() {
        let mut ledger = Ledger::new("unused.json");
        ledger.record(
            "a.zip",
            record("a", &["/g/archive/pc/mod/zeta.archive", "/g/r6/x.reds"]),
        );
        ledger.record(
            "b.zip",
            record("b", &["/g/archive/pc/mod/Alpha.ARCHIVE", "/g/archive/pc/mod/zeta.archive"]),
        );

        assert_eq!(
            ledger.list_archive_outputs(".archive"),
            vec!["Alpha.ARCHIVE".to_string(), "zeta.archive".to_string()]
        );
    }

    #[test]
    fn rename_output_rewrites_matching_paths() {
        let mut ledger = Ledger::new("unused.json");
        ledger.record("a.zip", record("a", &["/g/archive/pc/mod/old.archive"]));

        let changed = ledger.rename_output("old.archive", Path::new("/g/archive/pc/mod/new.archive"));
        assert_eq!(changed, 1);
        assert_eq!(
            ledger.get("a.zip").unwrap().extracted_files,
            vec![PathBuf::from("/g/archive/pc/mod/new.archive")]
        );
    }

    #[test]
    fn other_owners_finds_shared_paths() {
        let mut ledger = Ledger::new("unused.json");
        ledger.record("a.zip", record("a", &["/g/shared.txt"]));
        ledger.record("b.zip", record("b", &["/g/shared.txt", "/g/b.txt"]));

        assert_eq!(ledger.other_owners("a.zip", Path::new("/g/shared.txt")), vec!["b.zip"]);
        assert!(ledger.other_owners("b.zip", Path::new("/g/b.txt")).is_empty());
    }
}
