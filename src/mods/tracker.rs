//! Before/after snapshots of the install target

use super::archive::STAGING_PREFIX;
use crate::config::InstallLayout;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Set of files present under the tracked roots at one point in time
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    files: BTreeSet<PathBuf>,
}

impl Snapshot {
    /// Record every file under the layout's tracked roots, excluding mod
    /// containers and staging directories
    pub fn capture(layout: &InstallLayout) -> Self {
        let mut files = BTreeSet::new();
        for root in layout.tracked_roots() {
            if !root.exists() {
                continue;
            }
            let entries = WalkDir::new(&root)
                .into_iter()
                .filter_entry(|e| !is_staging_dir(e))
                .filter_map(|e| e.ok());
            for entry in entries {
                if entry.file_type().is_file() && !layout.is_container(entry.path()) {
                    files.insert(entry.into_path());
                }
            }
        }
        tracing::debug!("Snapshot captured {} files", files.len());
        Self { files }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.contains(path)
    }

    /// Files present in `after` but not in `self`, sorted
    pub fn new_files(&self, after: &Snapshot) -> Vec<PathBuf> {
        after.files.difference(&self.files).cloned().collect()
    }
}

fn is_staging_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(STAGING_PREFIX))
}
