//! Layout resolution: deciding where the contents of a staging tree belong

use super::error::{InstallError, InstallResult, IoPathExt};
use crate::config::InstallLayout;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// How a staged archive maps onto the game directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Nothing was extracted
    Empty,

    /// Every extracted file is an `.archive` payload. Files are relative to
    /// the staging root and are moved flat into the archive folder.
    ArchiveOnly { files: Vec<PathBuf> },

    /// Recognized mod folders found under `root` (relative to the staging
    /// root). `folders` keeps on-disk spelling; `skipped` lists unrecognized
    /// siblings that will not be installed.
    ModFolders {
        root: PathBuf,
        folders: Vec<String>,
        skipped: Vec<String>,
    },

    /// No recognized folder anywhere on the wrapper chain. The whole staging
    /// tree is merged into the game directory.
    Unrecognized,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Empty => "empty",
            Disposition::ArchiveOnly { .. } => "archive-only",
            Disposition::ModFolders { .. } => "mod-folders",
            Disposition::Unrecognized => "unrecognized",
        }
    }
}

impl std::fmt::Display for Disposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify the contents of `staging_root`.
///
/// Wrapper directories (a single unrecognized sub-directory) are descended
/// through until a level containing a recognized folder is found. When a
/// level has several unrecognized directories, the alphabetically first one
/// is checked for recognized children before giving up.
pub fn resolve_layout(staging_root: &Path, layout: &InstallLayout) -> InstallResult<Disposition> {
    let has_entries = std::fs::read_dir(staging_root)
        .at(staging_root)?
        .next()
        .is_some();
    if !has_entries {
        tracing::warn!("No valid root folders found in the archive. Skipping extraction.");
        return Ok(Disposition::Empty);
    }

    let files = list_files(staging_root)?;
    if !files.is_empty() && files.iter().all(|f| layout.is_archive_payload(f)) {
        tracing::info!(
            "Only .{} files found in the extracted data ({} files)",
            layout.archive_extension(),
            files.len()
        );
        return Ok(Disposition::ArchiveOnly { files });
    }

    let mut root = PathBuf::new();
    let mut subdirs = subdirectories(&staging_root.join(&root))?;
    while subdirs.len() == 1 && layout.recognized_folder(&subdirs[0]).is_none() {
        tracing::debug!("Descending into wrapper folder '{}'", subdirs[0]);
        root.push(&subdirs[0]);
        subdirs = subdirectories(&staging_root.join(&root))?;
    }

    let (folders, skipped) = partition_recognized(subdirs.clone(), layout);
    if !folders.is_empty() {
        tracing::info!("Valid root folders found: {:?}", folders);
        return Ok(Disposition::ModFolders {
            root,
            folders,
            skipped,
        });
    }

    // Several candidate wrappers: only the first one in sort order is tried.
    if let Some(first) = subdirs.first() {
        let candidate = root.join(first);
        let children = subdirectories(&staging_root.join(&candidate))?;
        let (folders, skipped) = partition_recognized(children, layout);
        if !folders.is_empty() {
            if subdirs.len() > 1 {
                tracing::warn!(
                    "Multiple candidate root folders {:?}; using '{}'",
                    subdirs,
                    first
                );
            }
            return Ok(Disposition::ModFolders {
                root: candidate,
                folders,
                skipped,
            });
        }
    }

    tracing::warn!("No recognized mod folders found; installing the whole archive tree");
    Ok(Disposition::Unrecognized)
}

/// All regular files under `root`, relative to it, in sorted order
pub fn list_files(root: &Path) -> InstallResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|source| InstallError::Walk {
            path: root.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_file() {
            if let Ok(relative) = entry.path().strip_prefix(root) {
                files.push(relative.to_path_buf());
            }
        }
    }
    Ok(files)
}

/// Names of the immediate sub-directories of `dir`, sorted
fn subdirectories(dir: &Path) -> InstallResult<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir).at(dir)? {
        let entry = entry.at(dir)?;
        if entry.file_type().at(&entry.path())?.is_dir() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    names.sort();
    Ok(names)
}

fn partition_recognized(names: Vec<String>, layout: &InstallLayout) -> (Vec<String>, Vec<String>) {
    names
        .into_iter()
        .partition(|name| layout.recognized_folder(name).is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LayoutConfig;
    use crate::test_utils::touch;
    use tempfile::TempDir;

    fn layout() -> InstallLayout {
        InstallLayout::new("/games/cp2077", &LayoutConfig::default())
    }

    #[test]
    fn empty_staging_is_empty() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(resolve_layout(tmp.path(), &layout()).unwrap(), Disposition::Empty);
    }

    #[test]
    fn archive_only_files_are_collected_recursively() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("skin.archive"), "a");
        touch(&tmp.path().join("Variants/Red/skin_red.ARCHIVE"), "b");

        let disposition = resolve_layout(tmp.path(), &layout()).unwrap();
        assert_eq!(
            disposition,
            Disposition::ArchiveOnly {
                files: vec![
                    PathBuf::from("Variants/Red/skin_red.ARCHIVE"),
                    PathBuf::from("skin.archive"),
                ]
            }
        );
    }

    #[test]
    fn recognized_folders_at_top_level_skip_extras() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("r6/scripts/mod.reds"), "x");
        touch(&tmp.path().join("Archive/pc/mod/skin.archive"), "x");
        touch(&tmp.path().join("docs/readme.txt"), "x");

        let disposition = resolve_layout(tmp.path(), &layout()).unwrap();
        assert_eq!(
            disposition,
            Disposition::ModFolders {
                root: PathBuf::new(),
                folders: vec!["Archive".to_string(), "r6".to_string()],
                skipped: vec!["docs".to_string()],
            }
        );
    }

    #[test]
    fn wrapper_folders_are_descended() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("MyMod/v1.2/bin/x64/plugin.dll"), "x");
        touch(&tmp.path().join("MyMod/readme.txt"), "x");

        let disposition = resolve_layout(tmp.path(), &layout()).unwrap();
        assert_eq!(
            disposition,
            Disposition::ModFolders {
                root: PathBuf::from("MyMod/v1.2"),
                folders: vec!["bin".to_string()],
                skipped: vec![],
            }
        );
    }

    #[test]
    fn ambiguous_wrappers_use_alphabetically_first() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("Option B/r6/scripts/b.reds"), "x");
        touch(&tmp.path().join("Option A/red4ext/plugins/a.dll"), "x");

        let disposition = resolve_layout(tmp.path(), &layout()).unwrap();
        assert_eq!(
            disposition,
            Disposition::ModFolders {
                root: PathBuf::from("Option A"),
                folders: vec!["red4ext".to_string()],
                skipped: vec![],
            }
        );
    }

    #[test]
    fn loose_files_without_folders_are_unrecognized() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("readme.txt"), "x");
        touch(&tmp.path().join("plugin.dll"), "x");

        assert_eq!(
            resolve_layout(tmp.path(), &layout()).unwrap(),
            Disposition::Unrecognized
        );
    }

    #[test]
    fn unrecognized_chain_falls_through() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("Stuff/Deeper/file.txt"), "x");

        assert_eq!(
            resolve_layout(tmp.path(), &layout()).unwrap(),
            Disposition::Unrecognized
        );
    }
}
