//! Moving staged content into the game directory

use super::error::{InstallError, InstallResult, IoPathExt};
use super::layout::Disposition;
use crate::config::InstallLayout;
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// Apply a resolved disposition, returning the number of files moved
pub fn relocate(
    disposition: &Disposition,
    staging_root: &Path,
    layout: &InstallLayout,
) -> InstallResult<usize> {
    match disposition {
        Disposition::Empty => Ok(0),
        Disposition::ArchiveOnly { files } => {
            relocate_flat(staging_root, files, layout.archive_folder())
        }
        Disposition::ModFolders {
            root,
            folders,
            skipped,
        } => {
            for name in skipped {
                tracing::info!("Skipping non-mod folder '{}'", name);
            }
            relocate_folders(&staging_root.join(root), folders, layout)
        }
        Disposition::Unrecognized => {
            tracing::warn!(
                "Merging unrecognized archive contents into {}",
                layout.game_dir().display()
            );
            merge_tree(staging_root, layout.game_dir())
        }
    }
}

/// Move each recognized folder under `source_root` to its canonical name in
/// the game directory, merging with what is already there
pub fn relocate_folders(
    source_root: &Path,
    folders: &[String],
    layout: &InstallLayout,
) -> InstallResult<usize> {
    let mut moved = 0;
    for folder in folders {
        let Some(canonical) = layout.recognized_folder(folder) else {
            tracing::info!("Skipping non-mod folder '{}'", folder);
            continue;
        };
        let src = source_root.join(folder);
        let dest = layout.game_dir().join(canonical);
        tracing::info!("Installing folder {} to {}", src.display(), dest.display());

        moved += merge_tree(&src, &dest)?;
        fs::remove_dir_all(&src).at(&src)?;
    }
    Ok(moved)
}

/// Move `files` (relative to `staging_root`) into `dest_dir` by basename.
/// A later file with the same basename overwrites an earlier one.
pub fn relocate_flat(
    staging_root: &Path,
    files: &[std::path::PathBuf],
    dest_dir: &Path,
) -> InstallResult<usize> {
    fs::create_dir_all(dest_dir).at(dest_dir)?;
    let mut moved = 0;
    for relative in files {
        let Some(name) = relative.file_name() else {
            continue;
        };
        let dest = dest_dir.join(name);
        tracing::info!("Moving {} to {}", relative.display(), dest.display());
        if move_file(&staging_root.join(relative), &dest)? {
            moved += 1;
        }
    }
    Ok(moved)
}

/// Merge the contents of `src` into `dest`, replacing files that already
/// exist at the same relative path
pub fn merge_tree(src: &Path, dest: &Path) -> InstallResult<usize> {
    fs::create_dir_all(dest).at(dest)?;
    let mut moved = 0;

    for entry in WalkDir::new(src).min_depth(1) {
        let entry = entry.map_err(|source| InstallError::Walk {
            path: src.to_path_buf(),
            source,
        })?;
        let Ok(relative) = entry.path().strip_prefix(src) else {
            continue;
        };
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).at(&target)?;
        } else if entry.file_type().is_file() {
            if move_file(entry.path(), &target)? {
                moved += 1;
            }
        } else {
            tracing::debug!("Skipping special file {}", entry.path().display());
        }
    }

    Ok(moved)
}

/// Move one file, overwriting the destination. Falls back to copy + remove
/// when a rename is not possible (e.g. across filesystems).
///
/// Returns `false` when a directory occupies the destination and the file
/// was left in place.
fn move_file(from: &Path, to: &Path) -> InstallResult<bool> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).at(parent)?;
    }

    match fs::symlink_metadata(to) {
        Ok(meta) if meta.is_dir() => {
            tracing::warn!(
                "Cannot replace directory {} with a file; skipping {}",
                to.display(),
                from.display()
            );
            return Ok(false);
        }
        Ok(_) => {
            tracing::debug!("Overwriting {}", to.display());
            fs::remove_file(to).at(to)?;
        }
        Err(_) => {}
    }

    if fs::rename(from, to).is_err() {
        fs::copy(from, to).at(to)?;
        fs::remove_file(from).at(from)?;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LayoutConfig;
    use crate::test_utils::touch;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn setup() -> (TempDir, PathBuf, InstallLayout) {
        let tmp = TempDir::new().unwrap();
        let staging = tmp.path().join("staging");
        let game = tmp.path().join("game");
        fs::create_dir_all(&staging).unwrap();
        fs::create_dir_all(&game).unwrap();
        let layout = InstallLayout::new(&game, &LayoutConfig::default());
        (tmp, staging, layout)
    }

    #[test]
    fn folders_merge_into_canonical_names() {
        let (_tmp, staging, layout) = setup();
        touch(&staging.join("wrap/R6/scripts/new.reds"), "new");
        touch(&layout.game_dir().join("r6/scripts/existing.reds"), "old");

        let moved = relocate_folders(&staging.join("wrap"), &["R6".to_string()], &layout).unwrap();
        assert_eq!(moved, 1);
        assert!(layout.game_dir().join("r6/scripts/new.reds").is_file());
        assert!(layout.game_dir().join("r6/scripts/existing.reds").is_file());
        assert!(!staging.join("wrap/R6").exists());
    }

    #[test]
    fn existing_files_are_overwritten() {
        let (_tmp, staging, layout) = setup();
        touch(&staging.join("bin/x64/plugin.dll"), "v2");
        touch(&layout.game_dir().join("bin/x64/plugin.dll"), "v1");

        relocate_folders(&staging, &["bin".to_string()], &layout).unwrap();
        assert_eq!(
            fs::read_to_string(layout.game_dir().join("bin/x64/plugin.dll")).unwrap(),
            "v2"
        );
    }

    #[test]
    fn flat_relocation_uses_basenames() {
        let (_tmp, staging, layout) = setup();
        touch(&staging.join("a/skin.archive"), "first");
        touch(&staging.join("b/skin.archive"), "second");
        touch(&staging.join("other.archive"), "x");

        let files = vec![
            PathBuf::from("a/skin.archive"),
            PathBuf::from("b/skin.archive"),
            PathBuf::from("other.archive"),
        ];
        let moved = relocate_flat(&staging, &files, layout.archive_folder()).unwrap();
        assert_eq!(moved, 3);
        assert_eq!(
            fs::read_to_string(layout.archive_folder().join("skin.archive")).unwrap(),
            "second"
        );
        assert!(layout.archive_folder().join("other.archive").is_file());
    }

    #[test]
    fn unrecognized_merges_whole_tree() {
        let (_tmp, staging, layout) = setup();
        touch(&staging.join("readme.txt"), "x");
        touch(&staging.join("Extras/tool.exe"), "x");

        let moved = relocate(&Disposition::Unrecognized, &staging, &layout).unwrap();
        assert_eq!(moved, 2);
        assert!(layout.game_dir().join("readme.txt").is_file());
        assert!(layout.game_dir().join("Extras/tool.exe").is_file());
    }

    #[test]
    fn files_blocked_by_directories_are_not_counted() {
        let (_tmp, staging, layout) = setup();
        touch(&staging.join("bin/x64/plugin.dll"), "file");
        touch(&staging.join("bin/x64/other.dll"), "x");
        fs::create_dir_all(layout.game_dir().join("bin/x64/plugin.dll")).unwrap();

        let moved = relocate_folders(&staging, &["bin".to_string()], &layout).unwrap();
        assert_eq!(moved, 1);
        assert!(layout.game_dir().join("bin/x64/plugin.dll").is_dir());
        assert!(layout.game_dir().join("bin/x64/other.dll").is_file());

        touch(&staging.join("flat/skin.archive"), "x");
        fs::create_dir_all(layout.archive_folder().join("skin.archive")).unwrap();
        let moved = relocate_flat(
            &staging,
            &[PathBuf::from("flat/skin.archive")],
            layout.archive_folder(),
        )
        .unwrap();
        assert_eq!(moved, 0);
    }
}
