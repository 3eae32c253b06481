//! Installation layout of the target game directory

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Layout settings as stored in `config.toml`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LayoutConfig {
    /// Top-level folder names the game loads mods from
    pub mod_folders: Vec<String>,

    /// Folder for loose `.archive` payloads, relative to the game directory
    /// unless absolute
    pub archive_folder: String,

    /// Extension of the game's packed resource files
    pub archive_extension: String,

    /// Extensions of downloaded mod containers, never installation targets
    pub container_extensions: Vec<String>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            mod_folders: ["archive", "bin", "engine", "r6", "red4ext"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            archive_folder: "archive/pc/mod".to_string(),
            archive_extension: "archive".to_string(),
            container_extensions: vec!["zip".to_string(), "rar".to_string()],
        }
    }
}

/// Immutable view of where mod content goes inside one game installation.
///
/// Built once per command from [`crate::Config`] and handed to the resolver,
/// relocator and tracker instead of being looked up globally.
#[derive(Debug, Clone)]
pub struct InstallLayout {
    game_dir: PathBuf,
    mod_folders: BTreeSet<String>,
    archive_folder: PathBuf,
    archive_extension: String,
    container_extensions: Vec<String>,
}

impl InstallLayout {
    pub fn new(game_dir: impl Into<PathBuf>, config: &LayoutConfig) -> Self {
        let game_dir = game_dir.into();
        let configured = Path::new(&config.archive_folder);
        let archive_folder = if configured.is_absolute() {
            configured.to_path_buf()
        } else {
            config
                .archive_folder
                .split(['/', '\\'])
                .filter(|s| !s.is_empty())
                .fold(game_dir.clone(), |acc, part| acc.join(part))
        };

        Self {
            mod_folders: config
                .mod_folders
                .iter()
                .map(|f| f.trim().to_ascii_lowercase())
                .filter(|f| !f.is_empty())
                .collect(),
            archive_folder,
            archive_extension: config.archive_extension.trim_start_matches('.').to_ascii_lowercase(),
            container_extensions: config
                .container_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            game_dir,
        }
    }

    /// Root of the game installation (the install target)
    pub fn game_dir(&self) -> &Path {
        &self.game_dir
    }

    /// Destination for archive-only payloads
    pub fn archive_folder(&self) -> &Path {
        &self.archive_folder
    }

    pub fn archive_extension(&self) -> &str {
        &self.archive_extension
    }

    pub fn mod_folders(&self) -> impl Iterator<Item = &str> {
        self.mod_folders.iter().map(String::as_str)
    }

    /// Canonical (lower-case) folder name if `name` is a recognized mod folder.
    ///
    /// Matching ignores ASCII case because archives built on Windows often
    /// ship `Archive/` or `R6/`.
    pub fn recognized_folder(&self, name: &str) -> Option<&str> {
        let lower = name.to_ascii_lowercase();
        self.mod_folders.get(&lower).map(String::as_str)
    }

    /// Whether the file is one of the game's packed `.archive` resources
    pub fn is_archive_payload(&self, path: &Path) -> bool {
        extension_lower(path).is_some_and(|ext| ext == self.archive_extension)
    }

    /// Whether the file is a mod container (`.zip` / `.rar`)
    pub fn is_container(&self, path: &Path) -> bool {
        extension_lower(path).is_some_and(|ext| self.container_extensions.contains(&ext))
    }

    /// Directories whose contents an install may change.
    ///
    /// The archive folder is only listed separately when configured outside
    /// the game directory.
    pub fn tracked_roots(&self) -> Vec<PathBuf> {
        let mut roots = vec![self.game_dir.clone()];
        if !self.archive_folder.starts_with(&self.game_dir) {
            roots.push(self.archive_folder.clone());
        }
        roots
    }
}

fn extension_lower(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> InstallLayout {
        InstallLayout::new("/games/cp2077", &LayoutConfig::default())
    }

    #[test]
    fn archive_folder_is_nested_under_game_dir() {
        let layout = layout();
        assert_eq!(
            layout.archive_folder(),
            Path::new("/games/cp2077/archive/pc/mod")
        );
        assert_eq!(layout.tracked_roots(), vec![PathBuf::from("/games/cp2077")]);
    }

    #[test]
    fn recognized_folder_ignores_case() {
        let layout = layout();
        assert_eq!(layout.recognized_folder("R6"), Some("r6"));
        assert_eq!(layout.recognized_folder("archive"), Some("archive"));
        assert_eq!(layout.recognized_folder("MyCoolMod"), None);
    }

    #[test]
    fn extension_checks() {
        let layout = layout();
        assert!(layout.is_archive_payload(Path::new("skin.archive")));
        assert!(layout.is_archive_payload(Path::new("SKIN.ARCHIVE")));
        assert!(!layout.is_archive_payload(Path::new("skin.archive.bak")));
        assert!(layout.is_container(Path::new("mod.zip")));
        assert!(layout.is_container(Path::new("mod.RAR")));
        assert!(!layout.is_container(Path::new("mod.7z")));
    }

    #[test]
    fn external_archive_folder_is_tracked() {
        let config = LayoutConfig {
            archive_folder: "/mnt/shared/archives".to_string(),
            ..LayoutConfig::default()
        };
        let layout = InstallLayout::new("/games/cp2077", &config);
        assert_eq!(layout.tracked_roots().len(), 2);
    }
}
