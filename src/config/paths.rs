//! XDG-compliant path management

use directories::ProjectDirs;
use std::path::PathBuf;

/// Manages all application paths using XDG base directory specification
#[derive(Debug, Clone)]
pub struct Paths {
    config_dir: PathBuf,
    data_dir: PathBuf,
    cache_dir: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

impl Paths {
    /// Create a new Paths instance
    pub fn new() -> Self {
        match ProjectDirs::from("", "", "cybermods") {
            Some(dirs) => Self {
                config_dir: dirs.config_dir().to_path_buf(),
                data_dir: dirs.data_dir().to_path_buf(),
                cache_dir: dirs.cache_dir().to_path_buf(),
            },
            // No home directory (containers, service accounts): keep everything local.
            None => Self::rooted_at(PathBuf::from(".cybermods")),
        }
    }

    /// Place config, data and cache under a single root (used by tests and `--data-root`)
    pub fn rooted_at(root: PathBuf) -> Self {
        Self {
            config_dir: root.join("config"),
            data_dir: root.join("data"),
            cache_dir: root.join("cache"),
        }
    }

    // ========== Config Paths ==========

    /// Config directory: ~/.config/cybermods/
    pub fn config_dir(&self) -> PathBuf {
        self.config_dir.clone()
    }

    /// Main config file: ~/.config/cybermods/config.toml
    pub fn config_file(&self) -> PathBuf {
        self.config_dir().join("config.toml")
    }

    // ========== Data Paths ==========

    /// Data directory: ~/.local/share/cybermods/
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone()
    }

    /// Installed-files ledger: ~/.local/share/cybermods/installed_files.json
    pub fn installed_files(&self) -> PathBuf {
        self.data_dir().join("installed_files.json")
    }

    /// Download cache: ~/.local/share/cybermods/downloaded_files.json
    pub fn downloaded_files(&self) -> PathBuf {
        self.data_dir().join("downloaded_files.json")
    }

    /// Log file: ~/.local/share/cybermods/cybermods.log
    pub fn log_file(&self) -> PathBuf {
        self.data_dir().join("cybermods.log")
    }

    // ========== Cache Paths ==========

    /// Cache directory: ~/.cache/cybermods/
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone()
    }

    /// Tracked mods cache: ~/.cache/cybermods/cached_tracked_mods.json
    pub fn tracked_mods_cache(&self) -> PathBuf {
        self.cache_dir().join("cached_tracked_mods.json")
    }

    // ========== Utility Methods ==========

    /// Ensure all required directories exist
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.config_dir())?;
        std::fs::create_dir_all(self.data_dir())?;
        std::fs::create_dir_all(self.cache_dir())?;
        Ok(())
    }
}
