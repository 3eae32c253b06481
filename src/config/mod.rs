//! Configuration management for Cybermods
//!
//! Uses XDG-compliant paths:
//! - Config: ~/.config/cybermods/config.toml
//! - Data: ~/.local/share/cybermods/ (ledger, download cache, log)
//! - Cache: ~/.cache/cybermods/ (tracked mods)

mod layout;
mod paths;

pub use layout::{InstallLayout, LayoutConfig};
pub use paths::Paths;

use crate::mods::InstallError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;

/// Default Steam install location of the game
pub const DEFAULT_GAME_DIR: &str =
    "C:\\Program Files (x86)\\Steam\\steamapps\\common\\Cyberpunk 2077";

/// Nexus game domain used when none is configured
pub const DEFAULT_GAME_DOMAIN: &str = "cyberpunk2077";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Nexus Mods API key
    pub nexus_api_key: Option<String>,

    /// Nexus game domain (e.g., "cyberpunk2077")
    pub game_domain: String,

    /// Game installation directory (install target)
    pub game_installation_dir: Option<String>,

    /// Root directory for downloaded archives
    pub output_dir: Option<String>,

    /// Folder layout of the game installation
    pub layout: LayoutConfig,

    /// Paths configuration
    #[serde(skip)]
    pub paths: Paths,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            nexus_api_key: None,
            game_domain: DEFAULT_GAME_DOMAIN.to_string(),
            game_installation_dir: Some(DEFAULT_GAME_DIR.to_string()),
            output_dir: None,
            layout: LayoutConfig::default(),
            paths: Paths::new(),
        }
    }
}

impl Config {
    /// Configured game directory, if it is set and exists on disk
    pub fn game_dir(&self) -> Option<PathBuf> {
        self.game_installation_dir
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .filter(|p| p.is_dir())
    }

    /// Resolve the downloads root (explicit setting or `<game>/Mods`)
    pub fn output_dir(&self) -> Option<PathBuf> {
        self.output_dir
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .or_else(|| self.game_dir().map(|g| g.join("Mods")))
    }

    /// Build the immutable install layout for the configured game
    pub fn install_layout(&self) -> Result<InstallLayout> {
        match self.game_dir() {
            Some(dir) => Ok(InstallLayout::new(dir, &self.layout)),
            None => Err(InstallError::GameDirMissing.into()),
        }
    }

    /// Validate the game directory and make sure its `Mods` folder exists.
    ///
    /// A missing game directory clears both the game and output settings so
    /// later commands ask for them instead of writing to a stale location.
    pub fn ensure_game_dirs(&mut self) -> Result<()> {
        match self.game_dir() {
            None => {
                if let Some(dir) = self.game_installation_dir.as_deref() {
                    tracing::warn!(
                        "Cyberpunk 2077 is not installed at {}. Leaving output directory empty.",
                        dir
                    );
                }
                self.game_installation_dir = None;
                self.output_dir = None;
            }
            Some(game_dir) => {
                tracing::debug!("Cyberpunk 2077 installation detected: {}", game_dir.display());
                if self.output_dir.is_none() {
                    let mods_dir = game_dir.join("Mods");
                    if !mods_dir.exists() {
                        tracing::info!("Mods directory not found. Creating: {}", mods_dir.display());
                        std::fs::create_dir_all(&mods_dir)
                            .context("Failed to create Mods directory")?;
                    }
                    self.output_dir = Some(mods_dir.to_string_lossy().to_string());
                }
            }
        }
        Ok(())
    }

    /// Ensure required application directories exist
    pub fn ensure_dirs(&self) -> Result<()> {
        self.paths
            .ensure_dirs()
            .context("Failed to create application directories")
    }

    /// Load configuration from the default XDG location
    pub async fn load() -> Result<Self> {
        Self::load_from(Paths::new()).await
    }

    /// Load configuration from disk or create default
    pub async fn load_from(paths: Paths) -> Result<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .await
                .context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")?
        } else {
            // Create default config
            let config = Config {
                paths: paths.clone(),
                ..Config::default()
            };
            config.save().await?;
            config
        };

        config.paths = paths;
        Ok(config)
    }

    /// Save configuration to disk
    pub async fn save(&self) -> Result<()> {
        let config_path = self.paths.config_file();

        // Ensure config directory exists
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&config_path, content)
            .await
            .context("Failed to write config file")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_creates_default_config() {
        let tmp = TempDir::new().unwrap();
        let paths = Paths::rooted_at(tmp.path().to_path_buf());

        let config = Config::load_from(paths.clone()).await.unwrap();
        assert_eq!(config.game_domain, DEFAULT_GAME_DOMAIN);
        assert!(paths.config_file().exists());
    }

    #[tokio::test]
    async fn save_and_reload_round_trips_settings() {
        let tmp = TempDir::new().unwrap();
        let paths = Paths::rooted_at(tmp.path().join("app"));

        let mut config = Config::load_from(paths.clone()).await.unwrap();
        config.game_installation_dir = Some(tmp.path().to_string_lossy().to_string());
        config.nexus_api_key = Some("key".to_string());
        config.save().await.unwrap();

        let reloaded = Config::load_from(paths).await.unwrap();
        assert_eq!(reloaded.nexus_api_key.as_deref(), Some("key"));
        assert_eq!(reloaded.game_dir(), Some(tmp.path().to_path_buf()));
        assert_eq!(reloaded.layout, LayoutConfig::default());
    }

    #[test]
    fn ensure_game_dirs_clears_missing_game() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config {
            game_installation_dir: Some(tmp.path().join("missing").to_string_lossy().to_string()),
            output_dir: Some("/somewhere".to_string()),
            paths: Paths::rooted_at(tmp.path().to_path_buf()),
            ..Config::default()
        };

        config.ensure_game_dirs().unwrap();
        assert!(config.game_installation_dir.is_none());
        assert!(config.output_dir.is_none());
        assert!(config.install_layout().is_err());
    }

    #[test]
    fn ensure_game_dirs_creates_mods_folder() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config {
            game_installation_dir: Some(tmp.path().to_string_lossy().to_string()),
            output_dir: None,
            paths: Paths::rooted_at(tmp.path().join("app")),
            ..Config::default()
        };

        config.ensure_game_dirs().unwrap();
        assert!(tmp.path().join("Mods").is_dir());
        assert_eq!(config.output_dir(), Some(tmp.path().join("Mods")));
        assert_eq!(config.install_layout().unwrap().game_dir(), tmp.path());
    }
}
