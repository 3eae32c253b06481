//! Application state and orchestration

mod actions;

use crate::config::Config;
use crate::downloads::{locate_download, DownloadCache};
use crate::mods::{InstallRequest, ModInstaller};
use crate::nexus::{Catalog, NexusClient};

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Main application struct that orchestrates all components
pub struct App {
    /// Application configuration
    pub config: Arc<RwLock<Config>>,

    /// Nexus Mods API client (optional, requires API key)
    pub nexus: Option<Arc<NexusClient>>,
}

impl App {
    /// Create a new App instance
    pub async fn new(mut config: Config) -> Result<Self> {
        // Ensure directories exist
        config.ensure_dirs().context("Failed to create directories")?;

        let before = (config.game_installation_dir.clone(), config.output_dir.clone());
        config.ensure_game_dirs()?;
        if before != (config.game_installation_dir.clone(), config.output_dir.clone()) {
            config.save().await?;
        }

        let nexus = Self::build_client(&config);

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            nexus,
        })
    }

    fn build_client(config: &Config) -> Option<Arc<NexusClient>> {
        config.nexus_api_key.as_deref().and_then(|key| {
            NexusClient::new(key)
                .map(Arc::new)
                .map_err(|e| {
                    tracing::warn!("Failed to initialize Nexus API client: {}", e);
                    e
                })
                .ok()
        })
    }

    /// Catalog client, or an error telling the user how to configure one
    fn catalog(&self) -> Result<Arc<dyn Catalog>> {
        match &self.nexus {
            Some(client) => Ok(Arc::clone(client) as Arc<dyn Catalog>),
            None => bail!(
                "Nexus API key not configured. Set it with 'cybermods config set-api-key <key>'."
            ),
        }
    }

    async fn game_domain(&self) -> String {
        self.config.read().await.game_domain.clone()
    }

    async fn output_dir(&self) -> Result<PathBuf> {
        match self.config.read().await.output_dir() {
            Some(dir) => Ok(dir),
            None => bail!(
                "Output directory is not set. Configure it with 'cybermods config set-output-dir <path>'."
            ),
        }
    }

    /// Installer bound to the configured game directory and ledger
    async fn installer(&self) -> Result<Arc<ModInstaller>> {
        let config = self.config.read().await;
        let layout = config.install_layout()?;
        let installer = ModInstaller::open(layout, config.paths.installed_files())
            .context("Failed to load installed files ledger")?;
        Ok(Arc::new(installer))
    }

    async fn download_cache(&self) -> Result<DownloadCache> {
        let path = self.config.read().await.paths.downloaded_files();
        DownloadCache::load(path)
    }

    /// Turn a CLI argument into an install request.
    ///
    /// Accepts a path to an archive on disk or the name of a cached download.
    async fn resolve_install_request(
        &self,
        name: &str,
        cache: &DownloadCache,
    ) -> Result<Option<InstallRequest>> {
        let as_path = Path::new(name);
        if as_path.is_file() {
            return Ok(Some(InstallRequest::from_path(as_path)));
        }

        let Some(record) = cache.get(name) else {
            tracing::warn!("File '{}' not found in tracking. Skipping.", name);
            return Ok(None);
        };

        let output_dir = self.output_dir().await?;
        let Some(archive_path) = locate_download(&output_dir, name, record) else {
            tracing::error!("Archive for '{}' not found under {}", name, output_dir.display());
            return Ok(None);
        };

        Ok(Some(InstallRequest {
            archive_path,
            file_name: name.to_string(),
            display_name: record.mod_name.clone(),
            source_timestamp: Some(record.latest_downloaded_timestamp.clone()),
        }))
    }
}
