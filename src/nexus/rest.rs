//! Nexus Mods REST v1 client

use super::{category_name, Catalog, ModDetails, ModFile, ProgressCallback, TrackedMod};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const REST_API_BASE: &str = "https://api.nexusmods.com/v1";
const USER_AGENT: &str = concat!("Cybermods/", env!("CARGO_PKG_VERSION"));

/// Nexus Mods REST client
#[derive(Clone)]
pub struct NexusClient {
    client: Arc<reqwest::Client>,
    base_url: String,
}

impl NexusClient {
    /// Create a new client authenticated with `api_key`
    pub fn new(api_key: &str) -> Result<Self> {
        Self::with_base_url(api_key, REST_API_BASE)
    }

    /// Create a client against a different API root
    pub fn with_base_url(api_key: &str, base_url: &str) -> Result<Self> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            bail!("Nexus API key is empty. Set it with 'cybermods config set-api-key <key>'.");
        }

        let mut headers = HeaderMap::new();
        // REST API v1 uses the "apikey" header for authentication
        headers.insert(
            "apikey",
            HeaderValue::from_str(api_key).context("Invalid API key")?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client: Arc::new(client),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("Request to {} failed ({}): {}", url, status, text);
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))
    }
}

#[async_trait]
impl Catalog for NexusClient {
    async fn fetch_mod_files(&self, game: &str, mod_id: i64) -> Vec<ModFile> {
        #[derive(Deserialize)]
        struct FilesResponse {
            #[serde(default)]
            files: Vec<ModFile>,
        }

        let path = format!("/games/{}/mods/{}/files.json", game, mod_id);
        match self.get_json::<FilesResponse>(&path).await {
            Ok(response) => {
                for file in &response.files {
                    tracing::debug!("Mod ID {}: File ID {}, Name: {}", mod_id, file.id, file.name);
                }
                response.files
            }
            Err(e) => {
                tracing::error!("Failed to fetch mod files for mod ID {}: {:#}", mod_id, e);
                Vec::new()
            }
        }
    }

    async fn fetch_mod_details(&self, game: &str, mod_id: i64) -> Option<ModDetails> {
        #[derive(Deserialize)]
        struct DetailsResponse {
            mod_id: Option<i64>,
            name: Option<String>,
            category_id: Option<i64>,
            author: Option<String>,
            version: Option<String>,
            summary: Option<String>,
        }

        let path = format!("/games/{}/mods/{}.json", game, mod_id);
        match self.get_json::<DetailsResponse>(&path).await {
            Ok(details) => Some(ModDetails {
                mod_id: details.mod_id.unwrap_or(mod_id),
                name: details
                    .name
                    .map(|n| n.trim().to_string())
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| format!("Mod_{}", mod_id)),
                category: category_name(details.category_id).to_string(),
                category_id: details.category_id,
                author: details.author,
                version: details.version,
                summary: details.summary,
            }),
            Err(e) => {
                tracing::warn!("Failed to fetch details for mod ID {}: {:#}", mod_id, e);
                None
            }
        }
    }

    async fn resolve_download_link(&self, game: &str, mod_id: i64, file_id: i64) -> Option<String> {
        #[derive(Deserialize)]
        struct LinkInfo {
            #[serde(rename = "URI")]
            uri: String,
        }

        let url = format!(
            "{}/games/{}/mods/{}/files/{}/download_link.json",
            self.base_url, game, mod_id, file_id
        );
        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Failed to get download link for file ID {}: {}", file_id, e);
                return None;
            }
        };

        let status = response.status();
        if status == StatusCode::FORBIDDEN {
            tracing::warn!("Non-premium users cannot download directly via the API.");
            return None;
        }
        if !status.is_success() {
            tracing::error!("Failed to get download link for file ID {} ({})", file_id, status);
            return None;
        }

        match response.json::<Vec<LinkInfo>>().await {
            Ok(links) => links.into_iter().next().map(|l| l.uri),
            Err(e) => {
                tracing::error!("Failed to parse download link response: {}", e);
                None
            }
        }
    }

    async fn download_to_path(
        &self,
        url: &str,
        dest: &Path,
        progress: Option<ProgressCallback>,
    ) -> Result<()> {
        // Download hosts reject the API key header, so use a plain client.
        let response = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?
            .get(url)
            .send()
            .await
            .context("Failed to start download")?;

        if !response.status().is_success() {
            bail!("Download failed with status: {}", response.status());
        }

        let total_size = response.content_length().unwrap_or(0);

        let mut file = tokio::fs::File::create(dest)
            .await
            .context("Failed to create download file")?;

        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();

        use futures::StreamExt;
        use tokio::io::AsyncWriteExt;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("Error reading download stream")?;
            file.write_all(&chunk)
                .await
                .context("Error writing to file")?;
            downloaded += chunk.len() as u64;

            if let Some(cb) = &progress {
                if total_size > 0 {
                    let mb = 1024.0 * 1024.0;
                    cb(
                        downloaded as f64 / total_size as f64 * 100.0,
                        downloaded as f64 / mb,
                        total_size as f64 / mb,
                    );
                }
            }
        }

        file.flush().await?;
        Ok(())
    }

    async fn fetch_tracked_mods(&self) -> Result<Vec<TrackedMod>> {
        self.get_json("/user/tracked_mods.json")
            .await
            .context("Failed to fetch tracked mods")
    }
}
