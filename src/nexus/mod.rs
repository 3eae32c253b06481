//! Nexus Mods API integration

pub mod refresh;
pub mod rest;

pub use refresh::{check_for_updates, load_tracked_mods, refresh_tracked_mods, save_tracked_mods};
pub use rest::NexusClient;

use anyhow::Result;
use async_trait::async_trait;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Download progress: percent complete, downloaded MB, total MB
pub type ProgressCallback = Arc<dyn Fn(f64, f64, f64) + Send + Sync>;

/// Placeholder name for mods whose details could not be fetched
pub const UNKNOWN_MOD_NAME: &str = "Unknown Name";

/// Category used when a mod's category is not known
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Nexus category ids for Cyberpunk 2077
const CATEGORY_MAPPING: &[(i64, &str)] = &[
    (2, "Miscellaneous"),
    (3, "Armour and Clothing"),
    (4, "Audio"),
    (5, "Characters"),
    (6, "Crafting"),
    (7, "Gameplay"),
    (8, "User Interface"),
    (9, "Utilities"),
    (10, "Visuals and Graphics"),
    (11, "Weapons"),
    (12, "Modders Resources"),
    (13, "Appearance"),
    (14, "Vehicles"),
    (15, "Animations"),
    (16, "Locations"),
    (17, "Scripts"),
];

/// Display name of a Nexus category id
pub fn category_name(category_id: Option<i64>) -> &'static str {
    category_id
        .and_then(|id| CATEGORY_MAPPING.iter().find(|(k, _)| *k == id))
        .map(|(_, name)| *name)
        .unwrap_or("Unknown Category")
}

/// A downloadable file belonging to a mod
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModFile {
    #[serde(rename = "file_id")]
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub size_kb: u64,
    #[serde(default)]
    pub uploaded_timestamp: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category_name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

impl ModFile {
    pub fn size_mb(&self) -> f64 {
        self.size_kb as f64 / 1024.0
    }
}

/// Latest upload time across a mod's files
pub fn latest_upload(files: &[ModFile]) -> Option<i64> {
    files
        .iter()
        .filter_map(|f| f.uploaded_timestamp)
        .filter(|ts| *ts > 0)
        .max()
}

/// Mod metadata, also persisted in the tracked-mods cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModDetails {
    pub mod_id: i64,
    pub name: String,
    #[serde(default)]
    pub category_id: Option<i64>,
    #[serde(default = "uncategorized")]
    pub category: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

fn uncategorized() -> String {
    UNCATEGORIZED.to_string()
}

impl ModDetails {
    /// Stand-in for a tracked mod whose details are unavailable
    pub fn placeholder(mod_id: i64) -> Self {
        Self {
            mod_id,
            name: UNKNOWN_MOD_NAME.to_string(),
            category_id: None,
            category: uncategorized(),
            author: None,
            version: None,
            summary: None,
        }
    }
}

/// Entry of the user's tracked-mods list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedMod {
    #[serde(default)]
    pub mod_id: Option<i64>,
    #[serde(default)]
    pub domain_name: Option<String>,
}

/// Remote mod catalog.
///
/// Lookups log failures and return empty values so batch operations keep
/// going when one mod is unavailable.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn fetch_mod_files(&self, game: &str, mod_id: i64) -> Vec<ModFile>;

    async fn fetch_mod_details(&self, game: &str, mod_id: i64) -> Option<ModDetails>;

    /// Direct download URL, or `None` when the account may not download
    /// through the API
    async fn resolve_download_link(&self, game: &str, mod_id: i64, file_id: i64) -> Option<String>;

    async fn download_to_path(
        &self,
        url: &str,
        dest: &Path,
        progress: Option<ProgressCallback>,
    ) -> Result<()>;

    async fn fetch_tracked_mods(&self) -> Result<Vec<TrackedMod>>;
}

/// Strip HTML and BBCode formatting from a file description
pub fn clean_description(description: &str) -> String {
    let patterns = [
        r"<[^>]*>",
        r"\[color=[^\]]*\]",
        r"\[/color\]",
        r"\[size=[^\]]*\]",
        r"\[/size\]",
        r"\[/?[biu]\]",
        r"\[url=[^\]]*\]",
        r"\[/url\]",
    ];

    let mut cleaned = description.to_string();
    for pattern in patterns {
        if let Ok(re) = Regex::new(pattern) {
            cleaned = re.replace_all(&cleaned, "").to_string();
        }
    }
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_lookup() {
        assert_eq!(category_name(Some(7)), "Gameplay");
        assert_eq!(category_name(Some(999)), "Unknown Category");
        assert_eq!(category_name(None), "Unknown Category");
    }

    #[test]
    fn mod_file_parses_nexus_json() {
        let json = r#"{"id":[10,3333],"file_id":10,"name":"Main File","size_kb":2048,
            "uploaded_timestamp":1704110400,"description":"desc","category_name":"MAIN"}"#;
        let file: ModFile = serde_json::from_str(json).unwrap();
        assert_eq!(file.id, 10);
        assert_eq!(file.size_mb(), 2.0);
        assert_eq!(file.uploaded_timestamp, Some(1_704_110_400));
    }

    #[test]
    fn latest_upload_ignores_missing() {
        let file = |ts| ModFile {
            id: 1,
            name: "f".to_string(),
            size_kb: 0,
            uploaded_timestamp: ts,
            description: None,
            category_name: None,
            version: None,
        };
        assert_eq!(latest_upload(&[file(Some(5)), file(None), file(Some(9))]), Some(9));
        assert_eq!(latest_upload(&[file(None)]), None);
    }

    #[test]
    fn description_markup_is_removed() {
        assert_eq!(
            clean_description("<p>Adds [color=#FFFF00]new[/color] [b]lights[/b]</p><br>"),
            "Adds new lights"
        );
    }
}
