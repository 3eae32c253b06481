//! Downloaded archive naming: `<base>_<YYYYMMDD>_<HHMMSS>.<ext>`

use chrono::{DateTime, NaiveDateTime};
use regex_lite::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Format used for timestamps stored in the download cache
pub const CACHE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Placeholder for timestamps that could not be determined
pub const UNKNOWN_TIMESTAMP: &str = "Unknown";

const FILE_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

fn timestamp_suffix() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"_(\d{8}_\d{6})$").ok()).as_ref()
}

/// Make a catalog-supplied name usable as a single path component.
///
/// Separators and drive colons become `_`, and names that would refer to
/// the current or parent directory are replaced entirely.
pub fn safe_path_component(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c => c,
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

/// File name for a download: `<base>_<YYYYMMDD>_<HHMMSS>.zip` (UTC), or
/// `<base>.zip` when the upload time is unknown
pub fn download_file_name(base: &str, uploaded_timestamp: Option<i64>) -> String {
    let base = safe_path_component(base);
    match uploaded_timestamp.and_then(|ts| DateTime::from_timestamp(ts, 0)) {
        Some(time) => format!("{}_{}.zip", base, time.format(FILE_TIMESTAMP_FORMAT)),
        None => format!("{}.zip", base),
    }
}

/// Split `name` into stem and extension at the last dot
pub fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    }
}

/// Remove a trailing `_YYYYMMDD_HHMMSS` from a stem
pub fn strip_timestamp_suffix(stem: &str) -> &str {
    match timestamp_suffix().and_then(|re| re.find(stem)) {
        Some(m) => &stem[..m.start()],
        None => stem,
    }
}

/// Identity of a download independent of its extension and download time.
///
/// `mod_20240101_120000.zip`, `mod.rar` and `mod_20250505_010203.zip` all
/// share the identity `mod`.
pub fn base_identity(file_name: &str) -> &str {
    let (stem, _) = split_extension(file_name);
    strip_timestamp_suffix(stem)
}

/// Ledger key for a downloaded archive: the file name with its extension
/// lower-cased
pub fn archive_key(file_name: &str) -> String {
    match split_extension(file_name) {
        (stem, Some(ext)) => format!("{}.{}", stem, ext.to_ascii_lowercase()),
        (stem, None) => stem.to_string(),
    }
}

/// Parse the download timestamp embedded in a file name
pub fn parse_file_timestamp(file_name: &str) -> Option<NaiveDateTime> {
    let (stem, _) = split_extension(file_name);
    let Some(caps) = timestamp_suffix().and_then(|re| re.captures(stem)) else {
        tracing::debug!("No valid timestamp found in file name: {}", file_name);
        return None;
    };
    let raw = caps.get(1)?.as_str();
    match NaiveDateTime::parse_from_str(raw, FILE_TIMESTAMP_FORMAT) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            tracing::warn!("Failed to parse timestamp from file: {}. Error: {}", file_name, e);
            None
        }
    }
}

/// Render a Unix timestamp the way the download cache stores it
pub fn format_timestamp(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .map(|t| t.format(CACHE_TIMESTAMP_FORMAT).to_string())
        .unwrap_or_else(|| UNKNOWN_TIMESTAMP.to_string())
}

/// Folder a download is stored in: the file name without `_<timestamp>.<ext>`
pub fn download_dir_name(file_name: &str) -> &str {
    base_identity(file_name)
}

/// On-disk location of a downloaded archive:
/// `<output>/<category>/<mod_name>/<download dir>/<file_name>`
pub fn downloaded_archive_path(
    output_dir: &Path,
    category: &str,
    mod_name: &str,
    file_name: &str,
) -> PathBuf {
    output_dir
        .join(safe_path_component(category))
        .join(safe_path_component(mod_name))
        .join(download_dir_name(file_name))
        .join(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn download_names_carry_utc_timestamp() {
        // 2024-01-01 12:00:00 UTC
        assert_eq!(
            download_file_name("mod", Some(1_704_110_400)),
            "mod_20240101_120000.zip"
        );
        assert_eq!(download_file_name("mod", None), "mod.zip");
    }

    #[test]
    fn base_identity_ignores_extension_and_timestamp() {
        assert_eq!(base_identity("mod_20240101_120000.zip"), "mod");
        assert_eq!(base_identity("mod_20240101_120000.RAR"), "mod");
        assert_eq!(base_identity("mod.7z"), "mod");
        assert_eq!(base_identity("Better_Lights_v2"), "Better_Lights_v2");
        assert_eq!(base_identity("my.mod.v1.zip"), "my.mod.v1");
    }

    #[test]
    fn timestamp_must_be_a_suffix() {
        assert_eq!(
            strip_timestamp_suffix("mod_20240101_120000_extra"),
            "mod_20240101_120000_extra"
        );
        assert_eq!(strip_timestamp_suffix("mod_2024_1200"), "mod_2024_1200");
    }

    #[test]
    fn archive_key_normalizes_extension_case() {
        assert_eq!(archive_key("Mod_20240101_120000.ZIP"), "Mod_20240101_120000.zip");
        assert_eq!(archive_key("mod_20240101_120000.zip"), "mod_20240101_120000.zip");
        assert_eq!(archive_key("README"), "README");
    }

    #[test]
    fn parses_embedded_timestamp() {
        let parsed = parse_file_timestamp("mod_20240101_120000.zip").unwrap();
        assert_eq!(parsed.format(CACHE_TIMESTAMP_FORMAT).to_string(), "2024-01-01 12:00:00");
        assert!(parse_file_timestamp("mod.zip").is_none());
        assert!(parse_file_timestamp("mod_20241399_999999.zip").is_none());
    }

    #[test]
    fn downloaded_path_uses_category_and_mod_folders() {
        let path = downloaded_archive_path(
            Path::new("/out"),
            "Gameplay",
            "Cool Mod",
            "cool_20240101_120000.zip",
        );
        assert_eq!(
            path,
            PathBuf::from("/out/Gameplay/Cool Mod/cool/cool_20240101_120000.zip")
        );
    }

    #[test]
    fn catalog_names_cannot_leave_the_output_dir() {
        assert_eq!(safe_path_component("../../evil"), ".._.._evil");
        assert_eq!(safe_path_component(".."), "_");
        assert_eq!(safe_path_component("  "), "_");
        assert_eq!(safe_path_component(r"C:\Windows"), "C__Windows");
        assert_eq!(safe_path_component("Cool Mod"), "Cool Mod");
        assert_eq!(download_file_name("../Main", None), ".._Main.zip");

        let path = downloaded_archive_path(
            Path::new("/out"),
            "..",
            "/etc/cron.d",
            &download_file_name("a/b", None),
        );
        assert_eq!(path, PathBuf::from("/out/_/_etc_cron.d/a_b/a_b.zip"));
    }

    #[test]
    fn formats_cache_timestamps() {
        assert_eq!(format_timestamp(1_704_110_400), "2024-01-01 12:00:00");
    }
}
