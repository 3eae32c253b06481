//! CLI command action handlers

use super::App;
use crate::downloads::naming::{download_file_name, format_timestamp};
use crate::downloads::{delete_downloaded_file, download_selected_files, ModStatus};
use crate::mods::{Disposition, InstallRequest};
use crate::nexus::refresh::DEFAULT_MAX_CONCURRENT;
use crate::nexus::{
    check_for_updates, clean_description, load_tracked_mods, refresh_tracked_mods,
    save_tracked_mods, ModDetails, NexusClient, ProgressCallback,
};
use crate::queue::{spawn_worker, Outcome, Request};
use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

impl App {
    // ========== Install Commands ==========

    pub async fn cmd_install(&self, files: &[String]) -> Result<()> {
        let installer = self.installer().await?;
        let cache = self.download_cache().await?;

        let mut requests: Vec<InstallRequest> = Vec::new();
        for name in files {
            match self.resolve_install_request(name, &cache).await? {
                Some(request) => requests.push(request),
                None => println!("Skipping '{}': not found in downloads or on disk.", name),
            }
        }
        if requests.is_empty() {
            bail!("No archives to install.");
        }

        println!(
            "Installing {} archive(s) into {}",
            requests.len(),
            installer.layout().game_dir().display()
        );

        let mut worker = spawn_worker(installer);
        let outcomes = worker.run_batch(Request::Install(requests)).await?;
        worker.shutdown().await?;

        let failures = render_outcomes(&outcomes);
        if failures > 0 {
            bail!("{} of {} archive(s) failed to install", failures, outcomes.len());
        }
        Ok(())
    }

    pub async fn cmd_uninstall(&self, files: &[String]) -> Result<()> {
        let installer = self.installer().await?;

        let mut worker = spawn_worker(installer);
        let outcomes = worker.run_batch(Request::Uninstall(files.to_vec())).await?;
        worker.shutdown().await?;

        let failures = render_outcomes(&outcomes);
        if failures > 0 {
            bail!("{} of {} archive(s) failed to uninstall", failures, outcomes.len());
        }
        Ok(())
    }

    pub async fn cmd_archives(&self) -> Result<()> {
        let installer = self.installer().await?;
        let archives = installer.list_archive_outputs();

        if archives.is_empty() {
            println!("No installed .{} files.", installer.layout().archive_extension());
            return Ok(());
        }

        println!(
            "Installed archives in {}:",
            installer.layout().archive_folder().display()
        );
        println!("{:-<60}", "");
        for (i, name) in archives.iter().enumerate() {
            println!("{:>3}. {}", i + 1, name);
        }
        Ok(())
    }

    pub async fn cmd_rename_archive(&self, old_name: &str, new_name: &str) -> Result<()> {
        let installer = self.installer().await?;
        let new_path = installer.rename_archive_output(old_name, new_name)?;
        println!("Renamed '{}' to '{}'", old_name, new_path.display());
        Ok(())
    }

    pub async fn cmd_status(&self, file_name: &str) -> Result<()> {
        let installer = self.installer().await?;
        let cache = self.download_cache().await?;

        println!("Status for {}", file_name);
        println!("{:-<40}", "");
        match cache.get(file_name) {
            Some(record) => {
                println!("Mod:          {} (ID {})", record.mod_name, record.mod_id);
                println!("Size:         {:.2} MB", record.size_mb());
                println!("Downloaded:   {}", record.latest_downloaded_timestamp);
                println!("Latest:       {}", record.latest_uploaded_timestamp);
                println!("Mod status:   {}", cache.mod_status(&record.mod_name));
            }
            None => println!("Download:     not tracked"),
        }

        installer.with_ledger(|ledger| match ledger.find_by_loose_name(file_name) {
            Some(key) => {
                let count = ledger
                    .get(key)
                    .map(|r| r.extracted_files.len())
                    .unwrap_or(0);
                println!("Installed:    yes ({} files, tracked as {})", count, key);
            }
            None => println!("Installed:    no"),
        });
        Ok(())
    }

    // ========== Download Commands ==========

    pub async fn cmd_downloads_list(&self) -> Result<()> {
        let cache = self.download_cache().await?;
        if cache.is_empty() {
            println!("No downloaded files.");
            return Ok(());
        }

        // Installation status is optional when the game folder is not configured.
        let installer = self.installer().await.ok();

        let mut rows: Vec<_> = cache.files().collect();
        rows.sort_by_key(|(_, record)| record.mod_name.to_lowercase());

        println!(
            "{:<30} {:<45} {:>10} {:<20} {}",
            "Mod", "File", "Size", "Uploaded", "Status"
        );
        println!("{:-<120}", "");
        for (file_name, record) in rows {
            let installed = match &installer {
                Some(installer) if installer.is_installed(file_name) => "Installed",
                Some(_) => "Not Installed",
                None => "Unknown",
            };
            println!(
                "{:<30} {:<45} {:>7.2} MB {:<20} {}",
                record.mod_name,
                file_name,
                record.size_mb(),
                record.latest_uploaded_timestamp,
                installed
            );
        }
        Ok(())
    }

    pub async fn cmd_downloads_delete(&self, file_name: &str) -> Result<()> {
        let mut cache = self.download_cache().await?;
        let output_dir = self.output_dir().await?;

        match delete_downloaded_file(&mut cache, &output_dir, file_name)? {
            Some(path) => println!("Deleted {}", path.display()),
            None => println!("'{}' was not on disk; removed from downloads.", file_name),
        }
        Ok(())
    }

    // ========== Nexus Commands ==========

    pub async fn cmd_nexus_tracked(&self, cached: bool) -> Result<()> {
        let cache_path = self.config.read().await.paths.tracked_mods_cache();

        let mods = if cached {
            load_tracked_mods(&cache_path)?
        } else {
            let catalog = self.catalog()?;
            println!("Fetching tracked mods...");
            let mods =
                refresh_tracked_mods(catalog, &self.game_domain().await, DEFAULT_MAX_CONCURRENT)
                    .await?;
            if let Err(e) = save_tracked_mods(&cache_path, &mods) {
                tracing::error!("Failed to save tracked mods cache: {:#}", e);
            }
            mods
        };

        if mods.is_empty() {
            println!("No tracked mods found.");
            return Ok(());
        }

        let downloads = self.download_cache().await?;
        for (category, mods) in group_by_category(&mods) {
            println!("──────────── {} ────────────", category);
            for m in mods {
                println!(
                    "  {:>7}  {:<50} {}",
                    m.mod_id,
                    m.name,
                    downloads.mod_status(&m.name)
                );
            }
        }
        Ok(())
    }

    pub async fn cmd_nexus_files(&self, mod_id: i64) -> Result<()> {
        let catalog = self.catalog()?;
        let mut files = catalog.fetch_mod_files(&self.game_domain().await, mod_id).await;
        if files.is_empty() {
            println!("No files found for this mod.");
            return Ok(());
        }
        files.sort_by_key(|f| std::cmp::Reverse(f.uploaded_timestamp.unwrap_or(0)));

        let cache = self.download_cache().await?;
        let downloaded: Vec<&str> = cache.files().map(|(name, _)| name).collect();

        for file in &files {
            let uploaded = file
                .uploaded_timestamp
                .map(format_timestamp)
                .unwrap_or_else(|| "Unknown Date".to_string());
            let name = download_file_name(&file.name, file.uploaded_timestamp);
            let marker = if downloaded.contains(&name.as_str()) {
                " [Already Downloaded]"
            } else {
                ""
            };
            println!("{} (ID: {}){}", file.name, file.id, marker);
            println!("  Size: {:.2} MB", file.size_mb());
            println!("  Uploaded: {}", uploaded);
            if let Some(description) = file.description.as_deref() {
                println!("  Description: {}", clean_description(description));
            }
        }
        Ok(())
    }

    pub async fn cmd_nexus_download(
        &self,
        mod_id: i64,
        file_ids: &[i64],
        install: bool,
    ) -> Result<()> {
        let catalog = self.catalog()?;
        let output_dir = self.output_dir().await?;
        let mut cache = self.download_cache().await?;

        let bar = download_bar();
        let progress: ProgressCallback = {
            let bar = bar.clone();
            Arc::new(move |percent: f64, downloaded_mb: f64, total_mb: f64| {
                bar.set_position(percent.round() as u64);
                bar.set_message(format!("{:.1}/{:.1} MB", downloaded_mb, total_mb));
            })
        };

        let result = download_selected_files(
            catalog.as_ref(),
            &mut cache,
            &self.game_domain().await,
            mod_id,
            file_ids,
            &output_dir,
            Some(progress),
        )
        .await;
        bar.finish_and_clear();
        let downloaded = result?;

        for archive in &downloaded {
            let note = if archive.outdated { " (a newer upload exists)" } else { "" };
            println!("Downloaded {}{}", archive.path.display(), note);
        }

        if install {
            let names: Vec<String> = downloaded.iter().map(|a| a.file_name.clone()).collect();
            self.cmd_install(&names).await?;
        }
        Ok(())
    }

    pub async fn cmd_nexus_check_updates(&self) -> Result<()> {
        let catalog = self.catalog()?;
        let mut cache = self.download_cache().await?;
        if cache.is_empty() {
            println!("No downloaded files to check.");
            return Ok(());
        }

        println!("Checking {} downloaded file(s) for updates...", cache.len());
        let updated = check_for_updates(
            catalog,
            &mut cache,
            &self.game_domain().await,
            DEFAULT_MAX_CONCURRENT,
        )
        .await;
        println!("{} of {} file(s) have new upload dates.", updated, cache.len());

        let mut outdated: Vec<_> = cache
            .files()
            .filter(|(_, r)| !r.is_up_to_date())
            .map(|(name, r)| (r.mod_name.clone(), name.to_string()))
            .collect();
        outdated.sort();
        for (mod_name, file_name) in outdated {
            println!("  {}: {} [{}]", mod_name, file_name, ModStatus::UpdateAvailable);
        }
        Ok(())
    }

    // ========== Config Commands ==========

    pub async fn cmd_config_show(&self) -> Result<()> {
        let config = self.config.read().await;
        let unset = || "(not set)".to_string();

        println!("Configuration ({})", config.paths.config_file().display());
        println!("{:-<40}", "");
        println!("Game domain:   {}", config.game_domain);
        println!(
            "Game folder:   {}",
            config.game_installation_dir.clone().unwrap_or_else(unset)
        );
        println!(
            "Output folder: {}",
            config
                .output_dir()
                .map(|p| p.display().to_string())
                .unwrap_or_else(unset)
        );
        println!(
            "API key:       {}",
            if config.nexus_api_key.is_some() { "set" } else { "not set" }
        );
        println!("Mod folders:   {}", config.layout.mod_folders.join(", "));
        println!("Archive dir:   {}", config.layout.archive_folder);
        println!("Ledger:        {}", config.paths.installed_files().display());
        println!("Downloads:     {}", config.paths.downloaded_files().display());
        println!("Log file:      {}", config.paths.log_file().display());
        Ok(())
    }

    pub async fn cmd_config_set_game_dir(&self, path: &str) -> Result<()> {
        let dir = PathBuf::from(path);
        if !dir.is_dir() {
            bail!("Directory does not exist: {}", dir.display());
        }

        let mut config = self.config.write().await;
        config.game_installation_dir = Some(dir.to_string_lossy().to_string());
        config.ensure_game_dirs()?;
        config.save().await?;
        println!("Game installation folder set to {}", dir.display());
        Ok(())
    }

    pub async fn cmd_config_set_output_dir(&self, path: &str) -> Result<()> {
        let dir = PathBuf::from(path);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let mut config = self.config.write().await;
        config.output_dir = Some(dir.to_string_lossy().to_string());
        config.save().await?;
        println!("Output folder set to {}", dir.display());
        Ok(())
    }

    pub async fn cmd_config_set_api_key(&mut self, key: &str) -> Result<()> {
        let key = key.trim();
        NexusClient::new(key)?;

        {
            let mut config = self.config.write().await;
            config.nexus_api_key = Some(key.to_string());
            config.save().await?;
        }
        self.nexus = Self::build_client(&*self.config.read().await);
        println!("Nexus API key saved.");
        Ok(())
    }
}

/// Print one line per outcome, returning the number of failures
fn render_outcomes(outcomes: &[Outcome]) -> usize {
    let mut failures = 0;
    for outcome in outcomes {
        match outcome {
            Outcome::Installed { file_name, report } => {
                let how = match &report.disposition {
                    Disposition::Empty => "archive was empty".to_string(),
                    Disposition::ArchiveOnly { .. } => "archive files".to_string(),
                    Disposition::ModFolders { folders, .. } => folders.join(", "),
                    Disposition::Unrecognized => "unrecognized layout".to_string(),
                };
                println!(
                    "[ok]   {}: {} new file(s) ({}, {})",
                    file_name,
                    report.extracted_files.len(),
                    report.format,
                    how
                );
            }
            Outcome::Uninstalled { file_name, report } => {
                println!(
                    "[ok]   {}: removed {} file(s), {} already missing",
                    file_name,
                    report.removed.len(),
                    report.missing.len()
                );
            }
            Outcome::Failed { file_name, error } => {
                failures += 1;
                println!("[fail] {}: {}", file_name, error);
            }
            Outcome::BatchDone => {}
        }
    }
    failures
}

fn group_by_category(mods: &[ModDetails]) -> BTreeMap<&str, Vec<&ModDetails>> {
    let mut groups: BTreeMap<&str, Vec<&ModDetails>> = BTreeMap::new();
    for m in mods {
        groups.entry(m.category.as_str()).or_default().push(m);
    }
    groups
}

fn download_bar() -> ProgressBar {
    let bar = ProgressBar::new(100);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:30.cyan/blue}] {pos}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    bar.set_style(style);
    bar
}
