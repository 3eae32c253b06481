//! Mod installation: archive extraction, layout resolution, relocation and
//! the installed-files ledger

mod archive;
mod error;
mod layout;
mod ledger;
mod relocate;
mod tracker;
mod uninstall;

pub use archive::{open_archive, ArchiveFormat, StagingTree, STAGING_PREFIX};
pub use error::{InstallError, InstallResult};
pub use layout::{list_files, resolve_layout, Disposition};
pub use ledger::{ArchiveRecord, Ledger};
pub use relocate::{merge_tree, relocate, relocate_flat, relocate_folders};
pub use tracker::Snapshot;
pub use uninstall::UninstallReport;

use crate::config::InstallLayout;
use crate::downloads::naming::{archive_key, base_identity, parse_file_timestamp, CACHE_TIMESTAMP_FORMAT};
use error::IoPathExt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use uninstall::{remove_file_safely, Removal};

/// Result of extracting one archive into the game directory
#[derive(Debug, Clone)]
pub struct InstallReport {
    pub archive: PathBuf,
    pub format: ArchiveFormat,
    pub disposition: Disposition,
    /// Files that did not exist before the install, sorted
    pub extracted_files: Vec<PathBuf>,
}

/// Extract `archive` into the layout's game directory and report which
/// files appeared.
///
/// The staging tree is created under the game directory and is removed on
/// every path out of this function.
pub fn extract_and_track(archive: &Path, layout: &InstallLayout) -> InstallResult<InstallReport> {
    tracing::info!(
        "Extracting {} to {}",
        archive.display(),
        layout.game_dir().display()
    );

    let before = Snapshot::capture(layout);
    let staging = open_archive(archive, layout.game_dir())?;
    let format = staging.format();

    let disposition = resolve_layout(staging.path(), layout)?;
    let relocated = relocate(&disposition, staging.path(), layout);

    if let Err(e) = staging.close() {
        tracing::warn!("Failed to remove temporary extraction directory: {}", e);
    }

    let after = Snapshot::capture(layout);
    let extracted_files = before.new_files(&after);

    match relocated {
        Ok(moved) => tracing::debug!("Moved {} files ({})", moved, disposition),
        Err(source) => {
            tracing::error!(
                "Relocation of {} failed after {} new files: {}",
                archive.display(),
                extracted_files.len(),
                source
            );
            return Err(InstallError::PartialInstall {
                extracted_files,
                source: Box::new(source),
            });
        }
    }
    tracing::info!(
        "Extraction complete for {}: {} new files",
        archive.display(),
        extracted_files.len()
    );

    Ok(InstallReport {
        archive: archive.to_path_buf(),
        format,
        disposition,
        extracted_files,
    })
}

/// One archive to install
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    pub archive_path: PathBuf,
    /// Downloaded file name, used to derive the ledger key
    pub file_name: String,
    pub display_name: String,
    pub source_timestamp: Option<String>,
}

impl InstallRequest {
    /// Request for a local archive, deriving names from the file name
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let archive_path = path.into();
        let file_name = archive_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Self {
            display_name: base_identity(&file_name).to_string(),
            source_timestamp: parse_file_timestamp(&file_name)
                .map(|t| t.format(CACHE_TIMESTAMP_FORMAT).to_string()),
            file_name,
            archive_path,
        }
    }

    pub fn key(&self) -> String {
        archive_key(&self.file_name)
    }
}

/// Installs and uninstalls archives against one game directory, keeping the
/// ledger in sync
pub struct ModInstaller {
    layout: InstallLayout,
    ledger: Mutex<Ledger>,
}

impl ModInstaller {
    pub fn new(layout: InstallLayout, ledger: Ledger) -> Self {
        Self {
            layout,
            ledger: Mutex::new(ledger),
        }
    }

    /// Open the installer with the ledger stored at `ledger_path`
    pub fn open(layout: InstallLayout, ledger_path: impl Into<PathBuf>) -> InstallResult<Self> {
        Ok(Self::new(layout, Ledger::load(ledger_path)?))
    }

    pub fn layout(&self) -> &InstallLayout {
        &self.layout
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` with read access to the ledger
    pub fn with_ledger<R>(&self, f: impl FnOnce(&Ledger) -> R) -> R {
        f(&self.ledger())
    }

    /// Install one archive and record its new files.
    ///
    /// The ledger lock is held from the first snapshot to the ledger write,
    /// so concurrent installs never see each other's files. The ledger is
    /// only written when the install produced new files, including the
    /// files placed before a failed relocation.
    pub fn install(&self, request: &InstallRequest) -> InstallResult<InstallReport> {
        let mut ledger = self.ledger();

        let report = match extract_and_track(&request.archive_path, &self.layout) {
            Ok(report) => report,
            Err(InstallError::PartialInstall {
                extracted_files,
                source,
            }) => {
                record_install(&mut ledger, request, &extracted_files);
                return Err(InstallError::PartialInstall {
                    extracted_files,
                    source,
                });
            }
            Err(e) => return Err(e),
        };

        if report.extracted_files.is_empty() {
            tracing::warn!(
                "No new files detected for {}; ledger unchanged",
                request.file_name
            );
            return Ok(report);
        }

        record_install(&mut ledger, request, &report.extracted_files);
        Ok(report)
    }

    /// Remove every file recorded for `file_name`.
    ///
    /// Directories are never deleted. Paths that cannot be deleted stay in
    /// the ledger entry and the call fails with
    /// [`InstallError::PermissionDenied`].
    pub fn uninstall(&self, file_name: &str) -> InstallResult<UninstallReport> {
        let mut ledger = self.ledger();
        let key = ledger
            .find_by_loose_name(file_name)
            .map(str::to_string)
            .ok_or_else(|| InstallError::NotInstalled(file_name.to_string()))?;
        let Some(mut record) = ledger.get(&key).cloned() else {
            return Err(InstallError::NotInstalled(file_name.to_string()));
        };

        tracing::info!("Uninstalling {} ({} files)", key, record.extracted_files.len());
        let mut report = UninstallReport {
            key: key.clone(),
            ..UninstallReport::default()
        };
        let mut retained = Vec::new();
        let mut first_error = None;

        for path in &record.extracted_files {
            let owners = ledger.other_owners(&key, path);
            if !owners.is_empty() {
                tracing::warn!(
                    "{} is also recorded for {:?}; removing it anyway",
                    path.display(),
                    owners
                );
            }

            match remove_file_safely(path) {
                Ok(Removal::Removed) => report.removed.push(path.clone()),
                Ok(Removal::Missing) => report.missing.push(path.clone()),
                Ok(Removal::Directory) => report.skipped_dirs.push(path.clone()),
                Err(e) => {
                    tracing::error!("Failed to delete {}: {}", path.display(), e);
                    retained.push(path.clone());
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        if retained.is_empty() {
            ledger.remove(&key);
            tracing::info!("Uninstalled {}", key);
        } else {
            record.extracted_files = retained;
            ledger.record(key.clone(), record);
        }
        persist(&ledger);

        match first_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    /// Whether `file_name` (any extension or download time) is installed
    pub fn is_installed(&self, file_name: &str) -> bool {
        self.ledger().find_by_loose_name(file_name).is_some()
    }

    /// Basenames of installed `.archive` payloads
    pub fn list_archive_outputs(&self) -> Vec<String> {
        let suffix = format!(".{}", self.layout.archive_extension());
        self.ledger().list_archive_outputs(&suffix)
    }

    /// Rename an installed `.archive` file inside the archive folder and
    /// update every ledger entry that references it
    pub fn rename_archive_output(&self, old_name: &str, new_name: &str) -> InstallResult<PathBuf> {
        let mut ledger = self.ledger();
        let extension = self.layout.archive_extension();
        let valid = Path::new(new_name)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(extension))
            && Path::new(new_name).file_name().is_some_and(|n| n == new_name);
        if !valid {
            return Err(InstallError::InvalidArchiveName(
                new_name.to_string(),
                extension.to_string(),
            ));
        }

        let old_path = self.layout.archive_folder().join(old_name);
        let new_path = self.layout.archive_folder().join(new_name);
        if !old_path.is_file() {
            return Err(InstallError::ArchiveNotFound(old_path));
        }

        std::fs::rename(&old_path, &new_path).at(&old_path)?;
        tracing::info!("Renamed {} to {}", old_path.display(), new_path.display());

        let changed = ledger.rename_output(old_name, &new_path);
        if changed > 0 {
            persist(&ledger);
        }
        Ok(new_path)
    }
}

/// Record `files` as installed by `request` and save the ledger
fn record_install(ledger: &mut Ledger, request: &InstallRequest, files: &[PathBuf]) {
    if files.is_empty() {
        return;
    }
    let key = request.key();
    ledger.record(
        key.clone(),
        ArchiveRecord {
            display_name: request.display_name.clone(),
            source_timestamp: request.source_timestamp.clone(),
            extracted_files: files.to_vec(),
        },
    );
    persist(ledger);
    tracing::info!("Tracked {} files for {}", files.len(), key);
}

/// Save the ledger, logging failures. The in-memory ledger stays
/// authoritative for the rest of the session.
fn persist(ledger: &Ledger) {
    if let Err(e) = ledger.save() {
        tracing::error!(
            "Failed to write ledger {}: {}",
            ledger.path().display(),
            e
        );
    }
}
