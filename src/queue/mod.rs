//! Install/uninstall work queue
//!
//! Filesystem-heavy operations run on a dedicated blocking worker. Callers
//! send [`Request`]s and receive one [`Outcome`] per archive followed by
//! [`Outcome::BatchDone`].

pub mod processor;

pub use processor::{spawn_worker, WorkerHandle};

use crate::mods::{InstallError, InstallReport, InstallRequest, UninstallReport};

/// Work submitted to the install worker
#[derive(Debug, Clone)]
pub enum Request {
    Install(Vec<InstallRequest>),
    /// Downloaded file names to uninstall
    Uninstall(Vec<String>),
}

/// Result of one archive in a batch
#[derive(Debug)]
pub enum Outcome {
    Installed {
        file_name: String,
        report: InstallReport,
    },
    Uninstalled {
        file_name: String,
        report: UninstallReport,
    },
    Failed {
        file_name: String,
        error: InstallError,
    },
    /// Every item of the current request has been processed
    BatchDone,
}

impl Outcome {
    pub fn file_name(&self) -> Option<&str> {
        match self {
            Outcome::Installed { file_name, .. }
            | Outcome::Uninstalled { file_name, .. }
            | Outcome::Failed { file_name, .. } => Some(file_name),
            Outcome::BatchDone => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed { .. })
    }
}
