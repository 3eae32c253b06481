//! Blocking install worker fed through channels

use super::{Outcome, Request};
use crate::mods::ModInstaller;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const CHANNEL_CAPACITY: usize = 32;

/// Handle to a running worker
pub struct WorkerHandle {
    requests: mpsc::Sender<Request>,
    outcomes: mpsc::Receiver<Outcome>,
    task: JoinHandle<()>,
}

/// Start the worker on tokio's blocking pool.
///
/// Requests are processed one at a time in the order they were sent, so two
/// batches never touch the game directory at once.
pub fn spawn_worker(installer: Arc<ModInstaller>) -> WorkerHandle {
    let (request_tx, request_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (outcome_tx, outcome_rx) = mpsc::channel(CHANNEL_CAPACITY);

    let task = tokio::task::spawn_blocking(move || run(installer, request_rx, outcome_tx));

    WorkerHandle {
        requests: request_tx,
        outcomes: outcome_rx,
        task,
    }
}

impl WorkerHandle {
    pub async fn submit(&self, request: Request) -> Result<()> {
        self.requests
            .send(request)
            .await
            .context("Install worker has stopped")
    }

    /// Next outcome, or `None` once the worker has exited
    pub async fn next_outcome(&mut self) -> Option<Outcome> {
        self.outcomes.recv().await
    }

    /// Submit a request and collect its outcomes up to the end of the batch
    pub async fn run_batch(&mut self, request: Request) -> Result<Vec<Outcome>> {
        self.submit(request).await?;
        let mut outcomes = Vec::new();
        while let Some(outcome) = self.next_outcome().await {
            if matches!(outcome, Outcome::BatchDone) {
                return Ok(outcomes);
            }
            outcomes.push(outcome);
        }
        anyhow::bail!("Install worker exited before finishing the batch")
    }

    /// Close the request channel and wait for the worker to finish
    pub async fn shutdown(self) -> Result<()> {
        let WorkerHandle {
            requests,
            outcomes,
            task,
        } = self;
        drop(requests);
        drop(outcomes);
        task.await.context("Install worker panicked")
    }
}

fn run(
    installer: Arc<ModInstaller>,
    mut requests: mpsc::Receiver<Request>,
    outcomes: mpsc::Sender<Outcome>,
) {
    while let Some(request) = requests.blocking_recv() {
        match request {
            Request::Install(items) => {
                tracing::info!("Installing {} archives", items.len());
                for item in items {
                    let outcome = match installer.install(&item) {
                        Ok(report) => Outcome::Installed {
                            file_name: item.file_name,
                            report,
                        },
                        Err(error) => {
                            tracing::error!("Failed to install {}: {}", item.file_name, error);
                            Outcome::Failed {
                                file_name: item.file_name,
                                error,
                            }
                        }
                    };
                    if outcomes.blocking_send(outcome).is_err() {
                        return;
                    }
                }
            }
            Request::Uninstall(names) => {
                tracing::info!("Uninstalling {} archives", names.len());
                for file_name in names {
                    let outcome = match installer.uninstall(&file_name) {
                        Ok(report) => Outcome::Uninstalled { file_name, report },
                        Err(error) => {
                            tracing::warn!("Failed to uninstall {}: {}", file_name, error);
                            Outcome::Failed { file_name, error }
                        }
                    };
                    if outcomes.blocking_send(outcome).is_err() {
                        return;
                    }
                }
            }
        }

        if outcomes.blocking_send(Outcome::BatchDone).is_err() {
            return;
        }
    }
    tracing::debug!("Install worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InstallLayout, LayoutConfig};
    use crate::mods::{InstallError, InstallRequest};
    use crate::test_utils::write_zip;
    use tempfile::TempDir;

    #[tokio::test]
    async fn batch_reports_each_archive_then_completes() {
        let tmp = TempDir::new().unwrap();
        let game = tmp.path().join("game");
        std::fs::create_dir_all(&game).unwrap();
        let good = tmp.path().join("good_20240101_120000.zip");
        write_zip(&good, &[("r6/scripts/good.reds", "x")]);
        let bad = tmp.path().join("bad.zip");
        std::fs::write(&bad, "not a zip").unwrap();

        let layout = InstallLayout::new(&game, &LayoutConfig::default());
        let installer =
            Arc::new(ModInstaller::open(layout, tmp.path().join("installed_files.json")).unwrap());
        let mut worker = spawn_worker(Arc::clone(&installer));

        let outcomes = worker
            .run_batch(Request::Install(vec![
                InstallRequest::from_path(&good),
                InstallRequest::from_path(&bad),
            ]))
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(matches!(&outcomes[0], Outcome::Installed { report, .. } if report.extracted_files.len() == 1));
        assert!(matches!(
            &outcomes[1],
            Outcome::Failed { error: InstallError::UnsupportedArchive { .. }, .. }
        ));

        let outcomes = worker
            .run_batch(Request::Uninstall(vec!["good_20240101_120000.zip".to_string()]))
            .await
            .unwrap();
        assert!(matches!(&outcomes[0], Outcome::Uninstalled { .. }));
        assert!(!game.join("r6/scripts/good.reds").exists());

        worker.shutdown().await.unwrap();
    }
}
