//! File-mtime polling watcher for the data file.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Notification that the data file's mtime moved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChanged {
    pub path: PathBuf,
}

/// Polling-based data file watcher.
pub struct DataFileWatcher {
    path: PathBuf,
    poll_interval: Duration,
    last_mtime: Option<SystemTime>,
}

impl DataFileWatcher {
    pub fn new(path: PathBuf, poll_interval: Duration) -> Self {
        Self {
            path,
            poll_interval,
            last_mtime: None,
        }
    }

    /// Poll until shutdown is signalled, the shutdown sender is dropped, or
    /// the event receiver goes away.
    ///
    /// A file that disappears is remembered as absent, so recreating it
    /// counts as a change even if the new mtime equals the old one.
    pub async fn watch(
        mut self,
        tx: mpsc::UnboundedSender<FileChanged>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        self.last_mtime = read_mtime(&self.path);
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        debug!("Shutdown sender dropped, stopping data file watcher");
                        return;
                    }
                    if *shutdown_rx.borrow_and_update() {
                        info!("Data file watcher shutting down");
                        return;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            if self.poll() && !self.notify(&tx) {
                warn!("Data file watcher receiver dropped, stopping watcher");
                return;
            }
        }
    }

    /// Re-read the mtime and report whether the file changed since the last poll.
    fn poll(&mut self) -> bool {
        let current = read_mtime(&self.path);
        match (std::mem::replace(&mut self.last_mtime, current), current) {
            (Some(prev), Some(next)) => next != prev,
            (None, Some(_)) => true,
            (Some(_), None) => {
                // The repository keeps serving the last snapshot meanwhile.
                debug!(path = %self.path.display(), "Data file disappeared");
                false
            }
            (None, None) => false,
        }
    }

    fn notify(&self, tx: &mpsc::UnboundedSender<FileChanged>) -> bool {
        debug!(path = %self.path.display(), "Data file changed");
        tx.send(FileChanged {
            path: self.path.clone(),
        })
        .is_ok()
    }
}

fn read_mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).ok().and_then(|m| m.modified().ok())
}
