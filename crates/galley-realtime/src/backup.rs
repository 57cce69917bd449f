//! # Backup Scheduler
//!
//! Writes an opportunistic database copy after orders commit.
//!
//! ```text
//! place_order ──notify()──► [ cap-1 channel ] ──► scheduler task
//!                 (never blocks)     │                 │
//!                                    │          wait debounce window
//!                                    │          drain extra notifies
//!                                    │                 │
//!                                    └────────► VACUUM INTO dir/galley-<ts>.db
//!                                               prune to the newest `keep`
//! ```
//!
//! A burst of orders inside one debounce window produces a single backup.
//! Failures are logged and never reach the order path.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use galley_db::Database;

use crate::config::BackupSettings;
use crate::error::{RealtimeError, RealtimeResult};

/// Cheap handle used to request a backup.
#[derive(Debug, Clone)]
pub struct BackupHandle {
    tx: mpsc::Sender<()>,
    stopped: Arc<AtomicBool>,
}

impl BackupHandle {
    /// Requests a backup. Coalesces with any request already pending.
    pub fn notify(&self) {
        match self.tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Closed(())) => {
                if !self.stopped.swap(true, Ordering::Relaxed) {
                    warn!("Backup scheduler is not running, backups are disabled");
                }
            }
        }
    }
}

/// Debounced background backup task.
pub struct BackupScheduler {
    db: Database,
    dir: PathBuf,
    debounce: Duration,
    keep: usize,
}

impl BackupScheduler {
    /// Returns `None` when no backup directory is configured.
    pub fn new(db: Database, settings: &BackupSettings) -> Option<Self> {
        let dir = settings.dir.clone()?;
        Some(BackupScheduler {
            db,
            dir,
            debounce: Duration::from_secs(settings.debounce_secs),
            keep: settings.keep.max(1),
        })
    }

    /// Spawns the scheduler loop. It ends when every handle is dropped.
    pub fn start(self) -> (BackupHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(1);
        let task = tokio::spawn(self.run(rx));
        let handle = BackupHandle {
            tx,
            stopped: Arc::new(AtomicBool::new(false)),
        };
        (handle, task)
    }

    async fn run(self, mut rx: mpsc::Receiver<()>) {
        info!(dir = %self.dir.display(), debounce = ?self.debounce, "Backup scheduler started");

        while rx.recv().await.is_some() {
            if !self.debounce.is_zero() {
                tokio::time::sleep(self.debounce).await;
            }
            while rx.try_recv().is_ok() {}

            if let Err(e) = self.backup_now().await {
                error!(error = %e, "Backup failed");
            }
        }

        debug!("Backup scheduler stopped");
    }

    /// Writes one backup immediately, prunes old copies and returns the
    /// new copy's path.
    pub async fn backup_now(&self) -> RealtimeResult<PathBuf> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| RealtimeError::Internal(format!("backup dir: {e}")))?;

        let target = backup_path(&self.dir);
        self.db.backup_to(&target).await?;

        match self.prune().await {
            Ok(0) => {}
            Ok(removed) => debug!(removed, keep = self.keep, "Old backups pruned"),
            Err(e) => warn!(error = %e, "Could not prune old backups"),
        }
        Ok(target)
    }

    /// Deletes all but the newest `keep` copies. Returns how many were removed.
    async fn prune(&self) -> RealtimeResult<usize> {
        let io = |e: std::io::Error| RealtimeError::Internal(format!("backup prune: {e}"));

        let mut copies = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(io)?;
        while let Some(entry) = entries.next_entry().await.map_err(io)? {
            let path = entry.path();
            if is_backup_file(&path) {
                copies.push(path);
            }
        }

        // timestamped names sort chronologically
        copies.sort();
        let excess = copies.len().saturating_sub(self.keep);
        for path in &copies[..excess] {
            tokio::fs::remove_file(path).await.map_err(io)?;
        }
        Ok(excess)
    }
}

fn is_backup_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with("galley-") && name.ends_with(".db"))
}

fn backup_path(dir: &Path) -> PathBuf {
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3f");
    dir.join(format!("galley-{stamp}.db"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use galley_db::DbConfig;

    async fn file_db(dir: &Path) -> Database {
        Database::new(DbConfig::new(dir.join("kitchen.db"))).await.unwrap()
    }

    fn backups_in(dir: &Path) -> Vec<PathBuf> {
        match std::fs::read_dir(dir) {
            Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
            Err(_) => Vec::new(),
        }
    }

    #[test]
    fn test_disabled_without_dir() {
        let settings = BackupSettings::default();
        assert!(settings.dir.is_none());
    }

    #[tokio::test]
    async fn test_backup_now_writes_copy() {
        let data = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let db = file_db(data.path()).await;

        let scheduler = BackupScheduler::new(
            db,
            &BackupSettings {
                dir: Some(out.path().join("nested")),
                debounce_secs: 0,
                keep: 5,
            },
        )
        .unwrap();

        let path = scheduler.backup_now().await.unwrap();
        assert!(path.exists());
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("galley-"));
    }

    #[tokio::test]
    async fn test_notify_burst_produces_backup() {
        let data = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let db = file_db(data.path()).await;

        let (handle, task) = BackupScheduler::new(
            db,
            &BackupSettings {
                dir: Some(out.path().to_path_buf()),
                debounce_secs: 0,
                keep: 5,
            },
        )
        .unwrap()
        .start();

        for _ in 0..3 {
            handle.notify();
        }

        let mut found = Vec::new();
        for _ in 0..100 {
            found = backups_in(out.path());
            if !found.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(!found.is_empty());
        assert!(found.len() <= 2);

        drop(handle);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_old_backups_are_pruned() {
        let data = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let db = file_db(data.path()).await;
        std::fs::write(out.path().join("notes.txt"), "keep me").unwrap();

        let scheduler = BackupScheduler::new(
            db,
            &BackupSettings {
                dir: Some(out.path().to_path_buf()),
                debounce_secs: 0,
                keep: 2,
            },
        )
        .unwrap();

        let mut written = Vec::new();
        for _ in 0..4 {
            written.push(scheduler.backup_now().await.unwrap());
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let mut remaining: Vec<PathBuf> = backups_in(out.path())
            .into_iter()
            .filter(|p| is_backup_file(p))
            .collect();
        remaining.sort();
        assert_eq!(remaining, written[2..].to_vec());
        assert!(out.path().join("notes.txt").exists());
    }

    #[tokio::test]
    async fn test_notify_after_scheduler_stopped() {
        let data = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let db = file_db(data.path()).await;

        let (handle, task) = BackupScheduler::new(
            db,
            &BackupSettings {
                dir: Some(out.path().to_path_buf()),
                debounce_secs: 0,
                keep: 5,
            },
        )
        .unwrap()
        .start();

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        assert!(!handle.stopped.load(Ordering::Relaxed));
        handle.notify();
        handle.notify();
        assert!(handle.stopped.load(Ordering::Relaxed));
    }
}
