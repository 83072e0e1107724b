use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, SystemTime},
};

use serde::Serialize;
use tokio::{sync::watch, task, time};
use tracing::{debug, info, warn};

use crate::claimed::ClaimedFile;
use crate::defaults::DEFAULT_CHECK_INTERVAL;
use crate::lock::{probe_lock, LockProbe};

/// When and how often aged-out directories are removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    max_age: Option<Duration>,
    check_interval: Duration,
}

impl RetentionPolicy {
    /// A zero age disables sweeping; a zero interval falls back to the default.
    pub fn new(max_age: Duration, check_interval: Duration) -> Self {
        let check_interval = if check_interval.is_zero() {
            warn!(
                default = ?DEFAULT_CHECK_INTERVAL,
                "zero retention check interval; using default"
            );
            DEFAULT_CHECK_INTERVAL
        } else {
            check_interval
        };
        Self {
            max_age: (!max_age.is_zero()).then_some(max_age),
            check_interval,
        }
    }

    /// Interprets signed settings: a non-positive age disables sweeping, a
    /// non-positive interval falls back to the default.
    pub fn from_secs(max_age_secs: i64, check_interval_secs: i64) -> Self {
        let max_age = u64::try_from(max_age_secs)
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        let check_interval = match u64::try_from(check_interval_secs) {
            Ok(secs) if secs > 0 => Duration::from_secs(secs),
            _ => {
                warn!(
                    check_interval_secs,
                    default = ?DEFAULT_CHECK_INTERVAL,
                    "non-positive retention check interval; using default"
                );
                DEFAULT_CHECK_INTERVAL
            }
        };
        Self {
            max_age,
            check_interval,
        }
    }

    pub fn disabled() -> Self {
        Self {
            max_age: None,
            check_interval: DEFAULT_CHECK_INTERVAL,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.max_age.is_some()
    }

    pub fn max_age(&self) -> Option<Duration> {
        self.max_age
    }

    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::disabled()
    }
}

/// What one retention pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub removed_dirs: usize,
    pub removed_files: usize,
    pub skipped_locked: usize,
    pub skipped_claimed: usize,
    pub errors: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Removes directories under `directory` that are older than the policy's age.
///
/// Only immediate child directories are candidates; plain files at the top level are
/// never touched. Anything containing the currently claimed file is skipped.
#[derive(Debug, Clone)]
pub struct RetentionSweeper {
    directory: PathBuf,
    policy: RetentionPolicy,
    claimed: ClaimedFile,
}

impl RetentionSweeper {
    pub fn new(
        directory: impl Into<PathBuf>,
        policy: RetentionPolicy,
        claimed: ClaimedFile,
    ) -> Self {
        Self {
            directory: directory.into(),
            policy,
            claimed,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Runs one blocking pass. A disabled policy yields an empty report.
    pub fn sweep_once(&self) -> SweepReport {
        let mut report = SweepReport::default();
        let Some(max_age) = self.policy.max_age else {
            return report;
        };
        let Some(cutoff) = SystemTime::now().checked_sub(max_age) else {
            return report;
        };

        // Entry paths must share the claimed file's canonical form for the skip check.
        let root = match fs::canonicalize(&self.directory) {
            Ok(root) => root,
            Err(error) => {
                warn!(?error, directory = ?self.directory, "failed to resolve retention directory");
                report.errors += 1;
                return report;
            }
        };
        let entries = match fs::read_dir(&root) {
            Ok(entries) => entries,
            Err(error) => {
                warn!(?error, directory = ?root, "failed to list retention directory");
                report.errors += 1;
                return report;
            }
        };

        for entry in entries {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(error) => {
                    warn!(?error, directory = ?root, "failed to read retention entry");
                    report.errors += 1;
                    continue;
                }
            };

            let meta = match fs::symlink_metadata(&path) {
                Ok(meta) => meta,
                Err(error) => {
                    debug!(?error, path = ?path, "retention entry vanished");
                    continue;
                }
            };
            if !meta.is_dir() {
                continue;
            }
            match meta.modified() {
                Ok(modified) if modified < cutoff => {}
                Ok(_) => continue,
                Err(error) => {
                    warn!(?error, path = ?path, "no modification time; keeping directory");
                    report.errors += 1;
                    continue;
                }
            }

            if self.claimed.is_within(&path) {
                debug!(path = ?path, "skipping directory holding the claimed file");
                report.skipped_claimed += 1;
                continue;
            }

            self.remove_tree(&path, &mut report);
        }

        report
    }

    /// Depth-first removal; returns whether `dir` itself is gone.
    fn remove_tree(&self, dir: &Path, report: &mut SweepReport) -> bool {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(error) => {
                warn!(?error, path = ?dir, "failed to list directory for removal");
                report.errors += 1;
                return false;
            }
        };

        let mut complete = true;
        for entry in entries {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(error) => {
                    warn!(?error, path = ?dir, "failed to read directory entry for removal");
                    report.errors += 1;
                    complete = false;
                    continue;
                }
            };
            complete &= self.remove_entry(&path, report);
        }

        if !complete {
            debug!(path = ?dir, "directory not empty after pass; retrying next cycle");
            return false;
        }
        match fs::remove_dir(dir) {
            Ok(()) => {
                report.removed_dirs += 1;
                true
            }
            Err(error) => {
                warn!(?error, path = ?dir, "failed to remove directory");
                report.errors += 1;
                false
            }
        }
    }

    fn remove_entry(&self, path: &Path, report: &mut SweepReport) -> bool {
        let meta = match fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(_) => return true,
        };
        if meta.is_dir() {
            return self.remove_tree(path, report);
        }
        if self.claimed.is_within(path) {
            report.skipped_claimed += 1;
            return false;
        }

        // Links are removed as links; only regular files can be in use by a writer.
        if !meta.file_type().is_symlink() {
            match probe_lock(path) {
                Ok(LockProbe::Unlocked) => {}
                Ok(LockProbe::Missing) => return true,
                Ok(LockProbe::Held) => {
                    info!(path = ?path, "file in use; leaving it for a later retention pass");
                    report.skipped_locked += 1;
                    return false;
                }
                Err(error) => {
                    warn!(?error, path = ?path, "lock probe failed; leaving file in place");
                    report.errors += 1;
                    return false;
                }
            }
        }

        match fs::remove_file(path) {
            Ok(()) => {
                report.removed_files += 1;
                true
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => true,
            Err(error) => {
                warn!(?error, path = ?path, "failed to remove file");
                report.errors += 1;
                false
            }
        }
    }

    /// Starts periodic passes on the tokio runtime, the first one immediately.
    ///
    /// Returns `None` when the policy is disabled. Dropping the handle also stops the
    /// sweeper, but only [`SweeperHandle::stop`] waits for it.
    pub fn start(self) -> Option<SweeperHandle> {
        if !self.policy.is_enabled() {
            debug!(directory = ?self.directory, "retention disabled; sweeper not started");
            return None;
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let interval = self.policy.check_interval;
        let sweeper = Arc::new(self);
        debug!(directory = ?sweeper.directory, ?interval, "retention sweeper started");

        let task = tokio::spawn(async move {
            loop {
                let pass = Arc::clone(&sweeper);
                match task::spawn_blocking(move || pass.sweep_once()).await {
                    Ok(report) if report.is_empty() => {}
                    Ok(report) => {
                        info!(directory = ?sweeper.directory, ?report, "retention pass finished")
                    }
                    Err(error) => warn!(?error, "retention pass panicked"),
                }

                tokio::select! {
                    _ = time::sleep(interval) => {}
                    _ = stop_rx.changed() => break,
                }
            }
            debug!(directory = ?sweeper.directory, "retention sweeper stopped");
        });

        Some(SweeperHandle { stop_tx, task })
    }
}

/// Owner of a running sweeper task.
#[derive(Debug)]
pub struct SweeperHandle {
    stop_tx: watch::Sender<bool>,
    task: task::JoinHandle<()>,
}

impl SweeperHandle {
    /// Interrupts the sleep between passes and waits for an in-progress pass.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(error) = self.task.await {
            warn!(?error, "retention sweeper task failed");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_positive_settings() {
        let disabled = RetentionPolicy::from_secs(0, 60);
        assert!(!disabled.is_enabled());
        assert_eq!(disabled.check_interval(), Duration::from_secs(60));

        let fallback = RetentionPolicy::from_secs(10, -5);
        assert!(fallback.is_enabled());
        assert_eq!(fallback.max_age(), Some(Duration::from_secs(10)));
        assert_eq!(fallback.check_interval(), DEFAULT_CHECK_INTERVAL);

        assert!(!RetentionPolicy::from_secs(-1, 0).is_enabled());
    }

    #[test]
    fn zero_interval_falls_back_to_default() {
        let policy = RetentionPolicy::new(Duration::from_secs(3_600), Duration::ZERO);
        assert!(policy.is_enabled());
        assert_eq!(policy.check_interval(), DEFAULT_CHECK_INTERVAL);

        let disabled = RetentionPolicy::new(Duration::ZERO, Duration::from_secs(5));
        assert!(!disabled.is_enabled());
        assert_eq!(disabled.check_interval(), Duration::from_secs(5));
    }

    #[test]
    fn disabled_policy_sweeps_nothing() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::create_dir(dir.path().join("old")).unwrap();

        let sweeper =
            RetentionSweeper::new(dir.path(), RetentionPolicy::disabled(), ClaimedFile::new());
        assert!(sweeper.sweep_once().is_empty());
        assert!(dir.path().join("old").exists());
        assert!(sweeper.start().is_none());
    }
}
