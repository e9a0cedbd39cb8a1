//! Advisory lock over the backing directory.
//!
//! The presence of a marker file means "locked". Callers poll for its
//! absence at a fixed interval up to a bounded wait, then create it
//! exclusively. The marker records who took it and when. Waiting never
//! depends on that content, but opt-in stale reaping only removes markers
//! it can parse, so a holder it cannot identify is always waited out.
//!
//! The lock is advisory: anyone writing the model without going through
//! [`LockManager`] can corrupt it. It is also unfair. There is no queue,
//! so under constant churn a waiter can time out without ever getting in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::StoreError;
use crate::config::Config;

/// Contents of the lock marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockInfo {
    /// When the lock was taken.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub acquired_at: DateTime<Utc>,
    /// Process holding the lock.
    pub pid: u32,
    /// Token unique to one acquisition.
    pub owner: Uuid,
}

impl LockInfo {
    fn current() -> Self {
        Self {
            acquired_at: Utc::now(),
            pid: std::process::id(),
            owner: Uuid::new_v4(),
        }
    }
}

/// Polls for and creates the lock marker.
#[derive(Debug, Clone)]
pub struct LockManager {
    path: PathBuf,
    poll_interval: Duration,
    timeout: Duration,
    stale_after: Option<Duration>,
}

impl LockManager {
    /// Creates a manager for the marker at `path` with default timings
    /// (100ms poll, 10s bound, no stale reaping).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            poll_interval: Duration::from_millis(100),
            timeout: Duration::from_secs(10),
            stale_after: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.lock_path())
            .with_timing(config.lock_poll_interval(), config.lock_timeout())
            .with_stale_after(config.stale_lock_after())
    }

    pub fn with_timing(mut self, poll_interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.timeout = timeout;
        self
    }

    /// Enables reaping of markers older than `threshold` whose holder
    /// process is no longer alive.
    pub fn with_stale_after(mut self, threshold: Option<Duration>) -> Self {
        self.stale_after = threshold;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether a marker is currently present.
    pub fn is_locked(&self) -> bool {
        self.path.exists()
    }

    /// Reads the current holder, if a marker exists and parses.
    pub fn holder(&self) -> Option<LockInfo> {
        let content = fs::read_to_string(&self.path).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Waits for the marker to disappear, then takes it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LockTimeout`] if the marker is still present
    /// once the bound elapses. The existing marker is left untouched.
    pub async fn acquire(&self) -> Result<LockGuard, StoreError> {
        let started = Instant::now();

        loop {
            if let Some(guard) = self.try_acquire().await? {
                tracing::debug!(
                    path = ?self.path,
                    waited_ms = started.elapsed().as_millis() as u64,
                    "Acquired recommendation lock"
                );
                return Ok(guard);
            }

            if self.reap_if_stale()? {
                continue;
            }

            let waited = started.elapsed();
            if waited >= self.timeout {
                return Err(StoreError::LockTimeout {
                    path: self.path.clone(),
                    waited,
                });
            }

            tracing::debug!(path = ?self.path, "Lock held elsewhere, waiting");
            tokio::time::sleep(self.poll_interval.min(self.timeout - waited)).await;
        }
    }

    /// Takes the lock if no marker is present, without waiting.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker cannot be created or written for a
    /// reason other than already existing.
    pub async fn try_acquire(&self) -> Result<Option<LockGuard>, StoreError> {
        let info = LockInfo::current();

        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(None),
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };

        let content = serde_json::to_string(&info).map_err(StoreError::Encode)?;
        let written = match file.write_all(content.as_bytes()).await {
            Ok(()) => file.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            // The marker is ours but unlabelled; take it back out.
            let _ = fs::remove_file(&self.path);
            return Err(StoreError::io(&self.path, e));
        }

        Ok(Some(LockGuard {
            path: self.path.clone(),
            owner: info.owner,
            released: false,
        }))
    }

    /// Removes the marker regardless of who holds it.
    ///
    /// Returns whether a marker was removed.
    pub fn force_release(&self) -> Result<bool, StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io(&self.path, e)),
        }
    }

    /// Removes the marker if stale reaping is on and the marker qualifies.
    fn reap_if_stale(&self) -> Result<bool, StoreError> {
        let Some(threshold) = self.stale_after else {
            return Ok(false);
        };

        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };

        // Unreadable markers have an unknown holder and are never reaped.
        let Ok(info) = serde_json::from_str::<LockInfo>(&content) else {
            return Ok(false);
        };
        if process_exists(info.pid) {
            return Ok(false);
        }

        let age = Utc::now()
            .signed_duration_since(info.acquired_at)
            .to_std()
            .unwrap_or_default();
        if age < threshold {
            return Ok(false);
        }

        // Only remove the marker we judged; a fresh one may have replaced it.
        match fs::read_to_string(&self.path) {
            Ok(again) if again == content => {}
            _ => return Ok(false),
        }

        tracing::warn!(
            path = ?self.path,
            age_ms = age.as_millis() as u64,
            "Reaping stale recommendation lock"
        );
        self.force_release()
    }
}

/// A held lock. Dropping it releases the lock.
///
/// Release only removes the marker while it still carries this guard's
/// owner token, so a guard never deletes a lock someone else now holds.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    owner: Uuid,
    released: bool,
}

impl LockGuard {
    pub fn owner(&self) -> Uuid {
        self.owner
    }

    /// Releases the lock. A marker that is already gone counts as released.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker exists but cannot be read or removed.
    pub fn release(mut self) -> Result<(), StoreError> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Result<(), StoreError> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };

        let ours = serde_json::from_str::<LockInfo>(&content)
            .map(|info| info.owner == self.owner)
            .unwrap_or(false);
        if !ours {
            tracing::warn!(path = ?self.path, "Lock marker changed hands, leaving it in place");
            return Ok(());
        }

        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(&self.path, e)),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = self.release_inner() {
            tracing::warn!("Failed to release recommendation lock: {}", e);
        }
    }
}

/// Checks if a process with the given PID exists on this machine.
///
/// Uses `kill(pid, 0)`, which probes without sending a signal. A
/// permission error still means the process exists.
pub fn process_exists(pid: u32) -> bool {
    #[cfg(unix)]
    {
        let Ok(pid) = libc::pid_t::try_from(pid) else {
            return false;
        };
        // SAFETY: kill with signal 0 performs only an existence and
        // permission check.
        let rc = unsafe { libc::kill(pid, 0) };
        rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }

    #[cfg(not(unix))]
    {
        // Without a probe, treat every holder as alive so nothing is reaped.
        let _ = pid;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn fast_manager(dir: &Path) -> LockManager {
        LockManager::new(dir.join("test.lock"))
            .with_timing(Duration::from_millis(10), Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_acquire_creates_marker_with_holder() {
        let dir = tempdir().expect("Failed to create temp directory");
        let manager = fast_manager(dir.path());

        let guard = manager.acquire().await.expect("Failed to acquire");
        assert!(manager.is_locked(), "Marker should exist while held");

        let holder = manager.holder().expect("Marker should parse");
        assert_eq!(holder.pid, std::process::id());
        assert_eq!(holder.owner, guard.owner());

        guard.release().expect("Failed to release");
        assert!(!manager.is_locked(), "Marker should be gone after release");
    }

    #[tokio::test]
    async fn test_drop_releases_lock() {
        let dir = tempdir().expect("Failed to create temp directory");
        let manager = fast_manager(dir.path());

        {
            let _guard = manager.acquire().await.expect("Failed to acquire");
            assert!(manager.is_locked());
        }

        assert!(!manager.is_locked(), "Dropping the guard should release");
    }

    #[tokio::test]
    async fn test_try_acquire_fails_while_held() {
        let dir = tempdir().expect("Failed to create temp directory");
        let manager = fast_manager(dir.path());

        let _guard = manager.acquire().await.expect("Failed to acquire");
        let second = manager.try_acquire().await.expect("Should not error");
        assert!(second.is_none(), "Second acquire should see the marker");
    }

    #[tokio::test]
    async fn test_timeout_leaves_foreign_marker_untouched() {
        let dir = tempdir().expect("Failed to create temp directory");
        let manager = fast_manager(dir.path());
        fs::write(manager.path(), "1700000000000").expect("Failed to write marker");

        let started = Instant::now();
        let result = manager.acquire().await;

        match result {
            Err(StoreError::LockTimeout { waited, .. }) => {
                assert!(waited >= Duration::from_millis(200));
            }
            other => panic!("Expected LockTimeout, got: {other:?}"),
        }
        assert!(started.elapsed() < Duration::from_secs(2), "Should respect the bound");

        let content = fs::read_to_string(manager.path()).expect("Marker should still exist");
        assert_eq!(content, "1700000000000", "Marker should be left exactly as found");
    }

    #[tokio::test]
    async fn test_release_is_idempotent_when_marker_missing() {
        let dir = tempdir().expect("Failed to create temp directory");
        let manager = fast_manager(dir.path());

        let guard = manager.acquire().await.expect("Failed to acquire");
        fs::remove_file(manager.path()).expect("Failed to remove marker");

        guard.release().expect("Missing marker should count as released");
    }

    #[tokio::test]
    async fn test_release_keeps_marker_owned_by_someone_else() {
        let dir = tempdir().expect("Failed to create temp directory");
        let manager = fast_manager(dir.path());

        let guard = manager.acquire().await.expect("Failed to acquire");
        let foreign = LockInfo::current();
        fs::write(
            manager.path(),
            serde_json::to_string(&foreign).expect("Failed to serialize"),
        )
        .expect("Failed to overwrite marker");

        guard.release().expect("Failed to release");
        assert!(manager.is_locked(), "Foreign marker must survive our release");
        assert_eq!(manager.holder().map(|h| h.owner), Some(foreign.owner));
    }

    #[tokio::test]
    async fn test_stale_marker_from_dead_process_is_reaped() {
        let dir = tempdir().expect("Failed to create temp directory");
        let manager = fast_manager(dir.path()).with_stale_after(Some(Duration::from_secs(60)));

        let stale = LockInfo {
            acquired_at: Utc::now() - chrono::Duration::hours(1),
            pid: 999_999_999,
            owner: Uuid::new_v4(),
        };
        fs::write(
            manager.path(),
            serde_json::to_string(&stale).expect("Failed to serialize"),
        )
        .expect("Failed to write marker");

        let guard = manager.acquire().await.expect("Stale marker should be reaped");
        assert_ne!(manager.holder().map(|h| h.owner), Some(stale.owner));
        drop(guard);
    }

    #[tokio::test]
    async fn test_fresh_marker_is_not_reaped() {
        let dir = tempdir().expect("Failed to create temp directory");
        let manager = fast_manager(dir.path()).with_stale_after(Some(Duration::from_secs(60)));

        let fresh = LockInfo {
            acquired_at: Utc::now(),
            pid: 999_999_999,
            owner: Uuid::new_v4(),
        };
        fs::write(
            manager.path(),
            serde_json::to_string(&fresh).expect("Failed to serialize"),
        )
        .expect("Failed to write marker");

        let result = manager.acquire().await;
        assert!(matches!(result, Err(StoreError::LockTimeout { .. })));
        assert_eq!(manager.holder().map(|h| h.owner), Some(fresh.owner));
    }

    #[tokio::test]
    async fn test_marker_with_unknown_holder_is_not_reaped() {
        let dir = tempdir().expect("Failed to create temp directory");
        let manager = fast_manager(dir.path()).with_stale_after(Some(Duration::from_millis(1)));

        for content in ["1700000000000", "", "held by hand"] {
            fs::write(manager.path(), content).expect("Failed to write marker");

            let result = manager.acquire().await;
            assert!(
                matches!(result, Err(StoreError::LockTimeout { .. })),
                "Marker {content:?} should not be reaped"
            );
            assert_eq!(
                fs::read_to_string(manager.path()).expect("Marker should remain"),
                content
            );
        }
    }

    #[tokio::test]
    async fn test_old_marker_from_live_process_is_not_reaped() {
        let dir = tempdir().expect("Failed to create temp directory");
        let manager = fast_manager(dir.path()).with_stale_after(Some(Duration::from_millis(1)));

        let live = LockInfo {
            acquired_at: Utc::now() - chrono::Duration::hours(1),
            pid: std::process::id(),
            owner: Uuid::new_v4(),
        };
        fs::write(
            manager.path(),
            serde_json::to_string(&live).expect("Failed to serialize"),
        )
        .expect("Failed to write marker");

        let result = manager.acquire().await;
        assert!(matches!(result, Err(StoreError::LockTimeout { .. })));
    }

    #[test]
    fn test_force_release() {
        let dir = tempdir().expect("Failed to create temp directory");
        let manager = fast_manager(dir.path());

        assert!(!manager.force_release().expect("Should not error"));
        fs::write(manager.path(), "x").expect("Failed to write marker");
        assert!(manager.force_release().expect("Should not error"));
        assert!(!manager.is_locked());
    }

    #[test]
    fn test_process_exists_for_self() {
        assert!(process_exists(std::process::id()));
    }
}
