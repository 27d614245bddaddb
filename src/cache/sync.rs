//! Mirror synchronization manager
//!
//! `SyncManager` owns every mutation of on-disk mirror state. It decides whether a
//! mirror is fresh enough to serve, clones or refreshes it otherwise, coalesces
//! concurrent syncs of the same mirror, and hands out read access so scans never
//! observe a half checked-out tree.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;

use super::git::{GitError, GitTransport};
use super::lock::MirrorLock;
use super::paths::CachePaths;
use super::staleness::{MirrorState, SyncMarker, next_sync_stamp, read_marker, write_marker};
use crate::types::MirrorKey;

/// Default staleness threshold (24 hours).
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Conventional default branch tried when the preferred ref does not exist.
pub const FALLBACK_REF: &str = "master";

/// The ref to try after `preferred` turned out not to exist remotely.
pub fn fallback_ref(preferred: &str) -> &'static str {
    if preferred == FALLBACK_REF {
        "main"
    } else {
        FALLBACK_REF
    }
}

/// Errors returned by sync operations.
///
/// Only a mirror that never existed can fail a sync; refresh failures of an existing
/// mirror are reported as [`SyncOutcome::ServedStale`] instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The initial clone was impossible.
    #[error("repository {remote} is unavailable: {reason}")]
    RepoUnavailable { remote: String, reason: String },
}

/// What one call to [`SyncManager::ensure_fresh`] did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// The mirror was within the staleness window; no network access happened.
    AlreadyFresh,
    /// The mirror did not exist and was cloned.
    Cloned,
    /// The mirror was stale and has been fetched and checked out again.
    Refreshed,
    /// The mirror was stale but the refresh failed; the old content is served.
    ServedStale { reason: String },
}

/// Result of a sync, describing the mirror as it is now on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub mirror: PathBuf,
    #[serde(flatten)]
    pub outcome: SyncOutcome,
    pub checked_out_ref: Option<String>,
    pub commit: Option<String>,
    pub synced_at_ms: Option<u64>,
}

impl SyncReport {
    fn new(mirror: PathBuf, outcome: SyncOutcome, marker: Option<&SyncMarker>) -> Self {
        Self {
            mirror,
            outcome,
            checked_out_ref: marker.map(|m| m.checked_out_ref.clone()),
            commit: marker.and_then(|m| m.commit.clone()),
            synced_at_ms: marker.map(|m| m.synced_at_ms),
        }
    }

    /// Whether the caller is being served content older than requested.
    pub fn is_stale(&self) -> bool {
        matches!(self.outcome, SyncOutcome::ServedStale { .. })
    }
}

/// Everything needed to bring one mirror up to date.
#[derive(Debug, Clone, Copy)]
pub struct SyncRequest<'a> {
    pub key: &'a MirrorKey,
    pub remote: &'a str,
    pub preferred_ref: &'a str,
    pub max_age: Duration,
}

/// Per-mirror coordination state.
#[derive(Default)]
struct MirrorSlot {
    flight: Mutex<Flight>,
    landed: Condvar,
    /// Held shared by scans/reads, exclusively by syncs.
    tree: RwLock<()>,
}

#[derive(Default)]
struct Flight {
    in_progress: bool,
    epoch: u64,
    last: Option<Result<SyncReport, SyncError>>,
}

/// Marks a sync as finished when dropped, even if the sync panicked.
struct FlightGuard<'a> {
    slot: &'a MirrorSlot,
    result: Option<Result<SyncReport, SyncError>>,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        let mut flight = lock(&self.slot.flight);
        flight.in_progress = false;
        flight.epoch = flight.epoch.wrapping_add(1);
        flight.last = self.result.take();
        self.slot.landed.notify_all();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

type Clock = Arc<dyn Fn() -> SystemTime + Send + Sync>;

/// Keeps local mirrors of documentation repositories fresh.
pub struct SyncManager {
    paths: CachePaths,
    transport: Arc<dyn GitTransport>,
    slots: DashMap<MirrorKey, Arc<MirrorSlot>>,
    clock: Clock,
}

impl SyncManager {
    /// Create a manager rooted at the provided paths, using `transport` for git.
    pub fn new(paths: CachePaths, transport: Arc<dyn GitTransport>) -> Self {
        Self {
            paths,
            transport,
            slots: DashMap::new(),
            clock: Arc::new(SystemTime::now),
        }
    }

    /// Replace the wall clock used for staleness decisions.
    pub fn with_clock(mut self, clock: impl Fn() -> SystemTime + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Return the storage paths used by this manager.
    pub fn paths(&self) -> &CachePaths {
        &self.paths
    }

    /// Local directory of a mirror.
    pub fn mirror_dir(&self, key: &MirrorKey) -> PathBuf {
        self.paths.mirror_dir(key)
    }

    /// Current lifecycle state of a mirror, without touching the network.
    pub fn state(&self, key: &MirrorKey, max_age: Duration) -> MirrorState {
        let marker = read_marker(&self.paths.marker_path(key));
        MirrorState::evaluate(
            self.transport.is_checkout(&self.paths.mirror_dir(key)),
            marker.as_ref(),
            (self.clock)(),
            max_age,
        )
    }

    /// Ensure the mirror exists and is no older than `request.max_age`.
    ///
    /// This will:
    /// 1. Clone if not present (preferred ref, then the fallback ref)
    /// 2. Refresh if stale, serving the old mirror if the refresh fails
    /// 3. Return immediately if fresh
    ///
    /// Concurrent calls for the same mirror share one sync.
    pub fn ensure_fresh(&self, request: &SyncRequest<'_>) -> Result<SyncReport, SyncError> {
        self.coalesced_sync(request, false)
    }

    /// Sync a mirror regardless of its age.
    pub fn force_sync(&self, request: &SyncRequest<'_>) -> Result<SyncReport, SyncError> {
        self.coalesced_sync(request, true)
    }

    /// Run `f` on the mirror directory while no sync can modify it.
    pub fn read_tree<T>(&self, key: &MirrorKey, f: impl FnOnce(&Path) -> T) -> T {
        let slot = self.slot(key);
        let _guard = slot.tree.read().unwrap_or_else(PoisonError::into_inner);
        f(&self.paths.mirror_dir(key))
    }

    fn slot(&self, key: &MirrorKey) -> Arc<MirrorSlot> {
        Arc::clone(self.slots.entry(key.clone()).or_default().value())
    }

    fn coalesced_sync(
        &self,
        request: &SyncRequest<'_>,
        force: bool,
    ) -> Result<SyncReport, SyncError> {
        let key = request.key;
        let slot = self.slot(key);

        loop {
            let mut flight = lock(&slot.flight);

            if flight.in_progress {
                log::debug!("Sync of {} already in flight, waiting", key);
                let epoch = flight.epoch;
                while flight.epoch == epoch {
                    flight = slot
                        .landed
                        .wait(flight)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                match flight.last.clone() {
                    Some(result) => return result,
                    // The other sync panicked; try again ourselves.
                    None => continue,
                }
            }

            if !force {
                if let Some(report) = self.fresh_report(request) {
                    return Ok(report);
                }
            }

            flight.in_progress = true;
            drop(flight);

            let mut guard = FlightGuard {
                slot: &slot,
                result: None,
            };
            let result = self.sync_exclusive(&slot, request, force);
            guard.result = Some(result.clone());
            return result;
        }
    }

    /// Report for a mirror that is fresh, or None if it needs a sync.
    fn fresh_report(&self, request: &SyncRequest<'_>) -> Option<SyncReport> {
        let key = request.key;
        let marker = read_marker(&self.paths.marker_path(key));
        let mirror = self.paths.mirror_dir(key);
        let state = MirrorState::evaluate(
            self.transport.is_checkout(&mirror),
            marker.as_ref(),
            (self.clock)(),
            request.max_age,
        );

        if let MirrorState::Fresh { age } = state {
            log::debug!("Mirror {} is fresh ({:?} old), skipping sync", key, age);
            Some(SyncReport::new(
                mirror,
                SyncOutcome::AlreadyFresh,
                marker.as_ref(),
            ))
        } else {
            None
        }
    }

    fn sync_exclusive(
        &self,
        slot: &MirrorSlot,
        request: &SyncRequest<'_>,
        force: bool,
    ) -> Result<SyncReport, SyncError> {
        let key = request.key;
        let _tree = slot.tree.write().unwrap_or_else(PoisonError::into_inner);
        let mirror = self.paths.mirror_dir(key);

        let lock_result = MirrorLock::acquire(&self.paths, key);

        // Another process may have synced while we waited for the lock.
        if !force && lock_result.is_ok() {
            if let Some(report) = self.fresh_report(request) {
                return Ok(report);
            }
        }

        if !self.transport.is_checkout(&mirror) {
            let _lock = lock_result.map_err(|e| SyncError::RepoUnavailable {
                remote: request.remote.to_string(),
                reason: e.to_string(),
            })?;
            if mirror.exists() {
                log::warn!(
                    "{} is not a git checkout, replacing it with a fresh clone",
                    mirror.display()
                );
                remove_partial_clone(&mirror);
            }
            return self.initial_clone(request, &mirror);
        }

        let previous = read_marker(&self.paths.marker_path(key));
        match lock_result {
            Ok(_lock) => Ok(self.refresh(request, &mirror, previous)),
            Err(e) => Ok(self.serve_stale(
                request,
                mirror,
                previous,
                e.to_string(),
            )),
        }
    }

    fn initial_clone(
        &self,
        request: &SyncRequest<'_>,
        mirror: &Path,
    ) -> Result<SyncReport, SyncError> {
        let key = request.key;
        let fallback = fallback_ref(request.preferred_ref);
        // A marker can outlive its checkout; keep stamps increasing across it.
        let previous = read_marker(&self.paths.marker_path(key));

        for git_ref in [request.preferred_ref, fallback] {
            log::info!("Cloning {} ({}) for {}", request.remote, git_ref, key);
            match self.transport.clone_ref(request.remote, git_ref, mirror) {
                Ok(()) => {
                    let marker = self.record_sync(key, mirror, git_ref, previous.as_ref());
                    return Ok(SyncReport::new(
                        mirror.to_path_buf(),
                        SyncOutcome::Cloned,
                        marker.as_ref(),
                    ));
                }
                Err(GitError::RefNotFound(missing)) => {
                    remove_partial_clone(mirror);
                    log::warn!(
                        "Ref '{}' not found on {}, trying next candidate",
                        missing,
                        request.remote
                    );
                }
                Err(e) => {
                    remove_partial_clone(mirror);
                    log::error!("Clone of {} for {} failed: {}", request.remote, key, e);
                    return Err(SyncError::RepoUnavailable {
                        remote: request.remote.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        Err(SyncError::RepoUnavailable {
            remote: request.remote.to_string(),
            reason: format!(
                "neither '{}' nor '{}' exists on the remote",
                request.preferred_ref, fallback
            ),
        })
    }

    fn refresh(
        &self,
        request: &SyncRequest<'_>,
        mirror: &Path,
        previous: Option<SyncMarker>,
    ) -> SyncReport {
        let key = request.key;
        let fallback = fallback_ref(request.preferred_ref);
        let mut last_error = None;

        for git_ref in [request.preferred_ref, fallback] {
            log::info!("Refreshing {} ({}) from {}", key, git_ref, request.remote);
            match self.transport.update_ref(mirror, git_ref) {
                Ok(()) => {
                    let marker = self.record_sync(key, mirror, git_ref, previous.as_ref());
                    return SyncReport::new(
                        mirror.to_path_buf(),
                        SyncOutcome::Refreshed,
                        marker.as_ref(),
                    );
                }
                Err(GitError::RefNotFound(missing)) => {
                    log::warn!(
                        "Ref '{}' not found on {}, trying next candidate",
                        missing,
                        request.remote
                    );
                    last_error = Some(GitError::RefNotFound(missing));
                }
                Err(e) => {
                    last_error = Some(e);
                    break;
                }
            }
        }

        let reason = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "refresh failed".to_string());
        self.serve_stale(request, mirror.to_path_buf(), previous, reason)
    }

    fn serve_stale(
        &self,
        request: &SyncRequest<'_>,
        mirror: PathBuf,
        previous: Option<SyncMarker>,
        reason: String,
    ) -> SyncReport {
        log::warn!(
            "Could not refresh {} from {}: {}; serving existing mirror",
            request.key,
            request.remote,
            reason
        );
        SyncReport::new(
            mirror,
            SyncOutcome::ServedStale { reason },
            previous.as_ref(),
        )
    }

    /// Write the marker for a successful sync. A failed write is logged; the mirror
    /// then simply counts as stale on the next call.
    fn record_sync(
        &self,
        key: &MirrorKey,
        mirror: &Path,
        git_ref: &str,
        previous: Option<&SyncMarker>,
    ) -> Option<SyncMarker> {
        let marker = SyncMarker {
            synced_at_ms: next_sync_stamp(previous, (self.clock)()),
            checked_out_ref: git_ref.to_string(),
            commit: self.transport.head_commit(mirror),
        };

        match write_marker(&self.paths.marker_path(key), &marker) {
            Ok(()) => Some(marker),
            Err(e) => {
                log::warn!("Failed to record sync of {}: {}", key, e);
                None
            }
        }
    }
}

fn remove_partial_clone(path: &Path) {
    if path.exists() && std::fs::remove_dir_all(path).is_err() {
        let _ = std::fs::remove_file(path);
    }
}
