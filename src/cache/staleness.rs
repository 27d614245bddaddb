//! Sync markers and staleness checking for mirrors.
//!
//! A marker is written next to (not inside) each mirror after every successful
//! sync. It is the only record of when a mirror was last synchronized and which
//! ref it has checked out; a failed sync never touches it.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Global counter for unique temp file names within a process
static WRITE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Persisted record of the last successful sync of a mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMarker {
    /// Milliseconds since the Unix epoch.
    pub synced_at_ms: u64,
    /// Ref the mirror has checked out (may be the fallback ref).
    pub checked_out_ref: String,
    /// HEAD commit after the sync, when the transport could resolve it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
}

impl SyncMarker {
    /// Wall-clock time of the sync.
    pub fn synced_at(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(self.synced_at_ms)
    }
}

/// Where a mirror sits in its lifecycle, as seen at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorState {
    /// No git checkout exists at the mirror directory yet.
    NeverSynced,
    /// Synced no longer than `max_age` ago.
    Fresh { age: Duration },
    /// Synced longer than `max_age` ago, or the marker is missing/unreadable.
    Stale { age: Option<Duration> },
}

impl MirrorState {
    /// Compute the state of a mirror from what is on disk.
    pub fn evaluate(
        mirror_exists: bool,
        marker: Option<&SyncMarker>,
        now: SystemTime,
        max_age: Duration,
    ) -> Self {
        if !mirror_exists {
            return MirrorState::NeverSynced;
        }

        match marker {
            Some(marker) => {
                let age = age_at(marker.synced_at(), now);
                if is_stale(age, max_age) {
                    MirrorState::Stale { age: Some(age) }
                } else {
                    MirrorState::Fresh { age }
                }
            }
            None => MirrorState::Stale { age: None },
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, MirrorState::Fresh { .. })
    }
}

/// Age of a sync at `now`. A timestamp in the future (clock skew) counts as age zero.
pub fn age_at(synced_at: SystemTime, now: SystemTime) -> Duration {
    now.duration_since(synced_at).unwrap_or(Duration::ZERO)
}

/// A mirror is stale only when strictly older than `max_age`; an age equal to
/// `max_age` is still fresh.
pub fn is_stale(age: Duration, max_age: Duration) -> bool {
    age > max_age
}

/// Timestamp to record for a sync completing at `now`.
///
/// Always strictly greater than the previous marker's timestamp, even if the
/// clock went backwards or two syncs land in the same millisecond.
pub fn next_sync_stamp(previous: Option<&SyncMarker>, now: SystemTime) -> u64 {
    let now_ms = now
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);

    match previous {
        Some(prev) => now_ms.max(prev.synced_at_ms.saturating_add(1)),
        None => now_ms,
    }
}

/// Read a sync marker, returning None if it is missing or cannot be parsed.
pub fn read_marker(path: &Path) -> Option<SyncMarker> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
        Err(e) => {
            log::warn!("Failed to read sync marker {}: {}", path.display(), e);
            return None;
        }
    };

    match serde_json::from_str(&contents) {
        Ok(marker) => Some(marker),
        Err(e) => {
            log::warn!(
                "Ignoring corrupt sync marker {} ({}), mirror will be refreshed",
                path.display(),
                e
            );
            None
        }
    }
}

/// Atomically write a sync marker: write a temp file, then rename it over the target.
///
/// Readers never observe a half-written marker.
pub fn write_marker(path: &Path, marker: &SyncMarker) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_vec_pretty(marker)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    let counter = WRITE_COUNTER.fetch_add(1, Ordering::Relaxed);
    let temp_path = path.with_extension(format!("tmp.{}.{}", std::process::id(), counter));

    fs::write(&temp_path, json)?;
    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    Ok(())
}
