//! Cross-process mirror locks.
//!
//! Each mirror has a lock file under `{root}/locks`. A process holds the advisory
//! lock for the whole clone or fetch, so two processes sharing a storage root never
//! run git against the same checkout at once. While held, the file names the holder.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;
use thiserror::Error;

use super::paths::CachePaths;
use crate::types::MirrorKey;

/// How long a sync waits for another process before giving up.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5 * 60);

const FIRST_BACKOFF: Duration = Duration::from_millis(10);
const MAX_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Error, Debug)]
pub enum LockError {
    #[error("gave up after {waited:?} waiting for another sync of {key}")]
    TimedOut { key: String, waited: Duration },

    #[error("lock file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Exclusive lock on one mirror, released on drop.
#[derive(Debug)]
pub struct MirrorLock {
    file: File,
    path: PathBuf,
}

impl MirrorLock {
    /// Block until the mirror's lock is free, for at most [`DEFAULT_LOCK_TIMEOUT`].
    pub fn acquire(paths: &CachePaths, key: &MirrorKey) -> Result<Self, LockError> {
        Self::acquire_within(paths, key, DEFAULT_LOCK_TIMEOUT)
    }

    /// Block until the mirror's lock is free, polling with exponential backoff.
    pub fn acquire_within(
        paths: &CachePaths,
        key: &MirrorKey,
        timeout: Duration,
    ) -> Result<Self, LockError> {
        let path = paths.lock_path(key);
        let file = open_lock_file(&path)?;
        let started = Instant::now();
        let mut backoff = FIRST_BACKOFF;

        while !try_lock(&file, &path)? {
            let waited = started.elapsed();
            if waited >= timeout {
                return Err(LockError::TimedOut {
                    key: key.to_string(),
                    waited,
                });
            }
            if backoff == FIRST_BACKOFF {
                log::debug!("Mirror {} is locked by another process, waiting", key);
            }
            thread::sleep(backoff.min(timeout - waited));
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }

        Ok(Self::held(file, path, key))
    }

    /// Description of the current holder, if the mirror is locked.
    pub fn holder(paths: &CachePaths, key: &MirrorKey) -> Option<String> {
        let mut content = String::new();
        File::open(paths.lock_path(key))
            .and_then(|mut file| file.read_to_string(&mut content))
            .ok()?;
        let content = content.trim();
        (!content.is_empty()).then(|| content.to_string())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn held(mut file: File, path: PathBuf, key: &MirrorKey) -> Self {
        let stamp = format!("pid {} syncing {}\n", std::process::id(), key);
        if let Err(e) = file.set_len(0).and_then(|()| file.write_all(stamp.as_bytes())) {
            log::debug!("Could not record lock holder in {}: {}", path.display(), e);
        }
        Self { file, path }
    }
}

impl Drop for MirrorLock {
    fn drop(&mut self) {
        let _ = self.file.set_len(0);
        let _ = self.file.unlock();
    }
}

fn open_lock_file(path: &Path) -> Result<File, LockError> {
    let io_err = |source| LockError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(io_err)
}

/// `Ok(false)` when another handle holds the lock.
fn try_lock(file: &File, path: &Path) -> Result<bool, LockError> {
    match file.try_lock_exclusive() {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(false),
        Err(source) => Err(LockError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}
