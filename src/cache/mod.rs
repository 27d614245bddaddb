//! Git mirrors + sync manager

mod git;
mod lock;
mod paths;
mod staleness;
mod sync;

pub use git::{GitCli, GitError, GitTransport, open_repository, repository_exists};
pub use lock::{DEFAULT_LOCK_TIMEOUT, LockError, MirrorLock};
pub use paths::CachePaths;
pub use staleness::{MirrorState, SyncMarker};
pub use sync::{
    DEFAULT_MAX_AGE, SyncError, SyncManager, SyncOutcome, SyncReport, SyncRequest, fallback_ref,
};

#[cfg(test)]
pub(crate) use sync::tests::FakeTransport;
