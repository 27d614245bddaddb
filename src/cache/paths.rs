//! On-disk layout of the storage root.
//!
//! ```text
//! <root>/
//! ├── mirrors/<provider>/<version>/          git checkout
//! ├── state/<provider>/<version>.json        sync marker
//! └── locks/<provider>/<version>.lock        advisory lock
//! ```
//!
//! Markers sit outside the checkout so a fetch or a failed clone never touches them.

use std::path::{Path, PathBuf};

use crate::types::MirrorKey;

#[derive(Debug, Clone)]
pub struct CachePaths {
    root: PathBuf,
}

impl CachePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn mirrors_dir(&self) -> PathBuf {
        self.root.join("mirrors")
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join("state")
    }

    pub fn locks_dir(&self) -> PathBuf {
        self.root.join("locks")
    }

    /// Checkout for one provider version.
    pub fn mirror_dir(&self, key: &MirrorKey) -> PathBuf {
        self.mirrors_dir()
            .join(key.provider.as_str())
            .join(key.version.as_str())
    }

    /// `state/<provider>/<version>.json`. Built with `format!` rather than
    /// `with_extension` so dotted version ids stay intact.
    pub fn marker_path(&self, key: &MirrorKey) -> PathBuf {
        self.state_dir()
            .join(key.provider.as_str())
            .join(format!("{}.json", key.version))
    }

    /// `locks/<provider>/<version>.lock`, nested like the markers so distinct keys
    /// never share a lock file.
    pub fn lock_path(&self, key: &MirrorKey) -> PathBuf {
        self.locks_dir()
            .join(key.provider.as_str())
            .join(format!("{}.lock", key.version))
    }
}

impl Default for CachePaths {
    /// `moddoc` under the platform's local data directory.
    fn default() -> Self {
        let base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".local/share"));
        Self::new(base.join("moddoc"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> (CachePaths, MirrorKey) {
        (
            CachePaths::new("store-root"),
            MirrorKey::new("neoforge".parse().unwrap(), "version-1.20.4".parse().unwrap()),
        )
    }

    #[test]
    fn default_root_is_named_after_the_tool() {
        assert!(CachePaths::default().root().ends_with("moddoc"));
    }

    #[test]
    fn mirror_checkout_is_nested_by_provider() {
        let (paths, key) = layout();
        assert_eq!(
            paths.mirror_dir(&key),
            Path::new("store-root/mirrors/neoforge/version-1.20.4")
        );
    }

    #[test]
    fn marker_keeps_dotted_version() {
        let (paths, key) = layout();
        assert_eq!(
            paths.marker_path(&key),
            Path::new("store-root/state/neoforge/version-1.20.4.json")
        );
        assert!(!paths.marker_path(&key).starts_with(paths.mirror_dir(&key)));
    }

    #[test]
    fn lock_file_is_nested_by_provider() {
        let (paths, key) = layout();
        assert_eq!(
            paths.lock_path(&key),
            Path::new("store-root/locks/neoforge/version-1.20.4.lock")
        );
    }

    #[test]
    fn underscored_keys_get_distinct_locks() {
        let paths = CachePaths::new("store-root");
        let a = MirrorKey::new("a__b".parse().unwrap(), "c".parse().unwrap());
        let b = MirrorKey::new("a".parse().unwrap(), "b__c".parse().unwrap());
        assert_ne!(paths.lock_path(&a), paths.lock_path(&b));
    }
}
