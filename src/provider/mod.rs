//! Documentation providers
//!
//! A provider binds one documentation source to a fixed set of versions. Every
//! content operation first brings the version's mirror up to date, then reads the
//! checked-out tree under the mirror's shared lock.

mod registry;

pub use registry::{ProviderRegistry, ProviderSummary};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::cache::{DEFAULT_MAX_AGE, SyncError, SyncManager, SyncReport, SyncRequest};
use crate::config::{ConfigError, ProviderConfig};
use crate::docs::{
    CancelFlag, ContentReader, DocumentNode, Preview, ReadError, ScanError, StructureScanner,
};
use crate::types::{MirrorKey, ProviderId, VersionId};

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("unknown provider '{name}' (available: {})", .available.join(", "))]
    UnknownProvider { name: String, available: Vec<String> },

    #[error("unknown version '{version}' for provider '{provider}' (available: {})", .available.join(", "))]
    UnknownVersion {
        provider: String,
        version: String,
        available: Vec<String>,
    },

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Read(#[from] ReadError),
}

/// One configured documentation version.
#[derive(Debug, Clone, Serialize)]
pub struct Version {
    pub id: VersionId,
    #[serde(rename = "ref")]
    pub git_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_dir: Option<String>,
    /// Local mirror directory, owned by the sync manager.
    pub mirror: PathBuf,
    #[serde(skip)]
    key: MirrorKey,
}

impl Version {
    pub fn new(
        provider: &ProviderId,
        id: VersionId,
        git_ref: impl Into<String>,
        docs_dir: Option<String>,
        sync: &SyncManager,
    ) -> Self {
        let key = MirrorKey::new(provider.clone(), id.clone());
        Self {
            mirror: sync.mirror_dir(&key),
            id,
            git_ref: git_ref.into(),
            docs_dir,
            key,
        }
    }

    pub fn key(&self) -> &MirrorKey {
        &self.key
    }

    /// Directory holding this version's documents inside `mirror`.
    pub fn docs_root(&self, mirror: &Path) -> PathBuf {
        match &self.docs_dir {
            Some(dir) => mirror.join(dir),
            None => mirror.to_path_buf(),
        }
    }
}

/// Capability every documentation source implements.
pub trait DocProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Configured versions, in configuration order. No I/O.
    fn list_versions(&self) -> &[Version];

    /// Ordered document tree of `version`, built from a fresh mirror.
    fn get_structure(&self, version: &str) -> Result<DocumentNode, ProviderError> {
        self.get_structure_cancellable(version, &CancelFlag::new())
    }

    /// [`DocProvider::get_structure`], giving up with [`ScanError::Cancelled`] once
    /// `cancel` is set. The sync that precedes the scan always runs to completion.
    fn get_structure_cancellable(
        &self,
        version: &str,
        cancel: &CancelFlag,
    ) -> Result<DocumentNode, ProviderError>;

    /// Full text of one document.
    fn get_full_content(&self, version: &str, path: &str) -> Result<String, ProviderError>;

    /// Bounded preview of one document.
    fn get_preview(&self, version: &str, path: &str) -> Result<Preview, ProviderError>;

    /// Bring `version`'s mirror up to date, or refresh it unconditionally with `force`.
    fn sync(&self, version: &str, force: bool) -> Result<SyncReport, ProviderError>;

    /// Look up a configured version.
    fn version(&self, id: &str) -> Result<&Version, ProviderError> {
        self.list_versions()
            .iter()
            .find(|v| v.id.as_str() == id)
            .ok_or_else(|| ProviderError::UnknownVersion {
                provider: self.name().to_string(),
                version: id.to_string(),
                available: self
                    .list_versions()
                    .iter()
                    .map(|v| v.id.to_string())
                    .collect(),
            })
    }
}

/// Provider backed by one remote git repository.
pub struct RepoProvider {
    name: ProviderId,
    remote: String,
    versions: Vec<Version>,
    max_age: Duration,
    sync: Arc<SyncManager>,
    scanner: StructureScanner,
    reader: ContentReader,
}

impl RepoProvider {
    pub fn new(name: ProviderId, remote: impl Into<String>, sync: Arc<SyncManager>) -> Self {
        Self {
            name,
            remote: remote.into(),
            versions: Vec::new(),
            max_age: DEFAULT_MAX_AGE,
            sync,
            scanner: StructureScanner::default(),
            reader: ContentReader::default(),
        }
    }

    /// Build a provider from its configuration entry.
    pub fn from_config(
        config: &ProviderConfig,
        default_max_age: Duration,
        scanner: StructureScanner,
        sync: Arc<SyncManager>,
    ) -> Result<Self, ConfigError> {
        let mut provider = Self::new(config.name.clone(), config.remote_url()?, sync)
            .with_max_age(
                config
                    .max_age_secs
                    .map(Duration::from_secs)
                    .unwrap_or(default_max_age),
            )
            .with_scanner(scanner);

        for version in config.effective_versions() {
            let docs_dir = config.docs_dir(&version);
            provider = provider.with_version(version.id, version.git_ref, docs_dir);
        }
        Ok(provider)
    }

    pub fn with_version(
        mut self,
        id: VersionId,
        git_ref: impl Into<String>,
        docs_dir: Option<String>,
    ) -> Self {
        let version = Version::new(&self.name, id, git_ref, docs_dir, &self.sync);
        self.versions.push(version);
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn with_scanner(mut self, scanner: StructureScanner) -> Self {
        self.scanner = scanner;
        self
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    fn request<'a>(&'a self, version: &'a Version) -> SyncRequest<'a> {
        SyncRequest {
            key: version.key(),
            remote: &self.remote,
            preferred_ref: &version.git_ref,
            max_age: self.max_age,
        }
    }

    /// Fresh (or served-stale) mirror for `version`.
    fn ensure_fresh(&self, version: &Version) -> Result<SyncReport, ProviderError> {
        let report = self.sync.ensure_fresh(&self.request(version))?;
        if report.is_stale() {
            log::warn!(
                "Serving {}@{} from a stale mirror",
                self.name,
                version.id
            );
        }
        Ok(report)
    }
}

impl DocProvider for RepoProvider {
    fn name(&self) -> &str {
        self.name.as_str()
    }

    fn list_versions(&self) -> &[Version] {
        &self.versions
    }

    fn get_structure_cancellable(
        &self,
        version: &str,
        cancel: &CancelFlag,
    ) -> Result<DocumentNode, ProviderError> {
        let version = self.version(version)?;
        self.ensure_fresh(version)?;

        let tree = self.sync.read_tree(version.key(), |mirror| {
            self.scanner
                .scan_with_cancel(&version.docs_root(mirror), cancel)
        })?;
        Ok(tree)
    }

    fn get_full_content(&self, version: &str, path: &str) -> Result<String, ProviderError> {
        let version = self.version(version)?;
        self.ensure_fresh(version)?;

        let content = self.sync.read_tree(version.key(), |mirror| {
            self.reader.read_full(&version.docs_root(mirror), path)
        })?;
        Ok(content)
    }

    fn get_preview(&self, version: &str, path: &str) -> Result<Preview, ProviderError> {
        let version = self.version(version)?;
        self.ensure_fresh(version)?;

        let preview = self.sync.read_tree(version.key(), |mirror| {
            let file = self.reader.resolve(&version.docs_root(mirror), path)?;
            self.scanner
                .preview_file(&file)
                .map_err(|source| ReadError::ReadFailure {
                    path: path.to_string(),
                    source,
                })
        })?;
        Ok(preview)
    }

    fn sync(&self, version: &str, force: bool) -> Result<SyncReport, ProviderError> {
        let version = self.version(version)?;
        let request = self.request(version);
        let report = if force {
            self.sync.force_sync(&request)?
        } else {
            self.sync.ensure_fresh(&request)?
        };
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CachePaths, FakeTransport, SyncOutcome};
    use std::sync::atomic::Ordering;
    use tempfile::{TempDir, tempdir};

    fn provider(transport: Arc<FakeTransport>) -> (TempDir, RepoProvider) {
        let dir = tempdir().unwrap();
        let sync = Arc::new(SyncManager::new(CachePaths::new(dir.path()), transport));
        let provider = RepoProvider::new(
            "alpha".parse().unwrap(),
            "https://example.com/alpha-docs.git",
            sync,
        )
        .with_version("v1".parse().unwrap(), "main", None)
        .with_version(
            "v2".parse().unwrap(),
            "main",
            Some("versioned_docs/v2".to_string()),
        );
        (dir, provider)
    }

    fn docs_transport(refs: &[&str]) -> FakeTransport {
        FakeTransport::with_refs(refs)
            .with_file("guide/intro.md", "# Intro\n\nFirst steps.\n")
            .with_file("guide/blocks.md", "# Blocks\n")
            .with_file("versioned_docs/v2/start.md", "# Start v2\n")
            .with_file("broken.md", vec![0xff, 0xfe, 0x00])
    }

    #[test]
    fn unknown_version_fails_before_any_sync() {
        let transport = Arc::new(docs_transport(&["main"]));
        let (_dir, provider) = provider(Arc::clone(&transport));

        let err = provider.get_structure("v9").unwrap_err();
        match err {
            ProviderError::UnknownVersion {
                provider,
                version,
                available,
            } => {
                assert_eq!(provider, "alpha");
                assert_eq!(version, "v9");
                assert_eq!(available, vec!["v1", "v2"]);
            }
            other => panic!("expected UnknownVersion, got {:?}", other),
        }
        assert!(matches!(
            provider.get_full_content("v9", "guide/intro.md"),
            Err(ProviderError::UnknownVersion { .. })
        ));
        assert_eq!(transport.clones.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn structure_of_mirror_root() {
        let transport = Arc::new(docs_transport(&["main"]));
        let (_dir, provider) = provider(Arc::clone(&transport));

        let tree = provider.get_structure("v1").unwrap();
        let names: Vec<_> = tree.children().iter().map(DocumentNode::name).collect();
        assert_eq!(names, vec!["guide", "versioned_docs", "README.md", "broken.md"]);
        assert!(tree.find("guide/intro.md").is_some());
    }

    #[test]
    fn structure_of_docs_dir() {
        let transport = Arc::new(docs_transport(&["main"]));
        let (_dir, provider) = provider(Arc::clone(&transport));

        let tree = provider.get_structure("v2").unwrap();
        assert_eq!(tree.children().len(), 1);
        assert_eq!(tree.children()[0].path(), "start.md");
    }

    #[test]
    fn unreadable_file_gets_marker_and_scan_succeeds() {
        let transport = Arc::new(docs_transport(&["main"]));
        let (_dir, provider) = provider(Arc::clone(&transport));

        let tree = provider.get_structure("v1").unwrap();
        let DocumentNode::File(broken) = tree.find("broken.md").unwrap() else {
            panic!("expected file node");
        };
        assert!(!broken.preview.is_available());
        assert_eq!(broken.preview.text(), crate::docs::PREVIEW_UNAVAILABLE);
        assert!(tree.find("guide/blocks.md").is_some());
    }

    #[test]
    fn cancelled_structure_request_still_syncs() {
        let transport = Arc::new(docs_transport(&["main"]));
        let (_dir, provider) = provider(Arc::clone(&transport));
        let cancel = CancelFlag::new();
        cancel.cancel();

        assert!(matches!(
            provider.get_structure_cancellable("v1", &cancel),
            Err(ProviderError::Scan(ScanError::Cancelled))
        ));
        assert_eq!(transport.clones.load(Ordering::SeqCst), 1);
        assert!(provider.get_structure("v1").is_ok());
    }

    #[test]
    fn content_and_preview() {
        let transport = Arc::new(docs_transport(&["main"]));
        let (_dir, provider) = provider(Arc::clone(&transport));

        assert_eq!(
            provider.get_full_content("v1", "guide/intro").unwrap(),
            "# Intro\n\nFirst steps.\n"
        );
        let preview = provider.get_preview("v1", "guide/intro.md").unwrap();
        assert_eq!(preview.text, "# Intro\n\nFirst steps.");
        assert!(!preview.truncated);

        // One clone served all three calls.
        assert_eq!(transport.clones.load(Ordering::SeqCst), 1);
        assert_eq!(transport.updates.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn traversal_is_out_of_bounds() {
        let transport = Arc::new(docs_transport(&["main"]));
        let (_dir, provider) = provider(Arc::clone(&transport));

        assert!(matches!(
            provider.get_full_content("v1", "../../etc/passwd"),
            Err(ProviderError::Read(ReadError::PathOutOfBounds(_)))
        ));
        // v2 is rooted in versioned_docs/v2, so its siblings are out of reach too.
        assert!(matches!(
            provider.get_full_content("v2", "../../guide/intro.md"),
            Err(ProviderError::Read(ReadError::PathOutOfBounds(_)))
        ));
    }

    #[test]
    fn fallback_branch_keeps_configured_version_id() {
        let transport = Arc::new(docs_transport(&["master"]));
        let (_dir, provider) = provider(Arc::clone(&transport));

        let report = provider.sync("v1", false).unwrap();
        assert_eq!(report.outcome, SyncOutcome::Cloned);
        assert_eq!(report.checked_out_ref.as_deref(), Some("master"));

        assert!(provider.get_structure("v1").is_ok());
        let ids: Vec<_> = provider
            .list_versions()
            .iter()
            .map(|v| v.id.as_str())
            .collect();
        assert_eq!(ids, vec!["v1", "v2"]);
        assert_eq!(provider.list_versions()[0].git_ref, "main");
    }

    #[test]
    fn unavailable_repository_is_an_error() {
        let transport = Arc::new(docs_transport(&["develop"]));
        let (_dir, provider) = provider(Arc::clone(&transport));

        assert!(matches!(
            provider.get_structure("v1"),
            Err(ProviderError::Sync(SyncError::RepoUnavailable { .. }))
        ));
    }

    #[test]
    fn forced_sync_refreshes_fresh_mirror() {
        let transport = Arc::new(docs_transport(&["main"]));
        let (_dir, provider) = provider(Arc::clone(&transport));

        provider.get_structure("v1").unwrap();
        let report = provider.sync("v1", false).unwrap();
        assert_eq!(report.outcome, SyncOutcome::AlreadyFresh);

        let report = provider.sync("v1", true).unwrap();
        assert_eq!(report.outcome, SyncOutcome::Refreshed);
        assert_eq!(transport.updates.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn versions_have_separate_mirrors() {
        let transport = Arc::new(docs_transport(&["main"]));
        let (_dir, provider) = provider(Arc::clone(&transport));

        let [v1, v2] = provider.list_versions() else {
            panic!("expected two versions");
        };
        assert_ne!(v1.mirror, v2.mirror);
        assert!(v1.mirror.ends_with("alpha/v1"));

        provider.get_structure("v1").unwrap();
        provider.get_structure("v2").unwrap();
        assert_eq!(transport.clones.load(Ordering::SeqCst), 2);
    }
}
