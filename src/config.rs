//! Configuration loading
//!
//! Parses `config.toml` with serde. A missing default file yields the built-in
//! configuration, which serves the NeoForge documentation.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::{CachePaths, DEFAULT_MAX_AGE};
use crate::docs::{DEFAULT_EXTENSIONS, PreviewOptions};
use crate::types::{ProviderId, VersionId};

const CONFIG_DIR: &str = "moddoc";
const CONFIG_FILENAME: &str = "config.toml";

const NEOFORGE_REMOTE: &str = "https://github.com/neoforged/Documentation";
const FABRIC_REMOTE: &str = "https://github.com/FabricMC/fabric-docs";
const NEOFORGE_VERSIONS: &[&str] = &["version-1.21.1", "version-1.20.6", "version-1.20.4"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("configuration error: {0}")]
    Validation(String),
}

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Storage root for mirrors, sync markers and locks.
    pub cache_dir: Option<PathBuf>,
    pub max_age_secs: u64,
    pub preview_chars: usize,
    pub preview_paragraphs: usize,
    /// Recognised documentation file extensions.
    pub extensions: Vec<String>,
    pub providers: Vec<ProviderConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: None,
            max_age_secs: DEFAULT_MAX_AGE.as_secs(),
            preview_chars: PreviewOptions::default().max_chars,
            preview_paragraphs: PreviewOptions::default().max_paragraphs,
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            providers: vec![ProviderConfig::preset(ProviderKind::NeoForge)],
        }
    }
}

/// Documentation source presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[serde(rename = "neoforge")]
    NeoForge,
    Fabric,
    #[default]
    Custom,
}

impl ProviderKind {
    /// Remote used when the provider entry does not name one.
    pub fn default_remote(self) -> Option<&'static str> {
        match self {
            ProviderKind::NeoForge => Some(NEOFORGE_REMOTE),
            ProviderKind::Fabric => Some(FABRIC_REMOTE),
            ProviderKind::Custom => None,
        }
    }

    /// Where a version's documents live inside the mirror, unless configured.
    pub fn default_docs_dir(self, version: &VersionId) -> Option<String> {
        match self {
            ProviderKind::NeoForge => Some(format!("versioned_docs/{}", version)),
            ProviderKind::Fabric | ProviderKind::Custom => None,
        }
    }

    /// Versions served when the provider entry lists none.
    pub fn default_versions(self) -> Vec<VersionConfig> {
        let ids: &[&str] = match self {
            ProviderKind::NeoForge => NEOFORGE_VERSIONS,
            ProviderKind::Fabric => &["latest"],
            ProviderKind::Custom => &[],
        };
        ids.iter()
            .filter_map(|id| id.parse().ok())
            .map(|id| VersionConfig {
                id,
                git_ref: default_ref(),
                docs_dir: None,
            })
            .collect()
    }

    fn default_name(self) -> &'static str {
        match self {
            ProviderKind::NeoForge => "neoforge",
            ProviderKind::Fabric => "fabric",
            ProviderKind::Custom => "custom",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    pub name: ProviderId,
    #[serde(default)]
    pub kind: ProviderKind,
    pub remote: Option<String>,
    /// Per-provider staleness threshold, overriding `max_age_secs`.
    pub max_age_secs: Option<u64>,
    #[serde(default)]
    pub versions: Vec<VersionConfig>,
}

impl ProviderConfig {
    /// Provider entry using every default of `kind`.
    pub fn preset(kind: ProviderKind) -> Self {
        Self {
            name: ProviderId::from_static(kind.default_name()),
            kind,
            remote: None,
            max_age_secs: None,
            versions: Vec::new(),
        }
    }

    pub fn remote_url(&self) -> Result<&str, ConfigError> {
        self.remote
            .as_deref()
            .or_else(|| self.kind.default_remote())
            .ok_or_else(|| {
                ConfigError::Validation(format!("provider '{}' has no remote", self.name))
            })
    }

    /// Configured versions, or the preset's when none are listed.
    pub fn effective_versions(&self) -> Vec<VersionConfig> {
        if self.versions.is_empty() {
            self.kind.default_versions()
        } else {
            self.versions.clone()
        }
    }

    /// Documentation subdirectory for `version`, if any.
    pub fn docs_dir(&self, version: &VersionConfig) -> Option<String> {
        version
            .docs_dir
            .clone()
            .or_else(|| self.kind.default_docs_dir(&version.id))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VersionConfig {
    pub id: VersionId,
    #[serde(rename = "ref", default = "default_ref")]
    pub git_ref: String,
    pub docs_dir: Option<String>,
}

fn default_ref() -> String {
    "main".to_string()
}

impl Config {
    /// The file [`Config::load`] reads: `explicit` if given, otherwise the per-user
    /// config file when it exists.
    pub fn source_path(explicit: Option<&Path>) -> Option<PathBuf> {
        match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => default_config_path().filter(|path| path.exists()),
        }
    }

    /// Load configuration.
    ///
    /// An explicit `path` must exist. Otherwise the per-user config file is used when
    /// present, falling back to [`Config::default`].
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match Self::source_path(path) {
            Some(path) if !path.exists() => Err(ConfigError::NotFound(path)),
            Some(path) => Self::load_from_file(&path),
            None => {
                log::debug!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        log::debug!("Loading configuration from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.preview_chars == 0 {
            return Err(ConfigError::Validation(
                "preview_chars must be greater than 0".to_string(),
            ));
        }
        if self.preview_paragraphs == 0 {
            return Err(ConfigError::Validation(
                "preview_paragraphs must be greater than 0".to_string(),
            ));
        }
        if self.extensions.iter().all(|e| e.trim_start_matches('.').is_empty()) {
            return Err(ConfigError::Validation(
                "extensions must name at least one file extension".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for provider in &self.providers {
            if !names.insert(provider.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate provider '{}'",
                    provider.name
                )));
            }
            provider.remote_url()?;

            let versions = provider.effective_versions();
            if versions.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "provider '{}' has no versions",
                    provider.name
                )));
            }

            let mut ids = HashSet::new();
            for version in &versions {
                if !ids.insert(version.id.as_str()) {
                    return Err(ConfigError::Validation(format!(
                        "duplicate version '{}' for provider '{}'",
                        version.id, provider.name
                    )));
                }
                if version.git_ref.trim().is_empty() {
                    return Err(ConfigError::Validation(format!(
                        "version '{}' of provider '{}' has an empty ref",
                        version.id, provider.name
                    )));
                }
                if let Some(dir) = &version.docs_dir {
                    validate_docs_dir(dir)?;
                }
            }
        }

        Ok(())
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    pub fn preview_options(&self) -> PreviewOptions {
        PreviewOptions {
            max_chars: self.preview_chars,
            max_paragraphs: self.preview_paragraphs,
        }
    }

    pub fn cache_paths(&self) -> CachePaths {
        match &self.cache_dir {
            Some(dir) => CachePaths::new(dir),
            None => CachePaths::default(),
        }
    }
}

/// `docs_dir` must stay inside the mirror.
fn validate_docs_dir(dir: &str) -> Result<(), ConfigError> {
    let escapes = Path::new(dir)
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(ConfigError::Validation(format!(
            "docs_dir '{}' must be a relative path inside the repository",
            dir
        )));
    }
    Ok(())
}

/// Per-user configuration file: `{config_dir}/moddoc/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILENAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.max_age(), DEFAULT_MAX_AGE);
        assert_eq!(config.preview_options(), PreviewOptions::default());
        assert_eq!(config.providers.len(), 1);

        let neoforge = &config.providers[0];
        assert_eq!(neoforge.name.as_str(), "neoforge");
        assert_eq!(neoforge.remote_url().unwrap(), NEOFORGE_REMOTE);
        let versions = neoforge.effective_versions();
        assert_eq!(versions[0].id.as_str(), "version-1.21.1");
        assert_eq!(versions[0].git_ref, "main");
        assert_eq!(
            neoforge.docs_dir(&versions[0]).as_deref(),
            Some("versioned_docs/version-1.21.1")
        );
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.max_age_secs, 86_400);
        assert_eq!(config.extensions, vec!["md", "mdx", "markdown"]);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
cache_dir = "/tmp/moddoc-cache"
max_age_secs = 3600
preview_chars = 200
preview_paragraphs = 2
extensions = ["md"]

[[providers]]
name = "fabric"
kind = "fabric"
max_age_secs = 60

[[providers]]
name = "mylib"
remote = "https://example.com/mylib-docs.git"

[[providers.versions]]
id = "v1"
ref = "release/1.x"
docs_dir = "docs"

[[providers.versions]]
id = "v2"
"#;
        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.cache_paths().root(), Path::new("/tmp/moddoc-cache"));
        assert_eq!(config.max_age(), Duration::from_secs(3600));
        assert_eq!(config.preview_options().max_chars, 200);

        let fabric = &config.providers[0];
        assert_eq!(fabric.kind, ProviderKind::Fabric);
        assert_eq!(fabric.remote_url().unwrap(), FABRIC_REMOTE);
        assert_eq!(fabric.max_age_secs, Some(60));
        assert_eq!(fabric.effective_versions()[0].id.as_str(), "latest");

        let custom = &config.providers[1];
        assert_eq!(custom.kind, ProviderKind::Custom);
        let versions = custom.effective_versions();
        assert_eq!(versions[0].git_ref, "release/1.x");
        assert_eq!(custom.docs_dir(&versions[0]).as_deref(), Some("docs"));
        assert_eq!(versions[1].git_ref, "main");
        assert_eq!(custom.docs_dir(&versions[1]), None);
    }

    #[test]
    fn test_custom_provider_requires_remote_and_versions() {
        let no_remote = r#"
[[providers]]
name = "mylib"
[[providers.versions]]
id = "v1"
"#;
        assert!(matches!(
            Config::from_toml(no_remote),
            Err(ConfigError::Validation(_))
        ));

        let no_versions = r#"
[[providers]]
name = "mylib"
remote = "https://example.com/mylib.git"
"#;
        assert!(matches!(
            Config::from_toml(no_versions),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_rejects_invalid_identifiers() {
        let toml = r#"
[[providers]]
name = "../escape"
kind = "neoforge"
"#;
        assert!(matches!(Config::from_toml(toml), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_rejects_duplicates() {
        let providers = r#"
[[providers]]
name = "neoforge"
kind = "neoforge"
[[providers]]
name = "neoforge"
kind = "neoforge"
"#;
        assert!(matches!(
            Config::from_toml(providers),
            Err(ConfigError::Validation(_))
        ));

        let versions = r#"
[[providers]]
name = "mylib"
remote = "https://example.com/mylib.git"
[[providers.versions]]
id = "v1"
[[providers.versions]]
id = "v1"
"#;
        assert!(matches!(
            Config::from_toml(versions),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_rejects_escaping_docs_dir() {
        for dir in ["../other", "/abs/docs", "docs/../../x"] {
            let toml = format!(
                r#"
[[providers]]
name = "mylib"
remote = "https://example.com/mylib.git"
[[providers.versions]]
id = "v1"
docs_dir = "{}"
"#,
                dir
            );
            assert!(
                matches!(Config::from_toml(&toml), Err(ConfigError::Validation(_))),
                "{} should be rejected",
                dir
            );
        }
    }

    #[test]
    fn test_rejects_zero_preview_limits() {
        for toml in ["preview_chars = 0", "preview_paragraphs = 0"] {
            assert!(
                matches!(Config::from_toml(toml), Err(ConfigError::Validation(_))),
                "{} should be rejected",
                toml
            );
        }
        assert!(Config::from_toml("preview_chars = 1
preview_paragraphs = 1").is_ok());
    }

    #[test]
    fn test_rejects_unknown_fields() {
        assert!(matches!(
            Config::from_toml("max_age = 5"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            Config::load(Some(&missing)),
            Err(ConfigError::NotFound(_))
        ));

        assert_eq!(Config::source_path(Some(&missing)), Some(missing.clone()));

        let path = dir.path().join("config.toml");
        std::fs::write(&path, "max_age_secs = 10\n").unwrap();
        assert_eq!(Config::source_path(Some(&path)), Some(path.clone()));
        assert_eq!(Config::load(Some(&path)).unwrap().max_age_secs, 10);
    }
}
