//! Full-text document reads confined to a documentation root.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReadError {
    #[error("path '{0}' is outside the documentation root")]
    PathOutOfBounds(String),

    #[error("document '{0}' not found")]
    NotFound(String),

    #[error("failed to read '{path}': {source}")]
    ReadFailure {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Resolves relative document paths against a root and reads them.
#[derive(Debug, Clone)]
pub struct ContentReader {
    default_extension: String,
}

impl Default for ContentReader {
    fn default() -> Self {
        Self::new("md")
    }
}

impl ContentReader {
    /// `default_extension` is appended to extension-less paths that do not exist.
    pub fn new(default_extension: impl Into<String>) -> Self {
        Self {
            default_extension: default_extension.into(),
        }
    }

    /// Full decoded text of `relative` under `root`.
    pub fn read_full(&self, root: &Path, relative: &str) -> Result<String, ReadError> {
        let path = self.resolve(root, relative)?;
        let bytes = fs::read(&path).map_err(|source| ReadError::ReadFailure {
            path: relative.to_string(),
            source,
        })?;
        String::from_utf8(bytes).map_err(|e| ReadError::ReadFailure {
            path: relative.to_string(),
            source: io::Error::new(io::ErrorKind::InvalidData, e.utf8_error()),
        })
    }

    /// Canonical path of the regular file `relative` names under `root`.
    pub fn resolve(&self, root: &Path, relative: &str) -> Result<PathBuf, ReadError> {
        let normalized = normalize(relative)?;
        if normalized
            .components()
            .any(|c| c.as_os_str().to_string_lossy().starts_with('.'))
        {
            return Err(ReadError::NotFound(relative.to_string()));
        }

        let root = canonical(root, relative)?;
        let mut candidate = root.join(&normalized);
        if fs::symlink_metadata(&candidate).is_err() {
            if let Some(with_ext) = self.with_default_extension(&candidate) {
                candidate = with_ext;
            }
        }

        let resolved = canonical(&candidate, relative)?;
        if !resolved.starts_with(&root) {
            return Err(ReadError::PathOutOfBounds(relative.to_string()));
        }

        match fs::metadata(&resolved) {
            Ok(metadata) if metadata.is_file() => Ok(resolved),
            Ok(_) => Err(ReadError::NotFound(relative.to_string())),
            Err(source) => Err(ReadError::ReadFailure {
                path: relative.to_string(),
                source,
            }),
        }
    }

    fn with_default_extension(&self, path: &Path) -> Option<PathBuf> {
        let name = path.file_name()?.to_str()?;
        let suffix = format!(".{}", self.default_extension);
        if self.default_extension.is_empty() || name.ends_with(&suffix) {
            return None;
        }
        Some(path.with_file_name(format!("{}{}", name, suffix)))
    }
}

/// Lexically normalize a relative path, refusing anything that leaves the root.
fn normalize(relative: &str) -> Result<PathBuf, ReadError> {
    let mut normalized = PathBuf::new();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(ReadError::PathOutOfBounds(relative.to_string()));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(ReadError::PathOutOfBounds(relative.to_string()));
            }
        }
    }
    Ok(normalized)
}

fn canonical(path: &Path, relative: &str) -> Result<PathBuf, ReadError> {
    path.canonicalize().map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            ReadError::NotFound(relative.to_string())
        } else {
            ReadError::ReadFailure {
                path: relative.to_string(),
                source,
            }
        }
    })
}
