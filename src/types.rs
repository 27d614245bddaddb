//! Shared types for moddoc

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for parsing failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("value cannot be empty")]
    Empty,
    #[error("invalid character in value: {0:?}")]
    InvalidCharacter(char),
    #[error("value cannot start with '{0}'")]
    InvalidStart(char),
    #[error("value is too long ({0} characters, max {MAX_NAME_LEN})")]
    TooLong(usize),
}

const MAX_NAME_LEN: usize = 128;

/// Validation shared by every identifier that ends up as a path segment.
///
/// Rules:
/// - Non-empty, at most 128 characters
/// - Alphanumeric characters, hyphens, underscores, and dots only
/// - Cannot start with a dot or a hyphen
fn validate_segment(s: &str) -> Result<(), ParseError> {
    if s.is_empty() {
        return Err(ParseError::Empty);
    }

    let len = s.chars().count();
    if len > MAX_NAME_LEN {
        return Err(ParseError::TooLong(len));
    }

    for start in ['.', '-'] {
        if s.starts_with(start) {
            return Err(ParseError::InvalidStart(start));
        }
    }

    for c in s.chars() {
        if !c.is_ascii_alphanumeric() && c != '-' && c != '_' && c != '.' {
            return Err(ParseError::InvalidCharacter(c));
        }
    }

    Ok(())
}

/// Name of a documentation provider, e.g. `neoforge`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProviderId(String);

impl ProviderId {
    /// Returns the provider name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Built-in names only; skips validation.
    pub(crate) fn from_static(name: &'static str) -> Self {
        debug_assert!(validate_segment(name).is_ok());
        ProviderId(name.to_string())
    }
}

impl FromStr for ProviderId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        validate_segment(s)?;
        Ok(ProviderId(s.to_string()))
    }
}

impl TryFrom<String> for ProviderId {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate_segment(&value)?;
        Ok(ProviderId(value))
    }
}

impl From<ProviderId> for String {
    fn from(id: ProviderId) -> Self {
        id.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one documentation version, e.g. `version-1.20.4`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionId(String);

impl VersionId {
    /// Returns the version identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for VersionId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        validate_segment(s)?;
        Ok(VersionId(s.to_string()))
    }
}

impl TryFrom<String> for VersionId {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate_segment(&value)?;
        Ok(VersionId(value))
    }
}

impl From<VersionId> for String {
    fn from(id: VersionId) -> Self {
        id.0
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one local mirror: a (provider, version) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MirrorKey {
    pub provider: ProviderId,
    pub version: VersionId,
}

impl MirrorKey {
    /// Creates a new MirrorKey from provider and version
    pub fn new(provider: ProviderId, version: VersionId) -> Self {
        Self { provider, version }
    }
}

impl fmt::Display for MirrorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.provider, self.version)
    }
}
