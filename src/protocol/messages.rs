use serde::{Deserialize, Serialize};

use crate::cache::SyncReport;
use crate::docs::{DocumentNode, Preview, ReadError};
use crate::provider::{ProviderError, ProviderSummary};

/// Every operation exposed to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum Request {
    /// List providers and their versions
    GetProviders,

    /// Document tree of one version
    GetStructure { provider: String, version: String },

    /// Full text of one document
    GetFullContent {
        provider: String,
        version: String,
        path: String,
    },

    /// Bounded preview of one document
    GetPreview {
        provider: String,
        version: String,
        path: String,
    },

    /// Sync a version's mirror
    Sync {
        provider: String,
        version: String,
        #[serde(default)]
        force: bool,
    },
}

/// Content response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentResult {
    pub content: String,
}

/// All possible success responses
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Response {
    Providers(Vec<ProviderSummary>),
    Structure(DocumentNode),
    Content(ContentResult),
    Preview(Preview),
    Sync(SyncReport),
}

pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
pub const NOT_FOUND: i32 = -1;
pub const REPO_UNAVAILABLE: i32 = -2;
pub const PATH_OUT_OF_BOUNDS: i32 = -3;

/// Error returned across the boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    /// Stable machine-readable error name, e.g. `unknown_version`.
    pub kind: String,
    pub message: String,
    /// Valid values when the request named something unknown.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<String>,
}

impl RpcError {
    pub fn new(code: i32, kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            kind: kind.into(),
            message: message.into(),
            alternatives: Vec::new(),
        }
    }

    pub fn with_alternatives(mut self, alternatives: Vec<String>) -> Self {
        self.alternatives = alternatives;
        self
    }

    pub fn invalid_params(kind: &str, msg: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, kind, msg)
    }

    pub fn internal(kind: &str, msg: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, kind, msg)
    }

    pub fn not_found(kind: &str, msg: impl Into<String>) -> Self {
        Self::new(NOT_FOUND, kind, msg)
    }
}

impl From<ProviderError> for RpcError {
    fn from(err: ProviderError) -> Self {
        let message = err.to_string();
        match err {
            ProviderError::UnknownProvider { available, .. } => {
                RpcError::invalid_params("unknown_provider", message).with_alternatives(available)
            }
            ProviderError::UnknownVersion { available, .. } => {
                RpcError::invalid_params("unknown_version", message).with_alternatives(available)
            }
            ProviderError::Sync(_) => RpcError::new(REPO_UNAVAILABLE, "repo_unavailable", message),
            ProviderError::Scan(_) => RpcError::internal("scan_failed", message),
            ProviderError::Read(ReadError::PathOutOfBounds(_)) => {
                RpcError::new(PATH_OUT_OF_BOUNDS, "path_out_of_bounds", message)
            }
            ProviderError::Read(ReadError::NotFound(_)) => RpcError::not_found("not_found", message),
            ProviderError::Read(ReadError::ReadFailure { .. }) => {
                RpcError::internal("read_failure", message)
            }
        }
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

impl std::error::Error for RpcError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SyncError;

    #[test]
    fn test_serialize_request_with_params() {
        let req = Request::GetStructure {
            provider: "neoforge".to_string(),
            version: "version-1.21.1".to_string(),
        };
        let json = serde_json::to_string(&req).unwrap();

        assert!(json.contains(r#""method":"get_structure""#));
        assert!(json.contains(r#""params":"#));
        assert!(json.contains(r#""provider":"neoforge""#));
    }

    #[test]
    fn test_serialize_request_without_params() {
        let json = serde_json::to_string(&Request::GetProviders).unwrap();

        assert!(json.contains(r#""method":"get_providers""#));
        assert!(!json.contains(r#""params""#));
    }

    #[test]
    fn test_deserialize_request_with_params() {
        let json = r#"{"method":"get_full_content","params":{"provider":"neoforge","version":"v1","path":"blocks/index.md"}}"#;
        let req: Request = serde_json::from_str(json).unwrap();

        assert_eq!(
            req,
            Request::GetFullContent {
                provider: "neoforge".to_string(),
                version: "v1".to_string(),
                path: "blocks/index.md".to_string(),
            }
        );
    }

    #[test]
    fn test_deserialize_request_without_params() {
        let req: Request = serde_json::from_str(r#"{"method":"get_providers"}"#).unwrap();
        assert_eq!(req, Request::GetProviders);
    }

    #[test]
    fn test_sync_force_defaults_to_false() {
        let json = r#"{"method":"sync","params":{"provider":"neoforge","version":"v1"}}"#;
        let req: Request = serde_json::from_str(json).unwrap();
        assert!(matches!(req, Request::Sync { force: false, .. }));
    }

    #[test]
    fn test_unknown_method_is_rejected() {
        let json = r#"{"method":"search","params":{"query":"blocks"}}"#;
        assert!(serde_json::from_str::<Request>(json).is_err());
    }

    #[test]
    fn test_content_response_shape() {
        let resp = Response::Content(ContentResult {
            content: "# Hi\n".to_string(),
        });
        assert_eq!(serde_json::to_string(&resp).unwrap(), r##"{"content":"# Hi\n"}"##);
    }

    #[test]
    fn test_error_mapping() {
        let unknown = RpcError::from(ProviderError::UnknownVersion {
            provider: "neoforge".to_string(),
            version: "1.0".to_string(),
            available: vec!["version-1.21.1".to_string()],
        });
        assert_eq!(unknown.code, INVALID_PARAMS);
        assert_eq!(unknown.kind, "unknown_version");
        assert_eq!(unknown.alternatives, vec!["version-1.21.1"]);

        let escape = RpcError::from(ProviderError::Read(ReadError::PathOutOfBounds(
            "../x".to_string(),
        )));
        assert_eq!(escape.code, PATH_OUT_OF_BOUNDS);

        let missing = RpcError::from(ProviderError::Read(ReadError::NotFound("a.md".to_string())));
        assert_eq!(missing.code, NOT_FOUND);

        let unavailable = RpcError::from(ProviderError::Sync(SyncError::RepoUnavailable {
            remote: "https://example.com/x".to_string(),
            reason: "network".to_string(),
        }));
        assert_eq!(unavailable.kind, "repo_unavailable");
        assert!(unavailable.message.contains("network"));
    }

    #[test]
    fn test_rpc_error_omits_empty_alternatives() {
        let json = serde_json::to_string(&RpcError::internal("read_failure", "boom")).unwrap();
        assert!(!json.contains("alternatives"));
        assert!(json.contains(r#""code":-32603"#));
    }
}
