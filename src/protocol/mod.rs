//! Typed request/response boundary

mod messages;

pub use messages::{
    ContentResult, INTERNAL_ERROR, INVALID_PARAMS, NOT_FOUND, PATH_OUT_OF_BOUNDS,
    REPO_UNAVAILABLE, Request, Response, RpcError,
};

use crate::provider::ProviderRegistry;

/// Run one request against the registry.
pub fn dispatch(registry: &ProviderRegistry, request: Request) -> Result<Response, RpcError> {
    log::debug!("Dispatching {:?}", request);
    match request {
        Request::GetProviders => Ok(Response::Providers(registry.list_all())),

        Request::GetStructure { provider, version } => {
            let tree = registry.get(&provider)?.get_structure(&version)?;
            Ok(Response::Structure(tree))
        }

        Request::GetFullContent {
            provider,
            version,
            path,
        } => {
            let content = registry.get(&provider)?.get_full_content(&version, &path)?;
            Ok(Response::Content(ContentResult { content }))
        }

        Request::GetPreview {
            provider,
            version,
            path,
        } => {
            let preview = registry.get(&provider)?.get_preview(&version, &path)?;
            Ok(Response::Preview(preview))
        }

        Request::Sync {
            provider,
            version,
            force,
        } => {
            let report = registry.get(&provider)?.sync(&version, force)?;
            Ok(Response::Sync(report))
        }
    }
}

/// Parse a JSON request and dispatch it.
pub fn dispatch_json(registry: &ProviderRegistry, json: &str) -> Result<Response, RpcError> {
    let request: Request = serde_json::from_str(json)
        .map_err(|e| RpcError::invalid_params("invalid_request", format!("invalid request: {}", e)))?;
    dispatch(registry, request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::FakeTransport;
    use crate::config::Config;
    use std::sync::Arc;
    use tempfile::{TempDir, tempdir};

    fn registry() -> (TempDir, ProviderRegistry) {
        let dir = tempdir().unwrap();
        let toml = format!(
            r#"
cache_dir = "{}"
[[providers]]
name = "alpha"
remote = "https://example.com/alpha-docs.git"
[[providers.versions]]
id = "v1"
"#,
            dir.path().display()
        );
        let transport = FakeTransport::with_refs(&["master"])
            .with_file("items/sword.md", "# Sword\n\nSharp.\n\nVery sharp.\n\nReally.\n");
        let registry = ProviderRegistry::from_config_with_transport(
            &Config::from_toml(&toml).unwrap(),
            Arc::new(transport),
        )
        .unwrap();
        (dir, registry)
    }

    #[test]
    fn get_providers() {
        let (_dir, registry) = registry();
        let resp = dispatch(&registry, Request::GetProviders).unwrap();
        assert_eq!(
            serde_json::to_value(&resp).unwrap(),
            serde_json::json!([{"provider": "alpha", "versions": ["v1"]}])
        );
    }

    #[test]
    fn get_structure_json() {
        let (_dir, registry) = registry();
        let resp = dispatch_json(
            &registry,
            r#"{"method":"get_structure","params":{"provider":"alpha","version":"v1"}}"#,
        )
        .unwrap();

        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["type"], "dir");
        assert_eq!(json["children"][0]["name"], "items");
        assert_eq!(json["children"][0]["children"][0]["title"], "Sword");
        assert_eq!(json["children"][0]["children"][0]["truncated"], true);
    }

    #[test]
    fn get_full_content_and_preview() {
        let (_dir, registry) = registry();
        let content = dispatch(
            &registry,
            Request::GetFullContent {
                provider: "alpha".to_string(),
                version: "v1".to_string(),
                path: "items/sword".to_string(),
            },
        )
        .unwrap();
        assert_eq!(
            serde_json::to_value(&content).unwrap()["content"],
            "# Sword\n\nSharp.\n\nVery sharp.\n\nReally.\n"
        );

        let preview = dispatch(
            &registry,
            Request::GetPreview {
                provider: "alpha".to_string(),
                version: "v1".to_string(),
                path: "items/sword.md".to_string(),
            },
        )
        .unwrap();
        let json = serde_json::to_value(&preview).unwrap();
        assert_eq!(json["preview"], "# Sword\n\nSharp.\n\nVery sharp.");
        assert_eq!(json["truncated"], true);
    }

    #[test]
    fn errors_carry_codes_and_alternatives() {
        let (_dir, registry) = registry();

        let err = dispatch(
            &registry,
            Request::GetStructure {
                provider: "beta".to_string(),
                version: "v1".to_string(),
            },
        )
        .unwrap_err();
        assert_eq!(err.code, INVALID_PARAMS);
        assert_eq!(err.kind, "unknown_provider");
        assert_eq!(err.alternatives, vec!["alpha"]);

        let err = dispatch(
            &registry,
            Request::GetStructure {
                provider: "alpha".to_string(),
                version: "v2".to_string(),
            },
        )
        .unwrap_err();
        assert_eq!(err.kind, "unknown_version");
        assert_eq!(err.alternatives, vec!["v1"]);

        let err = dispatch(
            &registry,
            Request::GetFullContent {
                provider: "alpha".to_string(),
                version: "v1".to_string(),
                path: "../../etc/passwd".to_string(),
            },
        )
        .unwrap_err();
        assert_eq!(err.code, PATH_OUT_OF_BOUNDS);

        let err = dispatch(
            &registry,
            Request::GetFullContent {
                provider: "alpha".to_string(),
                version: "v1".to_string(),
                path: "items/shield.md".to_string(),
            },
        )
        .unwrap_err();
        assert_eq!(err.code, NOT_FOUND);
    }

    #[test]
    fn sync_reports_outcome() {
        let (_dir, registry) = registry();
        let resp = dispatch_json(
            &registry,
            r#"{"method":"sync","params":{"provider":"alpha","version":"v1"}}"#,
        )
        .unwrap();
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["outcome"], "cloned");
        assert_eq!(json["checked_out_ref"], "master");
    }

    #[test]
    fn malformed_json_is_invalid_params() {
        let (_dir, registry) = registry();
        let err = dispatch_json(&registry, "{not json").unwrap_err();
        assert_eq!(err.code, INVALID_PARAMS);
    }
}
