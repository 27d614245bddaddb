use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use super::{DocProvider, ProviderError, RepoProvider};
use crate::cache::{GitCli, GitTransport, SyncManager};
use crate::config::{Config, ConfigError};
use crate::docs::StructureScanner;

/// Provider name with its version ids, as listed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderSummary {
    pub provider: String,
    pub versions: Vec<String>,
}

/// Maps provider names to providers. Built once at startup.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn DocProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every configured provider, sharing one sync manager that shells out to git.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Self::from_config_with_transport(config, Arc::new(GitCli::new()))
    }

    pub fn from_config_with_transport(
        config: &Config,
        transport: Arc<dyn GitTransport>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let sync = Arc::new(SyncManager::new(config.cache_paths(), transport));
        let scanner =
            StructureScanner::new(config.preview_options()).with_extensions(&config.extensions);

        let mut registry = Self::new();
        for entry in &config.providers {
            let provider =
                RepoProvider::from_config(entry, config.max_age(), scanner.clone(), Arc::clone(&sync))?;
            log::debug!(
                "Registered provider {} ({} versions) from {}",
                entry.name,
                provider.list_versions().len(),
                provider.remote()
            );
            registry.register(entry.name.as_str(), Arc::new(provider));
        }
        Ok(registry)
    }

    /// Register `provider` under `name`, replacing any previous registration.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn DocProvider>) {
        let name = name.into();
        if self.providers.insert(name.clone(), provider).is_some() {
            log::warn!("Provider '{}' re-registered, replacing previous", name);
        }
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn DocProvider>, ProviderError> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownProvider {
                name: name.to_string(),
                available: self.names(),
            })
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    /// Every provider with its versions, sorted by provider name.
    pub fn list_all(&self) -> Vec<ProviderSummary> {
        self.providers
            .iter()
            .map(|(name, provider)| ProviderSummary {
                provider: name.clone(),
                versions: provider
                    .list_versions()
                    .iter()
                    .map(|v| v.id.to_string())
                    .collect(),
            })
            .collect()
    }
}
