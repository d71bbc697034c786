//! Provider registry
//!
//! Builds every configured provider up front and serves shared handles to
//! them. The registry is read-only after construction, so worker and judge
//! tasks can resolve providers concurrently without synchronization.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{Config, ProviderSettings};

use super::{AnthropicProvider, OpenAiProvider, Provider, ProviderError};

/// Holds one handle per configured named provider
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every provider named in the config
    ///
    /// The run deadline doubles as the per-request HTTP timeout, like the
    /// consensus timeout does for the whole fan-out.
    pub fn from_config(config: &Config) -> Result<Self, ProviderError> {
        let mut registry = Self::new();
        let timeout = config.consensus.timeout();

        for (name, settings) in &config.providers {
            let provider = create_provider(settings, timeout)
                .map_err(|e| ProviderError::new(name.clone(), e.kind, format!("failed to create provider: {}", e.message)))?;
            debug!(name = %name, provider = %provider.name(), "registered provider");
            registry.register(name, provider);
        }

        Ok(registry)
    }

    /// Add a provider under a config name (construction phase only)
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    /// Resolve a provider by its config name
    pub fn get(&self, name: &str) -> Result<Arc<dyn Provider>, ProviderError> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| ProviderError::validation(name, format!("provider {name} not found")))
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Close all providers, logging failures rather than aborting midway
    pub async fn close_all(&self) {
        for (name, provider) in &self.providers {
            if let Err(e) = provider.close().await {
                warn!(name = %name, error = %e, "failed to close provider");
            }
        }
    }
}

/// Create a provider for a config entry
fn create_provider(settings: &ProviderSettings, timeout: Duration) -> Result<Arc<dyn Provider>, ProviderError> {
    let base_url = (!settings.base_url.is_empty()).then_some(settings.base_url.as_str());

    match settings.kind.as_str() {
        "openai" => Ok(Arc::new(OpenAiProvider::new(
            settings.model.clone(),
            base_url,
            &settings.api_key,
            Some(timeout),
        )?)),
        "anthropic" => Ok(Arc::new(AnthropicProvider::new(
            settings.model.clone(),
            base_url,
            &settings.api_key,
            Some(timeout),
        )?)),
        other => Err(ProviderError::validation(
            other,
            format!("unsupported provider kind: {other}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkerConfig;
    use crate::provider::ErrorKind;

    fn config_with_provider(kind: &str) -> Config {
        let mut config = Config::default();
        config.providers.insert(
            "main".to_string(),
            ProviderSettings {
                kind: kind.to_string(),
                model: "test-model".to_string(),
                api_key: "test-key".to_string(),
                ..Default::default()
            },
        );
        config.workers.push(WorkerConfig {
            id: "w1".to_string(),
            provider: "main".to_string(),
            ..Default::default()
        });
        config
    }

    #[test]
    fn test_builds_implemented_kinds() {
        for kind in ["openai", "anthropic"] {
            let registry = ProviderRegistry::from_config(&config_with_provider(kind)).unwrap();
            assert_eq!(registry.len(), 1);
            assert!(registry.get("main").is_ok());
        }
    }

    #[test]
    fn test_rejects_unsupported_kind() {
        // ollama passes config validation but has no client yet
        let err = ProviderRegistry::from_config(&config_with_provider("ollama")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.message.contains("unsupported provider kind"));
    }

    #[test]
    fn test_unknown_name_is_validation_error() {
        let registry = ProviderRegistry::new();
        let err = registry.get("nope").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
