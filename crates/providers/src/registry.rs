//! Provider registry: adapters registered under an id with their timeout.
//!
//! Selection happens by id through the ordered priority list handed to the
//! orchestrator; the registry only resolves ids.

use std::sync::Arc;
use std::time::Duration;

use m1nd_config::{AppConfig, ProviderConfig, ProviderKind};
use m1nd_core::provider::Provider;
use tracing::{debug, warn};

use crate::openai_compat::OpenAiCompatProvider;
use crate::responses::ResponsesProvider;

/// Ceiling applied when none is given explicitly.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A registered adapter.
#[derive(Clone)]
pub struct RegisteredProvider {
    pub provider: Arc<dyn Provider>,
    pub timeout: Duration,
}

/// Registered adapters keyed by id, in registration order.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    entries: Vec<(String, RegisteredProvider)>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its own name with a per-call timeout.
    pub fn add(self, provider: Arc<dyn Provider>, timeout: Duration) -> Self {
        let id = provider.name().to_string();
        self.add_as(id, provider, timeout)
    }

    /// Register a provider with the default timeout (30s).
    pub fn add_default(self, provider: Arc<dyn Provider>) -> Self {
        self.add(provider, DEFAULT_TIMEOUT)
    }

    /// Register a provider under an explicit id. Replaces an existing entry.
    pub fn add_as(mut self, id: impl Into<String>, provider: Arc<dyn Provider>, timeout: Duration) -> Self {
        let id = id.into();
        let entry = RegisteredProvider { provider, timeout };
        match self.entries.iter_mut().find(|(existing, _)| *existing == id) {
            Some(slot) => slot.1 = entry,
            None => self.entries.push((id, entry)),
        }
        self
    }

    pub fn get(&self, id: &str) -> Option<&RegisteredProvider> {
        self.entries.iter().find(|(k, _)| k == id).map(|(_, v)| v)
    }

    /// Whether the adapter registered under `id` accepts tool schemas.
    pub fn supports_tools(&self, id: &str) -> bool {
        self.get(id).is_some_and(|e| e.provider.supports_tools())
    }

    /// Registered ids in registration order.
    pub fn ids(&self) -> Vec<&str> {
        self.entries.iter().map(|(k, _)| k.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Build an adapter from one `[[providers]]` entry.
pub fn build_provider(config: &ProviderConfig) -> Arc<dyn Provider> {
    if config.api_key.is_none() {
        warn!(provider = %config.id, "No API key configured for provider");
    }

    match config.kind {
        ProviderKind::ChatCompletions => {
            let mut p = OpenAiCompatProvider::new(&config.id, &config.api_url, &config.model)
                .with_sampling(config.temperature, config.max_tokens)
                .with_tools(config.supports_tools);
            if let Some(key) = &config.api_key {
                p = p.with_api_key(key);
            }
            Arc::new(p)
        }
        ProviderKind::Responses => {
            let mut p = ResponsesProvider::new(&config.id, &config.api_url, &config.model)
                .with_sampling(config.temperature, config.max_tokens)
                .with_tools(config.supports_tools);
            if let Some(key) = &config.api_key {
                p = p.with_api_key(key);
            }
            Arc::new(p)
        }
    }
}

/// Build the registry from configuration.
pub fn build_from_config(config: &AppConfig) -> ProviderRegistry {
    config.providers.iter().fold(ProviderRegistry::new(), |registry, p| {
        debug!(provider = %p.id, kind = ?p.kind, model = %p.model, "Registering provider");
        registry.add_as(&p.id, build_provider(p), Duration::from_secs(p.timeout_secs))
    })
}
