//! Wiring shared by the commands: config in, orchestrator out.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use m1nd_agent::{ConversationStore, FallbackOrchestrator, ToolLoop};
use m1nd_config::AppConfig;
use m1nd_providers::{ProviderGateway, RetryPolicy, build_from_config};
use tracing::info;

pub struct Runtime {
    pub config: AppConfig,
    pub orchestrator: Arc<FallbackOrchestrator>,
}

impl Runtime {
    pub fn load(config_path: &Path) -> anyhow::Result<Self> {
        let config = AppConfig::load_with_env(config_path)
            .with_context(|| format!("loading {}", config_path.display()))?;
        Ok(Self::build(config))
    }

    pub fn build(config: AppConfig) -> Self {
        let registry = build_from_config(&config);
        let gateway = ProviderGateway::new(registry, RetryPolicy::from(&config.retry));
        let tools = m1nd_tools::default_registry(&config.tools);
        let store = ConversationStore::new(config.conversation.max_history)
            .with_system_prompt(config.resolve_system_prompt());

        info!(
            providers = ?config.provider_priority,
            tools = ?tools.names(),
            max_history = config.conversation.max_history,
            "Runtime assembled"
        );

        let orchestrator = FallbackOrchestrator::new(Arc::new(store), Arc::new(gateway), Arc::new(tools))
            .with_tool_loop(ToolLoop::new(config.conversation.max_tool_iterations));

        Self {
            config,
            orchestrator: Arc::new(orchestrator),
        }
    }

    pub fn priority(&self) -> Vec<String> {
        self.config.provider_priority.clone()
    }
}
