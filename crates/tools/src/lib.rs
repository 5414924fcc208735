//! Built-in tool implementations for m1nd.
//!
//! Tools let the model reach beyond its training data before answering.

pub mod web_search;

use std::time::Duration;

use m1nd_config::ToolsConfig;
use m1nd_core::tool::ToolRegistry;

pub use web_search::WebSearchTool;

/// Create a tool registry with the built-in tools enabled in `config`.
pub fn default_registry(config: &ToolsConfig) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    if config.web_search {
        registry.register(Box::new(WebSearchTool::new(
            Duration::from_secs(config.search_timeout_secs),
            config.max_results,
        )));
    }
    registry
}
