//! # m1nd Agent
//!
//! The orchestration layer: per-user conversation state, the tool loop and
//! the provider fallback chain.
//!
//! ```text
//! question ──► FallbackOrchestrator ──► ToolLoop ──► ProviderGateway ──► provider
//!                     │                    │
//!                     ▼                    ▼
//!             ConversationStore       ToolRegistry
//! ```

pub mod orchestrator;
pub mod session;
pub mod store;
pub mod tool_loop;

pub use orchestrator::FallbackOrchestrator;
pub use session::{UserEvent, UserState};
pub use store::{ConversationStore, TurnGuard};
pub use tool_loop::{ToolLoop, ITERATION_LIMIT_ANSWER};
