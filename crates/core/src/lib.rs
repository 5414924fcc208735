//! # m1nd Core
//!
//! Domain types, traits, and error definitions for the m1nd conversational
//! orchestration engine. Every other crate depends inward on this one.
//!
//! ## Design Philosophy
//!
//! Each external collaborator is a trait here and implementations live in
//! their own crates:
//! - [`Provider`] adapters hide vendor wire formats
//! - [`Tool`] implementations are looked up through [`ToolRegistry`]
//! - [`Channel`] implementations deliver size-bounded messages

pub mod channel;
pub mod error;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use channel::{Channel, ChannelId, ChannelMessage};
pub use error::{ChannelError, ErrorKind, OrchestrationError, ProviderError, ProviderFailure, ToolError};
pub use message::{ConversationTurn, Role};
pub use provider::{NormalizedRequest, NormalizedResponse, Provider, ToolDefinition};
pub use tool::{Tool, ToolArguments, ToolInvocation, ToolRegistry, ToolResult};
