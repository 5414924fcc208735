//! Upstream provider plumbing for m1nd.
//!
//! Vendor adapters implement `m1nd_core::Provider`. The [`ProviderGateway`]
//! resolves a request's provider id through the [`ProviderRegistry`] and
//! applies timeout, retry and failure classification.

pub mod gateway;
mod http;
pub mod openai_compat;
pub mod registry;
pub mod responses;

pub use gateway::{ProviderGateway, RetryPolicy};
pub use openai_compat::OpenAiCompatProvider;
pub use registry::{ProviderRegistry, RegisteredProvider, build_from_config};
pub use responses::ResponsesProvider;
