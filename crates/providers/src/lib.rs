//! Completion gateway implementations for AgentRelay.
//!
//! All gateways implement the `agentrelay_core::CompletionGateway` trait.
//! The router selects the correct gateway based on configuration.

pub mod openai_compat;
pub mod router;

pub use openai_compat::OpenAiCompatGateway;
pub use router::{GatewayRouter, build_from_config, is_local_provider};
