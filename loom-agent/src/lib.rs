//! # loom-agent
//!
//! Agent implementations for the Loom runtime.
//!
//! ## Overview
//!
//! - [`LlmAgent`] - model-driven agent running the tool loop (model call,
//!   function-call dispatch, result merge, repeat until a final response).
//! - [`CustomAgent`] - user-supplied closure wrapped in the same
//!   before/after-callback contract as `LlmAgent`, for agents that don't need
//!   a model.
//!
//! Orchestration agents (sequential/parallel/loop composition) are not
//! shipped here; any such agent only needs to implement [`Agent`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use loom_agent::LlmAgentBuilder;
//! use std::sync::Arc;
//!
//! // let agent = LlmAgentBuilder::new("assistant")
//! //     .description("Helpful AI assistant")
//! //     .model(Arc::new(model))
//! //     .build()?;
//! ```

mod custom_agent;
mod llm_agent;
#[cfg(test)]
mod test_support;

pub use loom_core::Agent;
pub use custom_agent::{CustomAgent, CustomAgentBuilder};
pub use llm_agent::{LlmAgent, LlmAgentBuilder};
