//! # loom-plugin
//!
//! Plugin system for Loom agents.
//!
//! A plugin bundles optional callbacks at specific points of the Runner/Agent
//! loop. Every hook is "first plugin to answer wins" — the manager stops
//! calling further plugins for that hook on that call once one returns a
//! substitution.
//!
//! ## Overview
//!
//! Plugins can hook into:
//! - **Run lifecycle**: before/after the entire run
//! - **User messages**: inspect or rewrite user input
//! - **Events**: inspect or rewrite emitted events
//! - **Agent callbacks**: before/after agent execution
//! - **Model callbacks**: before/after LLM calls, including a cache-style skip
//! - **Tool callbacks**: before/after tool execution, keyed by tool instance
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use loom_plugin::{Plugin, PluginConfig, PluginManager};
//!
//! let logging_plugin = Plugin::new(PluginConfig {
//!     name: "logging".to_string(),
//!     on_event: Some(Box::new(|_ctx, event| {
//!         Box::pin(async move {
//!             tracing::info!(?event, "event");
//!             Ok(None)
//!         })
//!     })),
//!     ..Default::default()
//! });
//!
//! let manager = PluginManager::new(vec![logging_plugin])?;
//! ```

mod callbacks;
mod manager;
mod plugin;

pub use callbacks::*;
pub use manager::{PluginManager, PluginManagerConfig};
pub use plugin::{Plugin, PluginBuilder, PluginConfig};
