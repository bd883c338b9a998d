//! # loom-tool
//!
//! Tool and toolset implementations for Loom agents.
//!
//! ## Overview
//!
//! This crate provides the tool infrastructure consumed by `loom-agent`'s
//! model/tool loop:
//!
//! - [`FunctionTool`] - wrap an async Rust function as a callable tool
//! - [`BasicToolset`] - group a static list of tools, optionally filtered
//! - [`ExitLoopTool`] - escalate out of an enclosing loop agent
//! - [`LoadArtifactsTool`] - inject saved artifacts into the conversation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use loom_tool::FunctionTool;
//! use loom_core::{ToolContext, Result};
//! use serde_json::{json, Value};
//! use std::sync::Arc;
//!
//! async fn get_weather(_ctx: Arc<dyn ToolContext>, args: Value) -> Result<Value> {
//!     let city = args["city"].as_str().unwrap_or("Unknown");
//!     Ok(json!({
//!         "city": city,
//!         "temperature": 72,
//!         "condition": "sunny"
//!     }))
//! }
//!
//! let tool = FunctionTool::new(
//!     "get_weather",
//!     "Get current weather for a city",
//!     get_weather,
//! );
//! ```

pub mod builtin;
mod function_tool;
pub mod toolset;

pub use loom_core::{Tool, ToolContext, Toolset};
pub use builtin::{ExitLoopTool, LoadArtifactsTool};
pub use function_tool::FunctionTool;
pub use toolset::{string_predicate, BasicToolset};
