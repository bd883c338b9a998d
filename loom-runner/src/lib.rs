//! # loom-runner
//!
//! Turn-driving execution runtime for the Loom agent orchestration crates.
//!
//! ## Overview
//!
//! - [`Runner`] — resolves a session, builds an [`InvocationContext`], and
//!   drives the root agent (and any transfer targets) to completion.
//! - [`RunnerConfig`] — services and plugins a `Runner` is built from.
//! - [`InvocationContext`] — the turn-scoped context threaded through one run.
//! - [`tree`] — agent-tree utilities (`find_agent`, `build_parent_map`,
//!   `validate_unique_names`).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use loom_runner::{Runner, RunnerConfig};
//!
//! // let runner = Runner::new(RunnerConfig {
//! //     app_name: "my_app".to_string(),
//! //     agent,
//! //     session_service,
//! //     artifact_service: None,
//! //     memory_service: None,
//! //     plugins: vec![],
//! //     run_config: None,
//! // })?;
//! ```

mod context;
mod runner;
mod tree;

pub use context::{InvocationContext, MutableSession};
pub use runner::{Runner, RunnerConfig};
pub use tree::{build_parent_map, find_agent, validate_unique_names};
