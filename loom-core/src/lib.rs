//! # loom-core
//!
//! Core traits and types for Loom agents, tools, sessions, and events.
//!
//! ## Overview
//!
//! This crate provides the foundational abstractions for the agent
//! orchestration runtime:
//!
//! - [`Agent`] - the fundamental trait for all agents
//! - [`Tool`] / [`Toolset`] - for extending agents with custom capabilities
//! - [`Session`] / [`State`] - for managing conversation context
//! - [`Event`] - for streaming agent responses
//! - [`LoomError`] / [`Result`] - unified error handling
//!
//! ## State management
//!
//! State uses typed prefixes for organization:
//!
//! - `user:` - user preferences (persists across sessions)
//! - `app:` - application state (application-wide)
//! - `temp:` - temporary data (cleared each turn)
//! - no prefix - session-local state

pub mod agent;
pub mod callbacks;
pub mod context;
pub mod error;
pub mod event;
pub mod instruction_template;
pub mod model;
pub mod scope;
pub mod tool;
pub mod types;

pub use agent::{Agent, EventStream};
pub use callbacks::{
    AfterAgentCallback, AfterModelCallback, AfterToolCallback, BeforeAgentCallback,
    BeforeModelCallback, BeforeToolCallback, GlobalInstructionProvider, InstructionProvider,
    OnModelErrorCallback, OnToolErrorCallback,
};
pub use context::{
    Artifacts, CallbackContext, IncludeContents, InvocationContext, Memory, MemoryEntry,
    ReadonlyContext, ReadonlyState, RunConfig, Session, State, StreamingMode,
    ToolConfirmationDecision, ToolConfirmationPolicy, ToolConfirmationRequest,
};
pub use error::{LoomError, Result};
pub use event::{
    Event, EventActions, EventCompaction, KEY_PREFIX_APP, KEY_PREFIX_TEMP, KEY_PREFIX_USER,
};
pub use instruction_template::inject_session_state;
pub use model::{
    CitationMetadata, CitationSource, FinishReason, GenerateContentConfig, Llm, LlmRequest,
    LlmResponse, LlmResponseStream, UsageMetadata,
};
pub use scope::{MAX_STATE_KEY_LEN, Scope, extract_deltas, merge_states, scope, trim_temp_delta, validate_state_key};
pub use tool::{Tool, ToolContext, ToolPredicate, ToolRegistry, Toolset, ValidationMode};
pub use types::{Content, FunctionCall, FunctionResponse, InlineData, Part, PartKind};
