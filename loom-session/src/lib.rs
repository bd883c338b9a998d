//! # loom-session
//!
//! Session management and scoped state persistence for Loom agents.
//!
//! ## Overview
//!
//! This crate provides session and state management:
//!
//! - [`InMemorySessionService`] - single-process session storage
//! - [`Session`] - conversation session with state and events
//! - [`State`] - key-value state with typed prefixes
//! - [`SessionService`] - trait for custom session backends
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use loom_session::InMemorySessionService;
//!
//! let service = InMemorySessionService::new();
//!
//! // Sessions are created and managed by the Runner
//! // State is accessed via the session
//! ```
//!
//! ## State prefixes
//!
//! | Prefix | Constant | Purpose |
//! |--------|----------|---------|
//! | `user:` | [`KEY_PREFIX_USER`] | user preferences, shared across sessions for the same app+user |
//! | `app:` | [`KEY_PREFIX_APP`] | application state, shared across every session for the same app |
//! | `temp:` | [`KEY_PREFIX_TEMP`] | per-turn scratch data, never persisted |

pub mod event;
pub mod inmemory;
pub mod service;
pub mod session;
pub mod state;

pub use event::{Event, EventActions, Events};
pub use inmemory::InMemorySessionService;
pub use service::{CreateRequest, DeleteRequest, GetRequest, ListRequest, SessionService};
pub use session::{KEY_PREFIX_APP, KEY_PREFIX_TEMP, KEY_PREFIX_USER, Session};
pub use state::{ReadonlyState, State};
