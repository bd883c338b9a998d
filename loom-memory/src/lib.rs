//! # loom-memory
//!
//! Keyword-search long-term memory for Loom agents.
//!
//! ## Overview
//!
//! This crate provides long-term memory capabilities:
//!
//! - [`InMemoryMemoryService`] - simple in-memory memory storage, matched by
//!   whitespace-tokenized word overlap
//! - [`MemoryService`] - trait for custom backends
//! - [`MemoryEntry`] - structured memory with metadata
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use loom_memory::InMemoryMemoryService;
//!
//! let service = InMemoryMemoryService::new();
//!
//! // Memory is automatically searched and injected
//! // when configured via LlmAgentBuilder::include_memory()
//! ```
//!
//! ## Features
//!
//! - Per-user memory isolation
//! - Semantic search queries
//! - Metadata filtering
//! - Automatic context injection

pub mod inmemory;
pub mod scoped;
pub mod service;

pub use inmemory::InMemoryMemoryService;
pub use scoped::ScopedMemory;
pub use service::{MemoryEntry, MemoryService, SearchRequest, SearchResponse};
