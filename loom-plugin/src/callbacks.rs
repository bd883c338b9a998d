//! Plugin-specific callback types not shared with the agent/tool contracts
//! in `loom-core`: run-lifecycle hooks, and the tool hooks reshaped to work
//! on a tool's JSON args/result rather than `Content`.

use loom_core::{Content, Event, InvocationContext, LlmRequest, LlmResponse, Result, Tool};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type OnUserMessageCallback =
    Box<dyn Fn(Arc<dyn InvocationContext>, Content) -> Pin<Box<dyn Future<Output = Result<Option<Content>>> + Send>> + Send + Sync>;

pub type OnEventCallback =
    Box<dyn Fn(Arc<dyn InvocationContext>, Event) -> Pin<Box<dyn Future<Output = Result<Option<Event>>> + Send>> + Send + Sync>;

pub type BeforeRunCallback =
    Box<dyn Fn(Arc<dyn InvocationContext>) -> Pin<Box<dyn Future<Output = Result<Option<Content>>> + Send>> + Send + Sync>;

pub type AfterRunCallback =
    Box<dyn Fn(Arc<dyn InvocationContext>) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Outcome of the before_model hook chain: either the (possibly rewritten)
/// request proceeds to the model, or a plugin supplies a response that
/// skips the call entirely (e.g. a cache hit).
pub enum BeforeModelResult {
    Continue(LlmRequest),
    Skip(LlmResponse),
}

/// Reshaped `before_model` hook: unlike `loom_core::BeforeModelCallback`,
/// this can distinguish "continue with a rewritten request" from "skip the
/// call with a cached response" instead of collapsing both into `Option`.
pub type BeforeModelCallback = Box<
    dyn Fn(Arc<dyn loom_core::CallbackContext>, LlmRequest) -> Pin<Box<dyn Future<Output = Result<BeforeModelResult>> + Send>>
        + Send
        + Sync,
>;

pub type OnModelErrorCallback = Box<
    dyn Fn(Arc<dyn loom_core::CallbackContext>, LlmRequest, String) -> Pin<Box<dyn Future<Output = Result<Option<LlmResponse>>> + Send>>
        + Send
        + Sync,
>;

pub type BeforeToolCallback = Box<
    dyn Fn(Arc<dyn loom_core::CallbackContext>, Arc<dyn Tool>, serde_json::Value) -> Pin<Box<dyn Future<Output = Result<Option<serde_json::Value>>> + Send>>
        + Send
        + Sync,
>;

pub type AfterToolCallback = Box<
    dyn Fn(Arc<dyn loom_core::CallbackContext>, Arc<dyn Tool>, serde_json::Value) -> Pin<Box<dyn Future<Output = Result<Option<serde_json::Value>>> + Send>>
        + Send
        + Sync,
>;

pub type OnToolErrorCallback = Box<
    dyn Fn(
            Arc<dyn loom_core::CallbackContext>,
            Arc<dyn Tool>,
            serde_json::Value,
            String,
        ) -> Pin<Box<dyn Future<Output = Result<Option<serde_json::Value>>> + Send>>
        + Send
        + Sync,
>;
