use crate::{CallbackContext, Content, LlmRequest, LlmResponse, LoomError, ReadonlyContext, Result};
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

// Agent callbacks. Returning `Some(content)` short-circuits the agent's own
// run and substitutes the callback's content as the event output.
pub type BeforeAgentCallback = Box<dyn Fn(Arc<dyn CallbackContext>) -> Pin<Box<dyn Future<Output = Result<Option<Content>>> + Send>> + Send + Sync>;
pub type AfterAgentCallback = Box<dyn Fn(Arc<dyn CallbackContext>) -> Pin<Box<dyn Future<Output = Result<Option<Content>>> + Send>> + Send + Sync>;

// Model callbacks.
pub type BeforeModelCallback = Box<dyn Fn(Arc<dyn CallbackContext>, LlmRequest) -> Pin<Box<dyn Future<Output = Result<Option<LlmResponse>>> + Send>> + Send + Sync>;
pub type AfterModelCallback = Box<dyn Fn(Arc<dyn CallbackContext>, LlmResponse) -> Pin<Box<dyn Future<Output = Result<Option<LlmResponse>>> + Send>> + Send + Sync>;

// Tool callbacks operate on the tool's JSON args/result, not on Content,
// since tools are not themselves conversational turns.
pub type BeforeToolCallback = Box<
    dyn Fn(Arc<dyn CallbackContext>, &str, serde_json::Value) -> Pin<Box<dyn Future<Output = Result<Option<serde_json::Value>>> + Send>>
        + Send
        + Sync,
>;
pub type AfterToolCallback = Box<
    dyn Fn(Arc<dyn CallbackContext>, &str, serde_json::Value) -> Pin<Box<dyn Future<Output = Result<Option<serde_json::Value>>> + Send>>
        + Send
        + Sync,
>;

/// Invoked when a model call fails, before the error propagates out of the
/// tool loop. Returning `Some(response)` lets the plugin supply a fallback
/// response in place of the failed call.
pub type OnModelErrorCallback = Box<
    dyn Fn(Arc<dyn CallbackContext>, &LoomError) -> Pin<Box<dyn Future<Output = Result<Option<LlmResponse>>> + Send>> + Send + Sync,
>;

/// Invoked when a tool call fails, before the error is surfaced as a
/// function response. Returning `Some(value)` substitutes a recovered
/// result for the failed tool call.
pub type OnToolErrorCallback = Box<
    dyn Fn(Arc<dyn CallbackContext>, &str, &LoomError) -> Pin<Box<dyn Future<Output = Result<Option<serde_json::Value>>> + Send>>
        + Send
        + Sync,
>;

// Instruction providers - dynamic instruction generation
pub type InstructionProvider = Box<dyn Fn(Arc<dyn ReadonlyContext>) -> Pin<Box<dyn Future<Output = Result<String>> + Send>> + Send + Sync>;
pub type GlobalInstructionProvider = InstructionProvider;
