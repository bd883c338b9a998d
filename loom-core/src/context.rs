use crate::event::EventActions;
use crate::{Agent, Result, types::Content};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

#[async_trait]
pub trait ReadonlyContext: Send + Sync {
    fn invocation_id(&self) -> &str;
    fn agent_name(&self) -> &str;
    fn user_id(&self) -> &str;
    fn app_name(&self) -> &str;
    fn session_id(&self) -> &str;
    fn branch(&self) -> &str;
    fn user_content(&self) -> &Content;
}

pub trait State: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&mut self, key: String, value: Value);
    fn all(&self) -> HashMap<String, Value>;
}

pub trait ReadonlyState: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn all(&self) -> HashMap<String, Value>;
}

pub trait Session: Send + Sync {
    fn id(&self) -> &str;
    fn app_name(&self) -> &str;
    fn user_id(&self) -> &str;
    fn state(&self) -> &dyn State;
    /// Conversation history as Content items, oldest first.
    fn conversation_history(&self) -> Vec<Content>;
}

/// Wraps an [`InvocationContext`] with a write-buffered actions bundle and
/// read-through state access. Lives for one callback boundary (before/after
/// agent, before/after model).
#[async_trait]
pub trait CallbackContext: ReadonlyContext {
    /// Reads with precedence: this context's own buffered delta, then the
    /// underlying session state.
    fn get_state(&self, key: &str) -> Option<Value>;
    /// Writes only into this context's buffer; never touches the session
    /// directly. Buffered writes are merged into the event's state_delta
    /// when the callback boundary closes.
    fn set_state(&self, key: String, value: Value);
    fn actions(&self) -> EventActions;
    fn set_actions(&self, actions: EventActions);
    fn artifacts(&self) -> Option<Arc<dyn Artifacts>>;
    async fn search_memory(&self, query: &str) -> Result<Vec<MemoryEntry>>;
}

/// The turn-scoped context threaded through one `Runner.run` call.
#[async_trait]
pub trait InvocationContext: CallbackContext {
    fn agent(&self) -> Arc<dyn Agent>;
    fn memory(&self) -> Option<Arc<dyn Memory>>;
    fn session(&self) -> &dyn Session;
    fn run_config(&self) -> &RunConfig;
    fn end_invocation(&self);
    fn ended(&self) -> bool;
}

#[async_trait]
pub trait Artifacts: Send + Sync {
    async fn save(&self, name: &str, data: &crate::types::Part) -> Result<i64>;
    async fn load(&self, name: &str, version: Option<i64>) -> Result<crate::types::Part>;
    async fn list(&self) -> Result<Vec<String>>;
}

#[async_trait]
pub trait Memory: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<MemoryEntry>>;
}

#[derive(Debug, Clone)]
pub struct MemoryEntry {
    pub content: Content,
    pub author: String,
}

/// Streaming mode for agent responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamingMode {
    /// No streaming; the agent collects all chunks and yields one final event.
    None,
    /// Server-Sent Events; each chunk is yielded as it arrives.
    #[default]
    SSE,
    /// Bidirectional streaming for realtime agents.
    Bidi,
}

/// Controls how much prior conversation history an `LlmAgent` receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IncludeContents {
    /// Only the current turn (latest user input plus any events it produced).
    None,
    /// The full relevant conversation history.
    #[default]
    Default,
}

/// Decision applied when a tool execution requires human confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolConfirmationDecision {
    Approve,
    Deny,
}

/// Policy defining which tools require human confirmation before execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToolConfirmationPolicy {
    #[default]
    Never,
    Always,
    PerTool(BTreeSet<String>),
}

impl ToolConfirmationPolicy {
    pub fn requires_confirmation(&self, tool_name: &str) -> bool {
        match self {
            Self::Never => false,
            Self::Always => true,
            Self::PerTool(tools) => tools.contains(tool_name),
        }
    }

    pub fn with_tool(mut self, tool_name: impl Into<String>) -> Self {
        let tool_name = tool_name.into();
        match &mut self {
            Self::Never => {
                let mut tools = BTreeSet::new();
                tools.insert(tool_name);
                Self::PerTool(tools)
            }
            Self::Always => Self::Always,
            Self::PerTool(tools) => {
                tools.insert(tool_name);
                self
            }
        }
    }
}

/// Payload describing a tool call awaiting human confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolConfirmationRequest {
    pub tool_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_call_id: Option<String>,
    pub args: Value,
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub streaming_mode: StreamingMode,
    /// Maximum model/tool round trips before the agent loop aborts with
    /// `IterationLimit`.
    pub max_iterations: usize,
    /// Per-call timeout applied to each tool execution.
    pub tool_timeout: std::time::Duration,
    /// Decisions resolving pending [`ToolConfirmationRequest`]s by tool name,
    /// supplied by the caller on a follow-up turn.
    pub tool_confirmation_decisions: HashMap<String, ToolConfirmationDecision>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            streaming_mode: StreamingMode::SSE,
            max_iterations: 20,
            tool_timeout: std::time::Duration::from_secs(60),
            tool_confirmation_decisions: HashMap::new(),
        }
    }
}
