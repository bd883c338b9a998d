use crate::context::ToolConfirmationRequest;
use crate::model::LlmResponse;
use crate::types::{Content, PartKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub const KEY_PREFIX_APP: &str = "app:";
pub const KEY_PREFIX_TEMP: &str = "temp:";
pub const KEY_PREFIX_USER: &str = "user:";

/// A single immutable interaction record. Embeds an [`LlmResponse`] so its
/// content and generation metadata are reachable directly off the event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub invocation_id: String,
    pub branch: String,
    pub author: String,
    #[serde(flatten)]
    pub llm_response: LlmResponse,
    pub actions: EventActions,
    /// IDs of tools that returned a pending placeholder rather than a result.
    #[serde(default)]
    pub long_running_tool_ids: Vec<String>,
    /// Provider-specific metadata, kept out of the core Event shape.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub provider_metadata: HashMap<String, String>,
}

/// Metadata for a compacted (summarized) event, produced when older events in
/// a session are folded into a single summary to bound context size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventCompaction {
    pub start_timestamp: DateTime<Utc>,
    pub end_timestamp: DateTime<Utc>,
    pub compacted_content: Content,
}

/// The side-effect bundle carried by an [`Event`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventActions {
    pub state_delta: HashMap<String, serde_json::Value>,
    pub artifact_delta: HashMap<String, i64>,
    pub skip_summarization: bool,
    pub transfer_to_agent: Option<String>,
    pub escalate: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requested_tool_confirmations: Vec<ToolConfirmationRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compaction: Option<EventCompaction>,
}

impl Event {
    pub fn new(invocation_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            invocation_id: invocation_id.into(),
            branch: String::new(),
            author: String::new(),
            llm_response: LlmResponse::default(),
            actions: EventActions::default(),
            long_running_tool_ids: Vec::new(),
            provider_metadata: HashMap::new(),
        }
    }

    /// Builds an event with an explicit id, for streaming chunks that must
    /// share one event identity across partial updates.
    pub fn with_id(id: impl Into<String>, invocation_id: impl Into<String>) -> Self {
        let mut event = Self::new(invocation_id);
        event.id = id.into();
        event
    }

    pub fn content(&self) -> Option<&Content> {
        self.llm_response.content.as_ref()
    }

    pub fn set_content(&mut self, content: Content) {
        self.llm_response.content = Some(content);
    }

    /// The terminator predicate for the agent loop (see the model/tool loop
    /// design): an event ends an agent's turn once summarization is skipped,
    /// a tool is pending (long-running or awaiting confirmation), or the
    /// content carries neither a function call nor a function response.
    pub fn is_final_response(&self) -> bool {
        if self.actions.skip_summarization
            || !self.long_running_tool_ids.is_empty()
            || !self.actions.requested_tool_confirmations.is_empty()
        {
            return true;
        }

        if self.llm_response.partial {
            return false;
        }

        !self.has_function_calls() && !self.has_function_responses()
    }

    fn has_function_calls(&self) -> bool {
        self.content().is_some_and(|c| !c.function_calls().is_empty())
    }

    fn has_function_responses(&self) -> bool {
        self.content().is_some_and(|c| !c.function_responses().is_empty())
    }

    /// Function-call IDs present in this event's content, used to tell the
    /// caller which calls returned a pending placeholder.
    pub fn function_call_ids(&self) -> Vec<String> {
        let Some(content) = self.content() else { return Vec::new() };
        content
            .parts
            .iter()
            .filter_map(|p| match &p.kind {
                PartKind::FunctionCall { function_call } => {
                    Some(function_call.id.clone().unwrap_or_else(|| function_call.name.clone()))
                }
                _ => None,
            })
            .collect()
    }
}
