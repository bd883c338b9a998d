//! Content model: role-tagged multi-part messages exchanged between the
//! runtime, the model, and tools.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A role-tagged message made up of one or more [`Part`]s.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

/// One piece of a [`Content`] message.
///
/// Exactly one of the tagged variants carries data; `thought` marks a part as
/// model reasoning that should not be shown to the end user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Part {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub thought: bool,
    #[serde(flatten)]
    pub kind: PartKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PartKind {
    Text { text: String },
    FunctionCall { function_call: FunctionCall },
    FunctionResponse { function_response: FunctionResponse },
    InlineData { inline_data: InlineData },
    /// An empty placeholder, used only for streaming chunks not yet resolved
    /// into one of the variants above.
    Empty {},
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InlineData {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// A model-issued request to invoke a tool. `id` correlates the eventual
/// [`FunctionResponse`] back to this call when a round contains more than one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionResponse {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub response: Value,
}

impl Content {
    pub fn new(role: impl Into<String>) -> Self {
        Self { role: role.into(), parts: Vec::new() }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.parts.push(Part::text(text));
        self
    }

    pub fn with_part(mut self, part: Part) -> Self {
        self.parts.push(part);
        self
    }

    /// Concatenates every non-thought text part. Used to project a response
    /// into a plain string for `output_key` state writes.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter(|p| !p.thought)
            .filter_map(|p| match &p.kind {
                PartKind::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    pub fn function_calls(&self) -> Vec<&FunctionCall> {
        self.parts
            .iter()
            .filter_map(|p| match &p.kind {
                PartKind::FunctionCall { function_call } => Some(function_call),
                _ => None,
            })
            .collect()
    }

    pub fn function_responses(&self) -> Vec<&FunctionResponse> {
        self.parts
            .iter()
            .filter_map(|p| match &p.kind {
                PartKind::FunctionResponse { function_response } => Some(function_response),
                _ => None,
            })
            .collect()
    }
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self { thought: false, kind: PartKind::Text { text: text.into() } }
    }

    pub fn thought(text: impl Into<String>) -> Self {
        Self { thought: true, kind: PartKind::Text { text: text.into() } }
    }

    pub fn function_call(call: FunctionCall) -> Self {
        Self { thought: false, kind: PartKind::FunctionCall { function_call: call } }
    }

    pub fn function_response(response: FunctionResponse) -> Self {
        Self { thought: false, kind: PartKind::FunctionResponse { function_response: response } }
    }

    pub fn inline_data(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            thought: false,
            kind: PartKind::InlineData { inline_data: InlineData { mime_type: mime_type.into(), data } },
        }
    }

    /// Returns this part's text if it is a text part, regardless of `thought`.
    pub fn as_text(&self) -> Option<&str> {
        match &self.kind {
            PartKind::Text { text } => Some(text.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_creation() {
        let content = Content::new("user").with_text("Hello");
        assert_eq!(content.role, "user");
        assert_eq!(content.text(), "Hello");
    }

    #[test]
    fn test_part_serialization_roundtrip() {
        let part = Part::text("test");
        let json = serde_json::to_string(&part).unwrap();
        assert!(json.contains("test"));
        let back: Part = serde_json::from_str(&json).unwrap();
        assert_eq!(back, part);
    }

    #[test]
    fn test_function_call_id_roundtrip() {
        let fc = FunctionCall { name: "t".into(), id: Some("fc1".into()), args: serde_json::json!({}) };
        let part = Part::function_call(fc.clone());
        let json = serde_json::to_value(&part).unwrap();
        let back: Part = serde_json::from_value(json).unwrap();
        match back.kind {
            PartKind::FunctionCall { function_call } => assert_eq!(function_call, fc),
            _ => panic!("expected function call"),
        }
    }

    #[test]
    fn test_content_extracts_function_calls_and_responses() {
        let content = Content::new("model")
            .with_part(Part::function_call(FunctionCall { name: "a".into(), id: Some("1".into()), args: Value::Null }))
            .with_part(Part::text("done"));
        assert_eq!(content.function_calls().len(), 1);
        assert!(content.function_responses().is_empty());
        assert_eq!(content.text(), "done");
    }

    #[test]
    fn test_thought_part_excluded_from_text() {
        let content = Content::new("model").with_part(Part::thought("internal")).with_text("visible");
        assert_eq!(content.text(), "visible");
    }
}
