use loom_core::{LoomError, PartKind, Result, Tool, ToolContext};
use async_trait::async_trait;
use base64::Engine as _;
use serde_json::{Value, json};
use std::sync::Arc;

pub struct LoadArtifactsTool {
    name: String,
    description: String,
}

impl LoadArtifactsTool {
    pub fn new() -> Self {
        Self {
            name: "load_artifacts".to_string(),
            description: "Loads artifacts by name and returns their content. Accepts an array of artifact names.".to_string(),
        }
    }
}

impl Default for LoadArtifactsTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for LoadArtifactsTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn is_long_running(&self) -> bool {
        false
    }

    fn parameters_schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "artifact_names": {
                    "type": "array",
                    "items": {
                        "type": "string"
                    },
                    "description": "List of artifact names to load"
                }
            },
            "required": ["artifact_names"]
        }))
    }

    async fn execute(&self, ctx: Arc<dyn ToolContext>, args: Value) -> Result<Value> {
        let artifact_service =
            ctx.artifacts().ok_or_else(|| LoomError::Tool("artifact service not available".to_string()))?;

        let artifact_names = args["artifact_names"]
            .as_array()
            .ok_or_else(|| LoomError::Tool("artifact_names must be an array".to_string()))?;

        let mut results = Vec::new();

        for name_value in artifact_names {
            let name = name_value.as_str().ok_or_else(|| LoomError::Tool("artifact name must be a string".to_string()))?;

            match artifact_service.load(name, None).await {
                Ok(part) => {
                    let content = match &part.kind {
                        PartKind::Text { text } => json!({
                            "type": "text",
                            "text": text,
                        }),
                        PartKind::InlineData { inline_data } => {
                            let encoded = base64::engine::general_purpose::STANDARD.encode(&inline_data.data);
                            json!({
                                "type": "inline_data",
                                "mime_type": inline_data.mime_type,
                                "data_base64": encoded,
                                "size_bytes": inline_data.data.len(),
                            })
                        }
                        _ => json!({ "type": "unknown" }),
                    };

                    results.push(json!({
                        "name": name,
                        "content": content,
                    }));
                }
                Err(_) => {
                    results.push(json!({
                        "name": name,
                        "error": "artifact not found",
                    }));
                }
            }
        }

        Ok(json!({
            "artifacts": results,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_core::{
        Artifacts, CallbackContext, Content, EventActions, MemoryEntry, Part, ReadonlyContext, RunConfig,
    };
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct TestArtifacts {
        items: HashMap<String, Part>,
    }

    #[async_trait]
    impl Artifacts for TestArtifacts {
        async fn save(&self, _name: &str, _data: &Part) -> loom_core::Result<i64> {
            Ok(1)
        }

        async fn load(&self, name: &str, _version: Option<i64>) -> loom_core::Result<Part> {
            self.items.get(name).cloned().ok_or_else(|| LoomError::NotFound("not found".to_string()))
        }

        async fn list(&self) -> loom_core::Result<Vec<String>> {
            Ok(self.items.keys().cloned().collect())
        }
    }

    struct TestToolContext {
        content: Content,
        config: RunConfig,
        artifacts: Arc<TestArtifacts>,
        actions: Mutex<EventActions>,
    }

    impl TestToolContext {
        fn new(part: Part) -> Self {
            let mut items = HashMap::new();
            items.insert("doc".to_string(), part);
            Self {
                content: Content::new("user"),
                config: RunConfig::default(),
                artifacts: Arc::new(TestArtifacts { items }),
                actions: Mutex::new(EventActions::default()),
            }
        }
    }

    #[async_trait]
    impl ReadonlyContext for TestToolContext {
        fn invocation_id(&self) -> &str {
            "invocation"
        }
        fn agent_name(&self) -> &str {
            "agent"
        }
        fn user_id(&self) -> &str {
            "user"
        }
        fn app_name(&self) -> &str {
            "app"
        }
        fn session_id(&self) -> &str {
            "session"
        }
        fn branch(&self) -> &str {
            ""
        }
        fn user_content(&self) -> &Content {
            &self.content
        }
    }

    #[async_trait]
    impl CallbackContext for TestToolContext {
        fn get_state(&self, _key: &str) -> Option<Value> {
            None
        }
        fn set_state(&self, _key: String, _value: Value) {}
        fn actions(&self) -> EventActions {
            self.actions.lock().unwrap().clone()
        }
        fn set_actions(&self, actions: EventActions) {
            *self.actions.lock().unwrap() = actions;
        }
        fn artifacts(&self) -> Option<Arc<dyn Artifacts>> {
            Some(self.artifacts.clone())
        }
        async fn search_memory(&self, _query: &str) -> loom_core::Result<Vec<MemoryEntry>> {
            Ok(vec![])
        }
    }

    #[async_trait]
    impl ToolContext for TestToolContext {
        fn function_call_id(&self) -> &str {
            "call-123"
        }
    }

    #[tokio::test]
    async fn test_execute_base64_encodes_inline_data() {
        let tool = LoadArtifactsTool::new();
        let ctx = Arc::new(TestToolContext::new(Part {
            thought: false,
            kind: PartKind::InlineData {
                inline_data: loom_core::InlineData { mime_type: "application/pdf".to_string(), data: vec![0x25, 0x50, 0x44, 0x46] },
            },
        })) as Arc<dyn ToolContext>;

        let output = tool.execute(ctx, json!({ "artifact_names": ["doc"] })).await.expect("tool execution should succeed");

        assert_eq!(output["artifacts"][0]["content"]["mime_type"], "application/pdf");
        assert_eq!(output["artifacts"][0]["content"]["size_bytes"], 4);
    }

    #[tokio::test]
    async fn test_execute_reports_missing_artifact() {
        let tool = LoadArtifactsTool::new();
        let ctx = Arc::new(TestToolContext::new(Part::text("present"))) as Arc<dyn ToolContext>;

        let output = tool.execute(ctx, json!({ "artifact_names": ["missing"] })).await.unwrap();

        assert_eq!(output["artifacts"][0]["error"], "artifact not found");
    }
}
