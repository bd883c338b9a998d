use loom_core::{ReadonlyContext, Result, Tool, ToolPredicate, Toolset};
use async_trait::async_trait;
use std::sync::Arc;

pub struct BasicToolset {
    name: String,
    tools: Vec<Arc<dyn Tool>>,
    predicate: Option<ToolPredicate>,
}

impl BasicToolset {
    pub fn new(name: impl Into<String>, tools: Vec<Arc<dyn Tool>>) -> Self {
        Self { name: name.into(), tools, predicate: None }
    }

    pub fn with_predicate(mut self, predicate: ToolPredicate) -> Self {
        self.predicate = Some(predicate);
        self
    }
}

#[async_trait]
impl Toolset for BasicToolset {
    fn name(&self) -> &str {
        &self.name
    }

    async fn tools(&self, _ctx: Arc<dyn ReadonlyContext>) -> Result<Vec<Arc<dyn Tool>>> {
        if let Some(predicate) = &self.predicate {
            Ok(self.tools.iter().filter(|tool| predicate(tool.as_ref())).cloned().collect())
        } else {
            Ok(self.tools.clone())
        }
    }
}

/// Creates a predicate that allows only tools with names in the provided list
pub fn string_predicate(allowed_tools: Vec<String>) -> ToolPredicate {
    let allowed_set: std::collections::HashSet<String> = allowed_tools.into_iter().collect();
    Box::new(move |tool: &dyn Tool| allowed_set.contains(tool.name()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_core::{Content, ToolContext};
    use serde_json::Value;

    struct NamedTool(&'static str);

    #[async_trait]
    impl Tool for NamedTool {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            ""
        }
        async fn execute(&self, _ctx: Arc<dyn ToolContext>, _args: Value) -> Result<Value> {
            Ok(Value::Null)
        }
    }

    struct NullContext(Content);
    #[async_trait]
    impl ReadonlyContext for NullContext {
        fn invocation_id(&self) -> &str {
            "inv"
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
            &self.0
        }
    }

    #[tokio::test]
    async fn test_no_predicate_returns_all_tools() {
        let toolset = BasicToolset::new("all", vec![Arc::new(NamedTool("a")), Arc::new(NamedTool("b"))]);
        let ctx = Arc::new(NullContext(Content::new("user"))) as Arc<dyn ReadonlyContext>;
        let tools = toolset.tools(ctx).await.unwrap();
        assert_eq!(tools.len(), 2);
    }

    #[tokio::test]
    async fn test_string_predicate_filters_by_name() {
        let toolset = BasicToolset::new("filtered", vec![Arc::new(NamedTool("a")), Arc::new(NamedTool("b"))])
            .with_predicate(string_predicate(vec!["a".to_string()]));
        let ctx = Arc::new(NullContext(Content::new("user"))) as Arc<dyn ReadonlyContext>;
        let tools = toolset.tools(ctx).await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name(), "a");
    }
}
