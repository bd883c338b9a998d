use loom_core::{
    AfterModelCallback, AfterToolCallback, Agent, BeforeModelCallback, BeforeToolCallback,
    CallbackContext, Content, Event, EventActions, FunctionResponse, GlobalInstructionProvider,
    InstructionProvider, InvocationContext, Llm, LlmRequest, LlmResponse, MemoryEntry,
    OnModelErrorCallback, OnToolErrorCallback, Part, ReadonlyContext, Result, Tool,
    ToolConfirmationDecision, ToolConfirmationPolicy, ToolConfirmationRequest, ToolContext,
    Toolset,
};
use async_stream::stream;
use async_trait::async_trait;
use futures::future::join_all;
use loom_plugin::{BeforeModelResult, PluginManager};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::Instrument;

pub struct LlmAgent {
    name: String,
    description: String,
    model: Arc<dyn Llm>,
    instruction: Option<String>,
    instruction_provider: Option<Arc<InstructionProvider>>,
    global_instruction: Option<String>,
    global_instruction_provider: Option<Arc<GlobalInstructionProvider>>,
    output_schema: Option<serde_json::Value>,
    include_contents: loom_core::IncludeContents,
    tools: Vec<Arc<dyn Tool>>,
    toolsets: Vec<Arc<dyn Toolset>>,
    sub_agents: Vec<Arc<dyn Agent>>,
    output_key: Option<String>,
    generate_content_config: Option<loom_core::GenerateContentConfig>,
    before_model_callbacks: Arc<Vec<BeforeModelCallback>>,
    after_model_callbacks: Arc<Vec<AfterModelCallback>>,
    on_model_error_callbacks: Arc<Vec<OnModelErrorCallback>>,
    before_tool_callbacks: Arc<Vec<BeforeToolCallback>>,
    after_tool_callbacks: Arc<Vec<AfterToolCallback>>,
    on_tool_error_callbacks: Arc<Vec<OnToolErrorCallback>>,
    tool_confirmation_policy: ToolConfirmationPolicy,
    plugin_manager: Option<Arc<PluginManager>>,
}

impl std::fmt::Debug for LlmAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmAgent")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("model", &self.model.name())
            .field("tools_count", &self.tools.len())
            .field("sub_agents_count", &self.sub_agents.len())
            .finish()
    }
}

pub struct LlmAgentBuilder {
    name: String,
    description: Option<String>,
    model: Option<Arc<dyn Llm>>,
    instruction: Option<String>,
    instruction_provider: Option<Arc<InstructionProvider>>,
    global_instruction: Option<String>,
    global_instruction_provider: Option<Arc<GlobalInstructionProvider>>,
    output_schema: Option<serde_json::Value>,
    include_contents: loom_core::IncludeContents,
    tools: Vec<Arc<dyn Tool>>,
    toolsets: Vec<Arc<dyn Toolset>>,
    sub_agents: Vec<Arc<dyn Agent>>,
    output_key: Option<String>,
    generate_content_config: Option<loom_core::GenerateContentConfig>,
    before_model_callbacks: Vec<BeforeModelCallback>,
    after_model_callbacks: Vec<AfterModelCallback>,
    on_model_error_callbacks: Vec<OnModelErrorCallback>,
    before_tool_callbacks: Vec<BeforeToolCallback>,
    after_tool_callbacks: Vec<AfterToolCallback>,
    on_tool_error_callbacks: Vec<OnToolErrorCallback>,
    tool_confirmation_policy: ToolConfirmationPolicy,
    plugin_manager: Option<Arc<PluginManager>>,
}

impl LlmAgentBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            model: None,
            instruction: None,
            instruction_provider: None,
            global_instruction: None,
            global_instruction_provider: None,
            output_schema: None,
            include_contents: loom_core::IncludeContents::Default,
            tools: Vec::new(),
            toolsets: Vec::new(),
            sub_agents: Vec::new(),
            output_key: None,
            generate_content_config: None,
            before_model_callbacks: Vec::new(),
            after_model_callbacks: Vec::new(),
            on_model_error_callbacks: Vec::new(),
            before_tool_callbacks: Vec::new(),
            after_tool_callbacks: Vec::new(),
            on_tool_error_callbacks: Vec::new(),
            tool_confirmation_policy: ToolConfirmationPolicy::Never,
            plugin_manager: None,
        }
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn model(mut self, model: Arc<dyn Llm>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = Some(instruction.into());
        self
    }

    pub fn instruction_provider(mut self, provider: InstructionProvider) -> Self {
        self.instruction_provider = Some(Arc::new(provider));
        self
    }

    pub fn global_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.global_instruction = Some(instruction.into());
        self
    }

    pub fn global_instruction_provider(mut self, provider: GlobalInstructionProvider) -> Self {
        self.global_instruction_provider = Some(Arc::new(provider));
        self
    }

    pub fn output_schema(mut self, schema: serde_json::Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn include_contents(mut self, include: loom_core::IncludeContents) -> Self {
        self.include_contents = include;
        self
    }

    pub fn output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = Some(key.into());
        self
    }

    /// Default generation parameters applied to every request this agent makes.
    pub fn generate_content_config(mut self, config: loom_core::GenerateContentConfig) -> Self {
        self.generate_content_config = Some(config);
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.generate_content_config.get_or_insert_with(Default::default).temperature = Some(temperature);
        self
    }

    pub fn top_p(mut self, top_p: f32) -> Self {
        self.generate_content_config.get_or_insert_with(Default::default).top_p = Some(top_p);
        self
    }

    pub fn top_k(mut self, top_k: i32) -> Self {
        self.generate_content_config.get_or_insert_with(Default::default).top_k = Some(top_k);
        self
    }

    pub fn max_output_tokens(mut self, max_tokens: i32) -> Self {
        self.generate_content_config.get_or_insert_with(Default::default).max_output_tokens = Some(max_tokens);
        self
    }

    pub fn tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn toolset(mut self, toolset: Arc<dyn Toolset>) -> Self {
        self.toolsets.push(toolset);
        self
    }

    pub fn sub_agent(mut self, agent: Arc<dyn Agent>) -> Self {
        self.sub_agents.push(agent);
        self
    }

    pub fn before_model_callback(mut self, callback: BeforeModelCallback) -> Self {
        self.before_model_callbacks.push(callback);
        self
    }

    pub fn after_model_callback(mut self, callback: AfterModelCallback) -> Self {
        self.after_model_callbacks.push(callback);
        self
    }

    pub fn on_model_error_callback(mut self, callback: OnModelErrorCallback) -> Self {
        self.on_model_error_callbacks.push(callback);
        self
    }

    pub fn before_tool_callback(mut self, callback: BeforeToolCallback) -> Self {
        self.before_tool_callbacks.push(callback);
        self
    }

    pub fn after_tool_callback(mut self, callback: AfterToolCallback) -> Self {
        self.after_tool_callbacks.push(callback);
        self
    }

    pub fn on_tool_error_callback(mut self, callback: OnToolErrorCallback) -> Self {
        self.on_tool_error_callbacks.push(callback);
        self
    }

    pub fn tool_confirmation_policy(mut self, policy: ToolConfirmationPolicy) -> Self {
        self.tool_confirmation_policy = policy;
        self
    }

    pub fn require_tool_confirmation(mut self, tool_name: impl Into<String>) -> Self {
        self.tool_confirmation_policy = self.tool_confirmation_policy.with_tool(tool_name);
        self
    }

    pub fn require_tool_confirmation_for_all(mut self) -> Self {
        self.tool_confirmation_policy = ToolConfirmationPolicy::Always;
        self
    }

    /// Plugin chain invoked around this agent's model and tool calls, in
    /// addition to (and after) the agent-local callbacks set above.
    pub fn plugin_manager(mut self, manager: Arc<PluginManager>) -> Self {
        self.plugin_manager = Some(manager);
        self
    }

    pub fn build(self) -> Result<LlmAgent> {
        let model = self.model.ok_or_else(|| loom_core::LoomError::Agent("Model is required".to_string()))?;

        Ok(LlmAgent {
            name: self.name,
            description: self.description.unwrap_or_default(),
            model,
            instruction: self.instruction,
            instruction_provider: self.instruction_provider,
            global_instruction: self.global_instruction,
            global_instruction_provider: self.global_instruction_provider,
            output_schema: self.output_schema,
            include_contents: self.include_contents,
            tools: self.tools,
            toolsets: self.toolsets,
            sub_agents: self.sub_agents,
            output_key: self.output_key,
            generate_content_config: self.generate_content_config,
            before_model_callbacks: Arc::new(self.before_model_callbacks),
            after_model_callbacks: Arc::new(self.after_model_callbacks),
            on_model_error_callbacks: Arc::new(self.on_model_error_callbacks),
            before_tool_callbacks: Arc::new(self.before_tool_callbacks),
            after_tool_callbacks: Arc::new(self.after_tool_callbacks),
            on_tool_error_callbacks: Arc::new(self.on_tool_error_callbacks),
            tool_confirmation_policy: self.tool_confirmation_policy,
            plugin_manager: self.plugin_manager,
        })
    }
}

/// `ToolContext` for one function-call dispatch. Reads fall through to the
/// parent invocation context; writes land in this call's own buffer so
/// concurrent calls in the same round never step on each other directly —
/// the buffers are merged once the round completes.
struct AgentToolContext {
    parent_ctx: Arc<dyn InvocationContext>,
    function_call_id: String,
    actions: Mutex<EventActions>,
}

impl AgentToolContext {
    fn new(parent_ctx: Arc<dyn InvocationContext>, function_call_id: String) -> Self {
        Self { parent_ctx, function_call_id, actions: Mutex::new(EventActions::default()) }
    }
}

#[async_trait]
impl ReadonlyContext for AgentToolContext {
    fn invocation_id(&self) -> &str {
        self.parent_ctx.invocation_id()
    }
    fn agent_name(&self) -> &str {
        self.parent_ctx.agent_name()
    }
    fn user_id(&self) -> &str {
        self.parent_ctx.user_id()
    }
    fn app_name(&self) -> &str {
        self.parent_ctx.app_name()
    }
    fn session_id(&self) -> &str {
        self.parent_ctx.session_id()
    }
    fn branch(&self) -> &str {
        self.parent_ctx.branch()
    }
    fn user_content(&self) -> &Content {
        self.parent_ctx.user_content()
    }
}

#[async_trait]
impl CallbackContext for AgentToolContext {
    fn get_state(&self, key: &str) -> Option<serde_json::Value> {
        if let Some(value) = self.actions.lock().unwrap().state_delta.get(key) {
            return Some(value.clone());
        }
        self.parent_ctx.get_state(key)
    }

    fn set_state(&self, key: String, value: serde_json::Value) {
        self.actions.lock().unwrap().state_delta.insert(key, value);
    }

    fn actions(&self) -> EventActions {
        self.actions.lock().unwrap().clone()
    }

    fn set_actions(&self, actions: EventActions) {
        *self.actions.lock().unwrap() = actions;
    }

    fn artifacts(&self) -> Option<Arc<dyn loom_core::Artifacts>> {
        self.parent_ctx.artifacts()
    }

    async fn search_memory(&self, query: &str) -> Result<Vec<MemoryEntry>> {
        if let Some(memory) = self.parent_ctx.memory() {
            memory.search(query).await
        } else {
            Ok(vec![])
        }
    }
}

#[async_trait]
impl ToolContext for AgentToolContext {
    fn function_call_id(&self) -> &str {
        &self.function_call_id
    }
}

/// Merges per-call action buffers from one round of parallel tool dispatch.
/// State keys are last-writer-wins by call index, with a warning on
/// conflicts; artifact deltas union; escalate/skip_summarization OR-reduce;
/// the first non-null transfer target wins, later ones are logged and
/// dropped; confirmation requests concatenate.
fn merge_tool_actions(buckets: Vec<EventActions>) -> EventActions {
    let mut merged = EventActions::default();
    for bucket in buckets {
        for (key, value) in bucket.state_delta {
            if merged.state_delta.contains_key(&key) {
                tracing::warn!(key = %key, "conflicting state key written by multiple tool calls in one round");
            }
            merged.state_delta.insert(key, value);
        }
        for (name, version) in bucket.artifact_delta {
            merged.artifact_delta.insert(name, version);
        }
        merged.skip_summarization |= bucket.skip_summarization;
        merged.escalate |= bucket.escalate;
        if let Some(target) = bucket.transfer_to_agent {
            if merged.transfer_to_agent.is_some() {
                tracing::warn!(target = %target, "ignoring additional transfer_to_agent target set in the same round");
            } else {
                merged.transfer_to_agent = Some(target);
            }
        }
        merged.requested_tool_confirmations.extend(bucket.requested_tool_confirmations);
    }
    merged
}

struct ToolCallOutcome {
    index: usize,
    response_part: Part,
    actions: EventActions,
    long_running: bool,
}

#[allow(clippy::too_many_arguments)]
async fn dispatch_tool_call(
    index: usize,
    call: loom_core::FunctionCall,
    ctx: Arc<dyn InvocationContext>,
    invocation_id: Arc<String>,
    tool_map: Arc<HashMap<String, Arc<dyn Tool>>>,
    sub_agent_names: Arc<Vec<String>>,
    tool_confirmation_policy: Arc<ToolConfirmationPolicy>,
    before_tool_callbacks: Arc<Vec<BeforeToolCallback>>,
    after_tool_callbacks: Arc<Vec<AfterToolCallback>>,
    on_tool_error_callbacks: Arc<Vec<OnToolErrorCallback>>,
    plugin_manager: Option<Arc<PluginManager>>,
    tool_timeout: std::time::Duration,
) -> Result<ToolCallOutcome> {
    let name = call.name.clone();
    let id = call.id.clone();
    let args = call.args.clone();

    if name == "transfer_to_agent" {
        let target = args.get("agent_name").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        let mut actions = EventActions::default();
        let response = if sub_agent_names.iter().any(|n| n == &target) {
            actions.transfer_to_agent = Some(target.clone());
            serde_json::json!({ "status": "transferring", "agent_name": target })
        } else {
            serde_json::json!({
                "error": format!("agent '{}' not found. Available agents: {:?}", target, sub_agent_names),
            })
        };
        return Ok(ToolCallOutcome {
            index,
            response_part: Part::function_response(FunctionResponse { name, id, response }),
            actions,
            long_running: false,
        });
    }

    let mut actions = EventActions::default();

    if tool_confirmation_policy.requires_confirmation(&name) {
        match ctx.run_config().tool_confirmation_decisions.get(&name).copied() {
            Some(ToolConfirmationDecision::Approve) => {}
            Some(ToolConfirmationDecision::Deny) => {
                let response = serde_json::json!({ "error": format!("tool '{}' execution denied by confirmation policy", name) });
                return Ok(ToolCallOutcome {
                    index,
                    response_part: Part::function_response(FunctionResponse { name, id, response }),
                    actions,
                    long_running: false,
                });
            }
            None => {
                actions.requested_tool_confirmations.push(ToolConfirmationRequest {
                    tool_name: name.clone(),
                    function_call_id: id.clone(),
                    args: args.clone(),
                });
                let response = serde_json::json!({ "status": "pending_confirmation" });
                return Ok(ToolCallOutcome {
                    index,
                    response_part: Part::function_response(FunctionResponse { name, id, response }),
                    actions,
                    long_running: false,
                });
            }
        }
    }

    let Some(tool) = tool_map.get(&name).cloned() else {
        let response = serde_json::json!({ "error": format!("tool {} not found", name) });
        return Ok(ToolCallOutcome {
            index,
            response_part: Part::function_response(FunctionResponse { name, id, response }),
            actions,
            long_running: false,
        });
    };

    let function_call_id = id.clone().unwrap_or_else(|| format!("{}_{}_{}", invocation_id, name, index));

    let mut call_args = args.clone();
    for callback in before_tool_callbacks.iter() {
        match callback(ctx.clone() as Arc<dyn CallbackContext>, &name, call_args.clone()).await? {
            Some(overridden) => {
                return Ok(ToolCallOutcome {
                    index,
                    response_part: Part::function_response(FunctionResponse { name, id, response: overridden }),
                    actions,
                    long_running: tool.is_long_running(),
                });
            }
            None => continue,
        }
    }
    call_args = args;

    let tool_ctx: Arc<dyn ToolContext> = Arc::new(AgentToolContext::new(ctx.clone(), function_call_id.clone()));

    if let Some(manager) = &plugin_manager {
        if let Some(overridden) = manager
            .run_before_tool(tool_ctx.clone() as Arc<dyn CallbackContext>, tool.clone(), call_args.clone())
            .await?
        {
            return Ok(ToolCallOutcome {
                index,
                response_part: Part::function_response(FunctionResponse { name, id, response: overridden }),
                actions: tool_ctx.actions(),
                long_running: tool.is_long_running(),
            });
        }
    }
    let span = tracing::info_span!("execute_tool", tool.name = %name, invocation.id = %invocation_id);

    let exec = async {
        tracing::debug!(tool.name = %name, "tool_call");
        tool.execute(tool_ctx.clone(), call_args.clone()).await
    }
    .instrument(span);

    let mut result = match tokio::time::timeout(tool_timeout, exec).await {
        Ok(Ok(value)) => {
            tracing::debug!(tool.name = %name, "tool_result");
            value
        }
        Ok(Err(e)) => {
            let mut recovered = None;
            for callback in on_tool_error_callbacks.iter() {
                match callback(ctx.clone() as Arc<dyn CallbackContext>, &name, &e).await? {
                    Some(value) => {
                        recovered = Some(value);
                        break;
                    }
                    None => continue,
                }
            }
            if recovered.is_none() {
                if let Some(manager) = &plugin_manager {
                    recovered = manager
                        .run_on_tool_error(tool_ctx.clone() as Arc<dyn CallbackContext>, tool.clone(), call_args.clone(), e.to_string())
                        .await?;
                }
            }
            recovered.unwrap_or_else(|| serde_json::json!({ "error": e.to_string() }))
        }
        Err(_) => {
            tracing::warn!(tool.name = %name, timeout_secs = tool_timeout.as_secs(), "tool_timeout");
            serde_json::json!({ "error": format!("tool '{}' timed out after {} seconds", name, tool_timeout.as_secs()) })
        }
    };

    let mut after_tool_handled = false;
    for callback in after_tool_callbacks.iter() {
        match callback(ctx.clone() as Arc<dyn CallbackContext>, &name, result.clone()).await? {
            Some(modified) => {
                result = modified;
                after_tool_handled = true;
                break;
            }
            None => continue,
        }
    }
    if !after_tool_handled {
        if let Some(manager) = &plugin_manager {
            if let Some(modified) = manager.run_after_tool(tool_ctx.clone() as Arc<dyn CallbackContext>, tool.clone(), result.clone()).await? {
                result = modified;
            }
        }
    }

    actions = tool_ctx.actions();

    Ok(ToolCallOutcome {
        index,
        response_part: Part::function_response(FunctionResponse { name, id, response: result }),
        actions,
        long_running: tool.is_long_running(),
    })
}

#[async_trait]
impl Agent for LlmAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn sub_agents(&self) -> &[Arc<dyn Agent>] {
        &self.sub_agents
    }

    #[tracing::instrument(
        skip(self, ctx),
        fields(agent.name = %self.name, invocation.id = %ctx.invocation_id(), session.id = %ctx.session_id())
    )]
    async fn run(&self, ctx: Arc<dyn InvocationContext>) -> Result<loom_core::EventStream> {
        tracing::info!("starting agent execution");

        let agent_name = self.name.clone();
        let invocation_id = Arc::new(ctx.invocation_id().to_string());
        let model = self.model.clone();
        let static_tools = self.tools.clone();
        let toolsets = self.toolsets.clone();
        let sub_agents = self.sub_agents.clone();
        let sub_agent_names: Arc<Vec<String>> = Arc::new(sub_agents.iter().map(|a| a.name().to_string()).collect());

        let instruction = self.instruction.clone();
        let instruction_provider = self.instruction_provider.clone();
        let global_instruction = self.global_instruction.clone();
        let global_instruction_provider = self.global_instruction_provider.clone();
        let output_key = self.output_key.clone();
        let output_schema = self.output_schema.clone();
        let generate_content_config = self.generate_content_config.clone();
        let include_contents = self.include_contents;
        let before_model_callbacks = self.before_model_callbacks.clone();
        let after_model_callbacks = self.after_model_callbacks.clone();
        let on_model_error_callbacks = self.on_model_error_callbacks.clone();
        let before_tool_callbacks = self.before_tool_callbacks.clone();
        let after_tool_callbacks = self.after_tool_callbacks.clone();
        let on_tool_error_callbacks = self.on_tool_error_callbacks.clone();
        let tool_confirmation_policy = Arc::new(self.tool_confirmation_policy.clone());
        let plugin_manager = self.plugin_manager.clone();

        let s = stream! {
            let mut conversation_history = Vec::new();

            if let Some(provider) = &global_instruction_provider {
                let text = provider(ctx.clone() as Arc<dyn ReadonlyContext>).await?;
                if !text.is_empty() {
                    conversation_history.push(Content::new("user").with_text(text));
                }
            } else if let Some(ref template) = global_instruction {
                let processed = loom_core::inject_session_state(ctx.as_ref(), template).await?;
                if !processed.is_empty() {
                    conversation_history.push(Content::new("user").with_text(processed));
                }
            }

            if let Some(provider) = &instruction_provider {
                let text = provider(ctx.clone() as Arc<dyn ReadonlyContext>).await?;
                if !text.is_empty() {
                    conversation_history.push(Content::new("user").with_text(text));
                }
            } else if let Some(ref template) = instruction {
                let processed = loom_core::inject_session_state(ctx.as_ref(), template).await?;
                if !processed.is_empty() {
                    conversation_history.push(Content::new("user").with_text(processed));
                }
            }

            // The runner appends the current user message to session history before
            // the agent tree runs, so this already includes the latest turn.
            let session_history = ctx.session().conversation_history();
            conversation_history.extend(session_history);

            let mut conversation_history = match include_contents {
                loom_core::IncludeContents::None => {
                    let instruction_count = conversation_history.iter()
                        .take_while(|c| c.role == "user" && c.parts.iter().any(|p| p.as_text().is_some_and(|t| !t.is_empty())))
                        .count();
                    let mut filtered: Vec<Content> = conversation_history.iter().take(instruction_count).cloned().collect();
                    if let Some(last) = conversation_history.last() {
                        if last.role == "user" {
                            filtered.push(last.clone());
                        }
                    }
                    filtered
                }
                loom_core::IncludeContents::Default => conversation_history,
            };

            let mut tools = static_tools.clone();
            for toolset in &toolsets {
                match toolset.tools(ctx.clone() as Arc<dyn ReadonlyContext>).await {
                    Ok(mut resolved) => tools.append(&mut resolved),
                    Err(e) => tracing::warn!(toolset.name = %toolset.name(), error = %e, "toolset resolution failed"),
                }
            }

            let tool_map: Arc<HashMap<String, Arc<dyn Tool>>> =
                Arc::new(tools.iter().map(|t| (t.name().to_string(), t.clone())).collect());

            let mut tool_declarations = HashMap::new();
            for tool in &tools {
                let mut decl = serde_json::json!({
                    "name": tool.name(),
                    "description": tool.description(),
                });
                if let Some(params) = tool.parameters_schema() {
                    decl["parameters"] = params;
                }
                tool_declarations.insert(tool.name().to_string(), decl);
            }

            if !sub_agents.is_empty() {
                tool_declarations.insert("transfer_to_agent".to_string(), serde_json::json!({
                    "name": "transfer_to_agent",
                    "description": "Transfer execution to another agent in this tree.",
                    "parameters": {
                        "type": "object",
                        "properties": {
                            "agent_name": { "type": "string", "description": "The name of the agent to transfer to." }
                        },
                        "required": ["agent_name"]
                    }
                }));
            }

            let max_iterations = ctx.run_config().max_iterations;
            let tool_timeout = ctx.run_config().tool_timeout;
            let mut iteration = 0usize;

            'turn: loop {
                iteration += 1;
                if iteration > max_iterations {
                    yield Err(loom_core::LoomError::IterationLimit(max_iterations));
                    return;
                }

                let config = match (&generate_content_config, &output_schema) {
                    (Some(base), Some(schema)) => {
                        let mut merged = base.clone();
                        merged.response_schema = Some(schema.clone());
                        Some(merged)
                    }
                    (Some(base), None) => Some(base.clone()),
                    (None, Some(schema)) => Some(loom_core::GenerateContentConfig { response_schema: Some(schema.clone()), ..Default::default() }),
                    (None, None) => None,
                };

                let mut request = LlmRequest {
                    model: model.name().to_string(),
                    contents: conversation_history.clone(),
                    tools: tool_declarations.clone(),
                    config,
                };

                let mut response_override = None;
                for callback in before_model_callbacks.iter() {
                    match callback(ctx.clone() as Arc<dyn CallbackContext>, request.clone()).await {
                        Ok(Some(response)) => {
                            response_override = Some(response);
                            break;
                        }
                        Ok(None) => continue,
                        Err(e) => { yield Err(e); return; }
                    }
                }

                if response_override.is_none() {
                    if let Some(manager) = &plugin_manager {
                        match manager.run_before_model(ctx.clone() as Arc<dyn CallbackContext>, request.clone()).await {
                            Ok(BeforeModelResult::Continue(modified)) => request = modified,
                            Ok(BeforeModelResult::Skip(response)) => response_override = Some(response),
                            Err(e) => { yield Err(e); return; }
                        }
                    }
                }

                let mut response = if let Some(response) = response_override {
                    response
                } else {
                    let span = tracing::info_span!("call_llm", invocation.id = %invocation_id, session.id = %ctx.session_id());
                    let _guard = span.enter();
                    match model.generate_content(request.clone(), false).await {
                        Ok(mut chunks) => {
                            use futures::StreamExt;
                            let mut accumulated: Option<LlmResponse> = None;
                            let mut stream_err = None;
                            while let Some(chunk) = chunks.next().await {
                                match chunk {
                                    Ok(chunk) => {
                                        let done = chunk.turn_complete;
                                        match &mut accumulated {
                                            Some(acc) => {
                                                if let Some(chunk_content) = chunk.content.clone() {
                                                    match &mut acc.content {
                                                        Some(content) => content.parts.extend(chunk_content.parts),
                                                        None => acc.content = Some(chunk_content),
                                                    }
                                                }
                                                acc.finish_reason = chunk.finish_reason;
                                                acc.usage_metadata = chunk.usage_metadata.clone();
                                                acc.partial = chunk.partial;
                                                acc.turn_complete = chunk.turn_complete;
                                            }
                                            None => accumulated = Some(chunk),
                                        }
                                        if done {
                                            break;
                                        }
                                    }
                                    Err(e) => { stream_err = Some(e); break; }
                                }
                            }
                            match stream_err {
                                Some(e) => {
                                    let mut recovered = None;
                                    for callback in on_model_error_callbacks.iter() {
                                        match callback(ctx.clone() as Arc<dyn CallbackContext>, &e).await {
                                            Ok(Some(response)) => { recovered = Some(response); break; }
                                            Ok(None) => continue,
                                            Err(e) => { yield Err(e); return; }
                                        }
                                    }
                                    if recovered.is_none() {
                                        if let Some(manager) = &plugin_manager {
                                            match manager.run_on_model_error(ctx.clone() as Arc<dyn CallbackContext>, request.clone(), e.to_string()).await {
                                                Ok(value) => recovered = value,
                                                Err(e) => { yield Err(e); return; }
                                            }
                                        }
                                    }
                                    match recovered {
                                        Some(response) => response,
                                        None => { yield Err(e); return; }
                                    }
                                }
                                None => accumulated.unwrap_or_default(),
                            }
                        }
                        Err(e) => {
                            let mut recovered = None;
                            for callback in on_model_error_callbacks.iter() {
                                match callback(ctx.clone() as Arc<dyn CallbackContext>, &e).await {
                                    Ok(Some(response)) => { recovered = Some(response); break; }
                                    Ok(None) => continue,
                                    Err(e) => { yield Err(e); return; }
                                }
                            }
                            if recovered.is_none() {
                                if let Some(manager) = &plugin_manager {
                                    match manager.run_on_model_error(ctx.clone() as Arc<dyn CallbackContext>, request.clone(), e.to_string()).await {
                                        Ok(value) => recovered = value,
                                        Err(e) => { yield Err(e); return; }
                                    }
                                }
                            }
                            match recovered {
                                Some(response) => response,
                                None => { yield Err(e); return; }
                            }
                        }
                    }
                };

                let mut after_model_handled = false;
                for callback in after_model_callbacks.iter() {
                    match callback(ctx.clone() as Arc<dyn CallbackContext>, response.clone()).await {
                        Ok(Some(modified)) => { response = modified; after_model_handled = true; break; }
                        Ok(None) => continue,
                        Err(e) => { yield Err(e); return; }
                    }
                }
                if !after_model_handled {
                    if let Some(manager) = &plugin_manager {
                        match manager.run_after_model(ctx.clone() as Arc<dyn CallbackContext>, response.clone()).await {
                            Ok(Some(modified)) => response = modified,
                            Ok(None) => {}
                            Err(e) => { yield Err(e); return; }
                        }
                    }
                }

                let mut model_event = Event::new(invocation_id.as_str());
                model_event.author = agent_name.clone();
                model_event.llm_response = response.clone();
                yield Ok(model_event.clone());

                if let Some(ref content) = response.content {
                    conversation_history.push(content.clone());

                    if let Some(ref key) = output_key {
                        if content.function_calls().is_empty() {
                            let text = content.text();
                            if !text.is_empty() {
                                let mut state_event = Event::new(invocation_id.as_str());
                                state_event.author = agent_name.clone();
                                state_event.actions.state_delta.insert(key.clone(), serde_json::Value::String(text));
                                yield Ok(state_event);
                            }
                        }
                    }
                }

                if model_event.is_final_response() {
                    tracing::info!("agent execution complete");
                    break 'turn;
                }

                let Some(content) = response.content.clone() else { break 'turn };
                let calls: Vec<loom_core::FunctionCall> = content.function_calls().into_iter().cloned().collect();
                if calls.is_empty() {
                    break 'turn;
                }

                let outcomes = join_all(calls.into_iter().enumerate().map(|(index, call)| {
                    dispatch_tool_call(
                        index,
                        call,
                        ctx.clone(),
                        invocation_id.clone(),
                        tool_map.clone(),
                        sub_agent_names.clone(),
                        tool_confirmation_policy.clone(),
                        before_tool_callbacks.clone(),
                        after_tool_callbacks.clone(),
                        on_tool_error_callbacks.clone(),
                        plugin_manager.clone(),
                        tool_timeout,
                    )
                }))
                .await;

                let mut outcomes: Vec<ToolCallOutcome> = match outcomes.into_iter().collect::<Result<Vec<_>>>() {
                    Ok(outcomes) => outcomes,
                    Err(e) => { yield Err(e); return; }
                };
                outcomes.sort_by_key(|o| o.index);

                let long_running_ids: Vec<String> = outcomes.iter()
                    .filter(|o| o.long_running)
                    .filter_map(|o| match &o.response_part.kind {
                        loom_core::PartKind::FunctionResponse { function_response } => function_response.id.clone(),
                        _ => None,
                    })
                    .collect();

                let mut action_buckets: Vec<EventActions> = outcomes.iter().map(|o| o.actions.clone()).collect();
                action_buckets.push(ctx.actions());
                let merged_actions = merge_tool_actions(action_buckets);
                let response_content = Content { role: "user".to_string(), parts: outcomes.into_iter().map(|o| o.response_part).collect() };

                conversation_history.push(response_content.clone());

                let mut tool_event = Event::new(invocation_id.as_str());
                tool_event.author = agent_name.clone();
                tool_event.actions = merged_actions.clone();
                tool_event.long_running_tool_ids = long_running_ids;
                tool_event.llm_response.content = Some(response_content);
                yield Ok(tool_event.clone());

                if merged_actions.transfer_to_agent.is_some() || merged_actions.escalate {
                    break 'turn;
                }
                if tool_event.is_final_response() {
                    break 'turn;
                }
            }
        };

        Ok(Box::pin(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::mock_llm::MockLlm;
    use loom_core::{RunConfig, Session, State};
    use futures::StreamExt;

    struct MockState;
    impl State for MockState {
        fn get(&self, _key: &str) -> Option<serde_json::Value> {
            None
        }
        fn set(&mut self, _key: String, _value: serde_json::Value) {}
        fn all(&self) -> HashMap<String, serde_json::Value> {
            HashMap::new()
        }
    }

    struct MockSession {
        history: Vec<Content>,
    }
    impl Session for MockSession {
        fn id(&self) -> &str {
            "session"
        }
        fn app_name(&self) -> &str {
            "app"
        }
        fn user_id(&self) -> &str {
            "user"
        }
        fn state(&self) -> &dyn State {
            &MockState
        }
        fn conversation_history(&self) -> Vec<Content> {
            self.history.clone()
        }
    }

    struct TestContext {
        content: Content,
        config: RunConfig,
        session: MockSession,
    }

    impl TestContext {
        fn new(user_text: &str) -> Self {
            Self {
                content: Content::new("user").with_text(user_text),
                config: RunConfig::default(),
                session: MockSession { history: vec![Content::new("user").with_text(user_text)] },
            }
        }
    }

    #[async_trait]
    impl ReadonlyContext for TestContext {
        fn invocation_id(&self) -> &str {
            "inv"
        }
        fn agent_name(&self) -> &str {
            "assistant"
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
    impl CallbackContext for TestContext {
        fn get_state(&self, _key: &str) -> Option<serde_json::Value> {
            None
        }
        fn set_state(&self, _key: String, _value: serde_json::Value) {}
        fn actions(&self) -> EventActions {
            EventActions::default()
        }
        fn set_actions(&self, _actions: EventActions) {}
        fn artifacts(&self) -> Option<Arc<dyn loom_core::Artifacts>> {
            None
        }
        async fn search_memory(&self, _query: &str) -> Result<Vec<MemoryEntry>> {
            Ok(vec![])
        }
    }

    #[async_trait]
    impl InvocationContext for TestContext {
        fn agent(&self) -> Arc<dyn Agent> {
            unimplemented!()
        }
        fn memory(&self) -> Option<Arc<dyn loom_core::Memory>> {
            None
        }
        fn session(&self) -> &dyn Session {
            &self.session
        }
        fn run_config(&self) -> &RunConfig {
            &self.config
        }
        fn end_invocation(&self) {}
        fn ended(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn test_run_returns_final_text_response() {
        let model = Arc::new(MockLlm::with_text("hello there"));
        let agent = LlmAgentBuilder::new("assistant").model(model).build().unwrap();

        let ctx = Arc::new(TestContext::new("hi")) as Arc<dyn InvocationContext>;
        let mut events = agent.run(ctx).await.unwrap();
        let first = events.next().await.unwrap().unwrap();
        assert!(first.is_final_response());
        assert_eq!(first.llm_response.content.unwrap().text(), "hello there");
    }

    #[tokio::test]
    async fn test_output_key_written_on_final_text_response() {
        let model = Arc::new(MockLlm::with_text("42"));
        let agent = LlmAgentBuilder::new("assistant").model(model).output_key("answer").build().unwrap();

        let ctx = Arc::new(TestContext::new("what is it")) as Arc<dyn InvocationContext>;
        let mut events = agent.run(ctx).await.unwrap();
        let _model_event = events.next().await.unwrap().unwrap();
        let state_event = events.next().await.unwrap().unwrap();
        assert_eq!(state_event.actions.state_delta.get("answer").unwrap(), "42");
    }

    #[tokio::test]
    async fn test_max_iterations_exceeded_yields_error() {
        let model = Arc::new(MockLlm::with_function_call("loop_tool", serde_json::json!({})));
        let agent = LlmAgentBuilder::new("assistant").model(model).build().unwrap();

        let mut config = RunConfig::default();
        config.max_iterations = 1;
        let mut ctx = TestContext::new("go");
        ctx.config = config;
        let ctx = Arc::new(ctx) as Arc<dyn InvocationContext>;

        let mut events = agent.run(ctx).await.unwrap();
        let _model_event = events.next().await.unwrap().unwrap();
        let _tool_event = events.next().await.unwrap().unwrap();
        let err = events.next().await.unwrap();
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn test_transfer_to_agent_sets_actions_and_ends_turn() {
        let model = Arc::new(MockLlm::with_function_call("transfer_to_agent", serde_json::json!({ "agent_name": "worker" })));
        let worker = Arc::new(NoopAgent("worker"));
        let agent = LlmAgentBuilder::new("assistant").model(model).sub_agent(worker).build().unwrap();

        let ctx = Arc::new(TestContext::new("go")) as Arc<dyn InvocationContext>;
        let mut events = agent.run(ctx).await.unwrap();
        let _model_event = events.next().await.unwrap().unwrap();
        let tool_event = events.next().await.unwrap().unwrap();
        assert_eq!(tool_event.actions.transfer_to_agent, Some("worker".to_string()));
        assert!(events.next().await.is_none());
    }

    struct NoopAgent(&'static str);
    #[async_trait]
    impl Agent for NoopAgent {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            ""
        }
        fn sub_agents(&self) -> &[Arc<dyn Agent>] {
            &[]
        }
        async fn run(&self, _ctx: Arc<dyn InvocationContext>) -> Result<loom_core::EventStream> {
            Ok(Box::pin(futures::stream::empty()))
        }
    }

    #[tokio::test]
    async fn test_plugin_before_model_skip_bypasses_model_call() {
        use loom_plugin::{Plugin, PluginConfig, PluginManager};

        let model = Arc::new(MockLlm::with_text("should never be seen"));
        let plugins = vec![Plugin::new(PluginConfig {
            name: "cache".to_string(),
            before_model: Some(Box::new(|_ctx, _req| {
                Box::pin(async move {
                    Ok(BeforeModelResult::Skip(LlmResponse::new(Content::new("model").with_text("from cache"))))
                })
            })),
            ..Default::default()
        })];
        let manager = Arc::new(PluginManager::new(plugins).unwrap());

        let agent = LlmAgentBuilder::new("assistant").model(model).plugin_manager(manager).build().unwrap();

        let ctx = Arc::new(TestContext::new("hi")) as Arc<dyn InvocationContext>;
        let mut events = agent.run(ctx).await.unwrap();
        let first = events.next().await.unwrap().unwrap();
        assert_eq!(first.llm_response.content.unwrap().text(), "from cache");
    }

    #[test]
    fn test_merge_tool_actions_last_writer_wins_on_conflict() {
        let mut a = EventActions::default();
        a.state_delta.insert("x".to_string(), serde_json::json!(1));
        let mut b = EventActions::default();
        b.state_delta.insert("x".to_string(), serde_json::json!(2));

        let merged = merge_tool_actions(vec![a, b]);
        assert_eq!(merged.state_delta.get("x").unwrap(), &serde_json::json!(2));
    }

    #[test]
    fn test_merge_tool_actions_or_reduces_escalate() {
        let mut a = EventActions::default();
        a.escalate = false;
        let mut b = EventActions::default();
        b.escalate = true;

        let merged = merge_tool_actions(vec![a, b]);
        assert!(merged.escalate);
    }
}
