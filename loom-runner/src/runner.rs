use crate::context::InvocationContext;
use crate::tree::{find_agent, validate_unique_names};
use loom_artifact::{ArtifactService, ScopedArtifacts};
use loom_core::{
    Agent, CallbackContext, Content, Event, EventStream, InvocationContext as InvocationContextTrait,
    LoomError, ReadonlyContext, Result, RunConfig,
};
use loom_memory::{MemoryService, ScopedMemory};
use loom_plugin::{Plugin, PluginManager};
use loom_session::{GetRequest, SessionService};
use async_stream::stream;
use futures::StreamExt;
use std::sync::Arc;
use tracing::Instrument;

pub struct RunnerConfig {
    pub app_name: String,
    pub agent: Arc<dyn Agent>,
    pub session_service: Arc<dyn SessionService>,
    pub artifact_service: Option<Arc<dyn ArtifactService>>,
    pub memory_service: Option<Arc<dyn MemoryService>>,
    pub plugins: Vec<Plugin>,
    pub run_config: Option<RunConfig>,
}

/// Drives one agent tree through repeated turns against a session.
///
/// Owns a `PluginManager` unconditionally rather than `Option<PluginManager>`
/// — an empty plugin list is already a no-op for every hook, so there is
/// exactly one code path through `run` regardless of whether the caller
/// registered plugins.
pub struct Runner {
    app_name: String,
    root_agent: Arc<dyn Agent>,
    session_service: Arc<dyn SessionService>,
    artifact_service: Option<Arc<dyn ArtifactService>>,
    memory_service: Option<Arc<dyn MemoryService>>,
    plugin_manager: Arc<PluginManager>,
    run_config: RunConfig,
}

impl Runner {
    pub fn new(config: RunnerConfig) -> Result<Self> {
        if let Some(name) = validate_unique_names(&config.agent) {
            return Err(LoomError::Agent(format!("duplicate agent name in tree: {name}")));
        }
        let plugin_manager = Arc::new(PluginManager::new(config.plugins)?);

        Ok(Self {
            app_name: config.app_name,
            root_agent: config.agent,
            session_service: config.session_service,
            artifact_service: config.artifact_service,
            memory_service: config.memory_service,
            plugin_manager,
            run_config: config.run_config.unwrap_or_default(),
        })
    }

    fn scoped_artifacts(
        artifact_service: &Option<Arc<dyn ArtifactService>>,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Option<Arc<ScopedArtifacts>> {
        artifact_service
            .clone()
            .map(|service| Arc::new(ScopedArtifacts::new(service, app_name.to_string(), user_id.to_string(), session_id.to_string())))
    }

    fn scoped_memory(memory_service: &Option<Arc<dyn MemoryService>>, app_name: &str, user_id: &str) -> Option<Arc<ScopedMemory>> {
        memory_service.clone().map(|service| Arc::new(ScopedMemory::new(service, app_name.to_string(), user_id.to_string())))
    }

    pub async fn run(&self, user_id: String, session_id: String, user_content: Content) -> Result<EventStream> {
        let app_name = self.app_name.clone();
        let session_service = self.session_service.clone();
        let root_agent = self.root_agent.clone();
        let artifact_service = self.artifact_service.clone();
        let memory_service = self.memory_service.clone();
        let plugin_manager = self.plugin_manager.clone();
        let run_config = self.run_config.clone();

        let s = stream! {
            // Step 1: resolve session — a missing session fails `not_found`,
            // creation is an explicit call this method never makes.
            let session = match session_service
                .get(GetRequest {
                    app_name: app_name.clone(),
                    user_id: user_id.clone(),
                    session_id: session_id.clone(),
                    num_recent_events: None,
                    after: None,
                })
                .await
            {
                Ok(s) => s,
                Err(e) => { yield Err(e); return; }
            };

            // Step 2: build the turn-scoped context.
            let invocation_id = format!("inv-{}", uuid::Uuid::new_v4());
            let mut invocation_ctx = InvocationContext::new(
                invocation_id.clone(),
                root_agent.clone(),
                user_id.clone(),
                app_name.clone(),
                session_id.clone(),
                user_content.clone(),
                Arc::from(session),
            );
            if let Some(scoped) = Self::scoped_artifacts(&artifact_service, &app_name, &user_id, &session_id) {
                invocation_ctx = invocation_ctx.with_artifacts(scoped);
            }
            if let Some(scoped) = Self::scoped_memory(&memory_service, &app_name, &user_id) {
                invocation_ctx = invocation_ctx.with_memory(scoped);
            }
            invocation_ctx = invocation_ctx.with_run_config(run_config.clone());
            let ctx = Arc::new(invocation_ctx);

            // Step 3: on_user_message may rewrite the content before it's ever committed.
            let mut effective_user_content = user_content.clone();
            match plugin_manager
                .run_on_user_message(ctx.clone() as Arc<dyn InvocationContextTrait>, effective_user_content.clone())
                .await
            {
                Ok(Some(modified)) => effective_user_content = modified,
                Ok(None) => {}
                Err(e) => { yield Err(e); return; }
            }

            let mut current_ctx = if effective_user_content == *ctx.user_content() {
                ctx.clone()
            } else {
                let mut rebuilt = InvocationContext::with_mutable_session(
                    invocation_id.clone(),
                    root_agent.clone(),
                    user_id.clone(),
                    app_name.clone(),
                    session_id.clone(),
                    effective_user_content.clone(),
                    ctx.mutable_session().clone(),
                );
                if let Some(scoped) = Self::scoped_artifacts(&artifact_service, &app_name, &user_id, &session_id) {
                    rebuilt = rebuilt.with_artifacts(scoped);
                }
                if let Some(scoped) = Self::scoped_memory(&memory_service, &app_name, &user_id) {
                    rebuilt = rebuilt.with_memory(scoped);
                }
                rebuilt = rebuilt.with_run_config(run_config.clone());
                Arc::new(rebuilt)
            };

            // Step 4: commit and yield the user turn.
            let mut user_event = Event::new(&invocation_id);
            user_event.author = "user".to_string();
            user_event.llm_response.content = Some(effective_user_content.clone());
            current_ctx.mutable_session().append_event(user_event.clone());
            if let Err(e) = session_service.append_event(&session_id, user_event.clone()).await {
                yield Err(e);
                return;
            }
            yield Ok(user_event);

            // Step 5: before_run may short-circuit the whole turn.
            match plugin_manager.run_before_run(current_ctx.clone() as Arc<dyn InvocationContextTrait>).await {
                Ok(Some(content)) => {
                    let mut early_event = Event::new(&invocation_id);
                    early_event.author = root_agent.name().to_string();
                    early_event.llm_response.content = Some(content);
                    current_ctx.mutable_session().append_event(early_event.clone());
                    if let Err(e) = session_service.append_event(&session_id, early_event.clone()).await {
                        yield Err(e);
                        return;
                    }
                    yield Ok(early_event);
                    plugin_manager.run_after_run(current_ctx.clone() as Arc<dyn InvocationContextTrait>).await;
                    return;
                }
                Ok(None) => {}
                Err(e) => {
                    plugin_manager.run_after_run(current_ctx.clone() as Arc<dyn InvocationContextTrait>).await;
                    yield Err(e);
                    return;
                }
            }

            // Step 6: drive current_agent, re-entering on every transfer.
            let mut current_agent = root_agent.clone();

            'turn: loop {
                match plugin_manager.run_before_agent(current_ctx.clone() as Arc<dyn CallbackContext>).await {
                    Ok(Some(content)) => {
                        let mut event = Event::new(current_ctx.invocation_id());
                        event.author = current_agent.name().to_string();
                        event.llm_response.content = Some(content);
                        current_ctx.mutable_session().append_event(event.clone());
                        if let Err(e) = session_service.append_event(&session_id, event.clone()).await {
                            plugin_manager.run_after_run(current_ctx.clone() as Arc<dyn InvocationContextTrait>).await;
                            yield Err(e);
                            return;
                        }
                        yield Ok(event);
                        break 'turn;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        plugin_manager.run_after_run(current_ctx.clone() as Arc<dyn InvocationContextTrait>).await;
                        yield Err(e);
                        return;
                    }
                }

                let agent_span = tracing::info_span!(
                    "agent.execute",
                    invocation.id = %current_ctx.invocation_id(),
                    session.id = %session_id,
                    agent.name = %current_agent.name()
                );
                let mut agent_stream = match current_agent.run(current_ctx.clone()).instrument(agent_span).await {
                    Ok(s) => s,
                    Err(e) => {
                        plugin_manager.run_after_run(current_ctx.clone() as Arc<dyn InvocationContextTrait>).await;
                        yield Err(e);
                        return;
                    }
                };

                let mut transfer_target: Option<String> = None;
                let mut escalated = false;

                while let Some(result) = agent_stream.next().await {
                    let mut event = match result {
                        Ok(event) => event,
                        Err(e) => {
                            plugin_manager.run_after_run(current_ctx.clone() as Arc<dyn InvocationContextTrait>).await;
                            yield Err(e);
                            return;
                        }
                    };

                    match plugin_manager
                        .run_on_event(current_ctx.clone() as Arc<dyn InvocationContextTrait>, event.clone())
                        .await
                    {
                        Ok(Some(modified)) => event = modified,
                        Ok(None) => {}
                        Err(e) => {
                            plugin_manager.run_after_run(current_ctx.clone() as Arc<dyn InvocationContextTrait>).await;
                            yield Err(e);
                            return;
                        }
                    }

                    if !event.llm_response.partial {
                        current_ctx.mutable_session().apply_state_delta(&event.actions.state_delta);
                        current_ctx.mutable_session().append_event(event.clone());
                        if let Err(e) = session_service.append_event(&session_id, event.clone()).await {
                            plugin_manager.run_after_run(current_ctx.clone() as Arc<dyn InvocationContextTrait>).await;
                            yield Err(e);
                            return;
                        }
                    }

                    if let Some(target) = event.actions.transfer_to_agent.clone() {
                        transfer_target = Some(target);
                    }
                    if event.actions.escalate {
                        escalated = true;
                    }

                    let stop_early = transfer_target.is_some() || escalated;
                    yield Ok(event);

                    if stop_early {
                        break;
                    }
                }

                match plugin_manager.run_after_agent(current_ctx.clone() as Arc<dyn CallbackContext>).await {
                    Ok(Some(content)) => {
                        let mut event = Event::new(current_ctx.invocation_id());
                        event.author = current_agent.name().to_string();
                        event.llm_response.content = Some(content);
                        current_ctx.mutable_session().append_event(event.clone());
                        if let Err(e) = session_service.append_event(&session_id, event.clone()).await {
                            plugin_manager.run_after_run(current_ctx.clone() as Arc<dyn InvocationContextTrait>).await;
                            yield Err(e);
                            return;
                        }
                        yield Ok(event);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        plugin_manager.run_after_run(current_ctx.clone() as Arc<dyn InvocationContextTrait>).await;
                        yield Err(e);
                        return;
                    }
                }

                if escalated {
                    break 'turn;
                }

                let Some(target_name) = transfer_target else { break 'turn };

                let Some(target_agent) = find_agent(&root_agent, &target_name) else {
                    plugin_manager.run_after_run(current_ctx.clone() as Arc<dyn InvocationContextTrait>).await;
                    yield Err(LoomError::TransferTargetMissing(target_name));
                    return;
                };

                let transfer_invocation_id = format!("inv-{}", uuid::Uuid::new_v4());
                let mut transfer_ctx = InvocationContext::with_mutable_session(
                    transfer_invocation_id,
                    target_agent.clone(),
                    user_id.clone(),
                    app_name.clone(),
                    session_id.clone(),
                    effective_user_content.clone(),
                    current_ctx.mutable_session().clone(),
                );
                if let Some(scoped) = Self::scoped_artifacts(&artifact_service, &app_name, &user_id, &session_id) {
                    transfer_ctx = transfer_ctx.with_artifacts(scoped);
                }
                if let Some(scoped) = Self::scoped_memory(&memory_service, &app_name, &user_id) {
                    transfer_ctx = transfer_ctx.with_memory(scoped);
                }
                transfer_ctx = transfer_ctx.with_run_config(run_config.clone());

                current_agent = target_agent;
                current_ctx = Arc::new(transfer_ctx);
            }

            // Step 8: after_run is notify-only.
            plugin_manager.run_after_run(current_ctx.clone() as Arc<dyn InvocationContextTrait>).await;
        };

        Ok(Box::pin(s))
    }
}
