use loom_core::{
    Agent, Artifacts, CallbackContext, Content, Event, EventActions, Memory, MemoryEntry,
    ReadonlyContext, Result, RunConfig, Session, State,
};
use loom_session::Session as SessionHandle;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

/// MutableSession wraps a session with shared mutable state.
///
/// State changes from events are immediately visible to every context built
/// on top of the same `MutableSession`, which is what lets a transfer target
/// see state the outgoing agent just wrote without a round trip through the
/// session service.
pub struct MutableSession {
    /// The original session snapshot (for metadata like id, app_name, user_id).
    inner: Arc<dyn SessionHandle>,
    state: RwLock<HashMap<String, serde_json::Value>>,
    events: RwLock<Vec<Event>>,
}

impl MutableSession {
    pub fn new(session: Arc<dyn SessionHandle>) -> Self {
        let initial_state = session.state().all();
        let initial_events = session.events().all();
        Self { inner: session, state: RwLock::new(initial_state), events: RwLock::new(initial_events) }
    }

    /// Applies a state delta the way the session service would on commit:
    /// `temp:`-prefixed keys never survive past the event that carried them.
    pub fn apply_state_delta(&self, delta: &HashMap<String, serde_json::Value>) {
        if delta.is_empty() {
            return;
        }
        let mut state = self.state.write().unwrap();
        for (key, value) in delta {
            if !key.starts_with("temp:") {
                state.insert(key.clone(), value.clone());
            }
        }
    }

    pub fn append_event(&self, event: Event) {
        self.events.write().unwrap().push(event);
    }

    pub fn events_snapshot(&self) -> Vec<Event> {
        self.events.read().unwrap().clone()
    }
}

impl loom_core::Session for MutableSession {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn app_name(&self) -> &str {
        self.inner.app_name()
    }

    fn user_id(&self) -> &str {
        self.inner.user_id()
    }

    fn state(&self) -> &dyn State {
        self
    }

    /// Every event this crate produces already carries a correctly-set
    /// `Content.role` (`"user"` for the user turn and for tool-result
    /// turns, `"model"` for model turns), so projecting history is a plain
    /// extraction with no author-based remapping needed.
    fn conversation_history(&self) -> Vec<Content> {
        self.events.read().unwrap().iter().filter_map(|e| e.llm_response.content.clone()).collect()
    }
}

impl State for MutableSession {
    fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.state.read().unwrap().get(key).cloned()
    }

    fn set(&mut self, key: String, value: serde_json::Value) {
        self.state.write().unwrap().insert(key, value);
    }

    fn all(&self) -> HashMap<String, serde_json::Value> {
        self.state.read().unwrap().clone()
    }
}

/// The turn-scoped context threaded through one `Runner::run` call.
///
/// Wraps a `MutableSession` and owns an `actions` buffer
/// (`Mutex<EventActions>`), the same pattern `AgentToolContext` uses one
/// level down in `loom-agent`: `get_state` reads through the buffer first
/// and falls back to the session; `set_state` only ever writes the buffer.
pub struct InvocationContext {
    invocation_id: String,
    agent: Arc<dyn Agent>,
    user_id: String,
    app_name: String,
    session_id: String,
    branch: String,
    user_content: Content,
    artifacts: Option<Arc<dyn Artifacts>>,
    memory: Option<Arc<dyn Memory>>,
    run_config: RunConfig,
    ended: Arc<AtomicBool>,
    session: Arc<MutableSession>,
    actions: Mutex<EventActions>,
}

impl InvocationContext {
    pub fn new(
        invocation_id: String,
        agent: Arc<dyn Agent>,
        user_id: String,
        app_name: String,
        session_id: String,
        user_content: Content,
        session: Arc<dyn SessionHandle>,
    ) -> Self {
        Self::with_mutable_session(
            invocation_id,
            agent,
            user_id,
            app_name,
            session_id,
            user_content,
            Arc::new(MutableSession::new(session)),
        )
    }

    /// Builds a context over an existing `MutableSession` — used when
    /// re-entering the agent loop after a transfer, so state the outgoing
    /// agent wrote is visible to the incoming one.
    pub fn with_mutable_session(
        invocation_id: String,
        agent: Arc<dyn Agent>,
        user_id: String,
        app_name: String,
        session_id: String,
        user_content: Content,
        session: Arc<MutableSession>,
    ) -> Self {
        Self {
            invocation_id,
            agent,
            user_id,
            app_name,
            session_id,
            branch: String::new(),
            user_content,
            artifacts: None,
            memory: None,
            run_config: RunConfig::default(),
            ended: Arc::new(AtomicBool::new(false)),
            session,
            actions: Mutex::new(EventActions::default()),
        }
    }

    pub fn with_branch(mut self, branch: String) -> Self {
        self.branch = branch;
        self
    }

    pub fn with_artifacts(mut self, artifacts: Arc<dyn Artifacts>) -> Self {
        self.artifacts = Some(artifacts);
        self
    }

    pub fn with_memory(mut self, memory: Arc<dyn Memory>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_run_config(mut self, config: RunConfig) -> Self {
        self.run_config = config;
        self
    }

    /// Reference to the mutable session, so the Runner can apply state
    /// deltas as events are committed.
    pub fn mutable_session(&self) -> &Arc<MutableSession> {
        &self.session
    }
}

#[async_trait]
impl ReadonlyContext for InvocationContext {
    fn invocation_id(&self) -> &str {
        &self.invocation_id
    }

    fn agent_name(&self) -> &str {
        self.agent.name()
    }

    fn user_id(&self) -> &str {
        &self.user_id
    }

    fn app_name(&self) -> &str {
        &self.app_name
    }

    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn branch(&self) -> &str {
        &self.branch
    }

    fn user_content(&self) -> &Content {
        &self.user_content
    }
}

#[async_trait]
impl CallbackContext for InvocationContext {
    fn get_state(&self, key: &str) -> Option<serde_json::Value> {
        if let Some(value) = self.actions.lock().unwrap().state_delta.get(key) {
            return Some(value.clone());
        }
        self.session.state().get(key)
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

    fn artifacts(&self) -> Option<Arc<dyn Artifacts>> {
        self.artifacts.clone()
    }

    async fn search_memory(&self, query: &str) -> Result<Vec<MemoryEntry>> {
        match &self.memory {
            Some(memory) => memory.search(query).await,
            None => Ok(vec![]),
        }
    }
}

#[async_trait]
impl loom_core::InvocationContext for InvocationContext {
    fn agent(&self) -> Arc<dyn Agent> {
        self.agent.clone()
    }

    fn memory(&self) -> Option<Arc<dyn Memory>> {
        self.memory.clone()
    }

    fn session(&self) -> &dyn loom_core::Session {
        self.session.as_ref()
    }

    fn run_config(&self) -> &RunConfig {
        &self.run_config
    }

    fn end_invocation(&self) {
        self.ended.store(true, Ordering::SeqCst);
    }

    fn ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_session::Events;

    #[derive(Debug)]
    struct EmptyState;
    impl State for EmptyState {
        fn get(&self, _key: &str) -> Option<serde_json::Value> {
            None
        }
        fn set(&mut self, _key: String, _value: serde_json::Value) {}
        fn all(&self) -> HashMap<String, serde_json::Value> {
            HashMap::new()
        }
    }

    #[derive(Debug)]
    struct EmptyEvents;
    impl Events for EmptyEvents {
        fn all(&self) -> Vec<Event> {
            Vec::new()
        }
        fn len(&self) -> usize {
            0
        }
        fn at(&self, _index: usize) -> Option<&Event> {
            None
        }
    }

    #[derive(Debug)]
    struct StubSession {
        id: String,
        empty_state: EmptyState,
        empty_events: EmptyEvents,
    }

    impl StubSession {
        fn new(id: &str) -> Self {
            Self { id: id.to_string(), empty_state: EmptyState, empty_events: EmptyEvents }
        }
    }

    impl SessionHandle for StubSession {
        fn id(&self) -> &str {
            &self.id
        }
        fn app_name(&self) -> &str {
            "app"
        }
        fn user_id(&self) -> &str {
            "user"
        }
        fn state(&self) -> &dyn State {
            &self.empty_state
        }
        fn events(&self) -> &dyn Events {
            &self.empty_events
        }
        fn last_update_time(&self) -> chrono::DateTime<chrono::Utc> {
            chrono::Utc::now()
        }
    }

    struct StubAgent;
    #[async_trait]
    impl Agent for StubAgent {
        fn name(&self) -> &str {
            "stub"
        }
        fn description(&self) -> &str {
            ""
        }
        fn sub_agents(&self) -> &[Arc<dyn Agent>] {
            &[]
        }
        async fn run(&self, _ctx: Arc<dyn loom_core::InvocationContext>) -> Result<loom_core::EventStream> {
            Ok(Box::pin(futures::stream::empty()))
        }
    }

    fn mutable_session() -> Arc<MutableSession> {
        Arc::new(MutableSession::new(Arc::new(StubSession::new("s1"))))
    }

    #[test]
    fn test_apply_state_delta_is_visible_through_state_trait() {
        let session = mutable_session();
        let mut delta = HashMap::new();
        delta.insert("count".to_string(), serde_json::json!(1));
        session.apply_state_delta(&delta);
        assert_eq!(session.state().get("count"), Some(serde_json::json!(1)));
    }

    #[test]
    fn test_apply_state_delta_drops_temp_keys() {
        let session = mutable_session();
        let mut delta = HashMap::new();
        delta.insert("temp:scratch".to_string(), serde_json::json!("gone"));
        session.apply_state_delta(&delta);
        assert_eq!(session.state().get("temp:scratch"), None);
    }

    #[test]
    fn test_conversation_history_projects_event_content_in_order() {
        let session = mutable_session();
        let mut first = Event::new("inv");
        first.llm_response.content = Some(Content::new("user").with_text("hi"));
        let mut second = Event::new("inv");
        second.llm_response.content = Some(Content::new("model").with_text("hello"));
        session.append_event(first);
        session.append_event(second);

        let history = session.conversation_history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, "user");
        assert_eq!(history[1].role, "model");
    }

    #[test]
    fn test_callback_context_get_state_prefers_own_buffer_over_session() {
        let session = mutable_session();
        let mut delta = HashMap::new();
        delta.insert("k".to_string(), serde_json::json!("session-value"));
        session.apply_state_delta(&delta);

        let ctx = InvocationContext::with_mutable_session(
            "inv".to_string(),
            Arc::new(StubAgent) as Arc<dyn Agent>,
            "user".to_string(),
            "app".to_string(),
            "s1".to_string(),
            Content::new("user"),
            session,
        );
        ctx.set_state("k".to_string(), serde_json::json!("buffered-value"));
        assert_eq!(ctx.get_state("k"), Some(serde_json::json!("buffered-value")));
        assert_eq!(ctx.actions().state_delta.get("k"), Some(&serde_json::json!("buffered-value")));
    }

    #[test]
    fn test_end_invocation_is_observed_through_shared_flag() {
        use loom_core::InvocationContext as _;

        let session = mutable_session();
        let ctx = InvocationContext::with_mutable_session(
            "inv".to_string(),
            Arc::new(StubAgent) as Arc<dyn Agent>,
            "user".to_string(),
            "app".to_string(),
            "s1".to_string(),
            Content::new("user"),
            session,
        );
        assert!(!ctx.ended());
        ctx.end_invocation();
        assert!(ctx.ended());
    }
}
