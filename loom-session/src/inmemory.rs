use crate::{
    CreateRequest, DeleteRequest, Event, Events, GetRequest, ListRequest, Session, SessionService,
    State,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use loom_core::{LoomError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

type StateMap = HashMap<String, Value>;

#[derive(Clone)]
struct SessionData {
    id: SessionId,
    events: Vec<Event>,
    state: StateMap,
    updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct SessionId {
    app_name: String,
    user_id: String,
    session_id: String,
}

impl SessionId {
    fn key(&self) -> String {
        format!("{}:{}:{}", self.app_name, self.user_id, self.session_id)
    }
}

/// A single-process session store. Sessions live in one top-level map keyed
/// by `app:user:session`; app- and user-scoped state live in their own maps
/// so they can be shared across every session for that app/user pair.
pub struct InMemorySessionService {
    sessions: Arc<RwLock<HashMap<String, SessionData>>>,
    app_state: Arc<RwLock<HashMap<String, StateMap>>>,
    user_state: Arc<RwLock<HashMap<String, HashMap<String, StateMap>>>>,
}

impl InMemorySessionService {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            app_state: Arc::new(RwLock::new(HashMap::new())),
            user_state: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemorySessionService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionService for InMemorySessionService {
    async fn create(&self, req: CreateRequest) -> Result<Box<dyn Session>> {
        let session_id = req.session_id.unwrap_or_else(|| Uuid::new_v4().to_string());

        let id = SessionId {
            app_name: req.app_name.clone(),
            user_id: req.user_id.clone(),
            session_id: session_id.clone(),
        };

        {
            let sessions = self.sessions.read().unwrap();
            if sessions.contains_key(&id.key()) {
                return Err(LoomError::AlreadyExists(format!("session {session_id} already exists")));
            }
        }

        let (app_delta, user_delta, session_state) = loom_core::extract_deltas(&req.state);

        let mut app_state_lock = self.app_state.write().unwrap();
        let app_state = app_state_lock.entry(req.app_name.clone()).or_default();
        app_state.extend(app_delta);
        let app_state_clone = app_state.clone();
        drop(app_state_lock);

        let mut user_state_lock = self.user_state.write().unwrap();
        let user_map = user_state_lock.entry(req.app_name.clone()).or_default();
        let user_state = user_map.entry(req.user_id.clone()).or_default();
        user_state.extend(user_delta);
        let user_state_clone = user_state.clone();
        drop(user_state_lock);

        let merged_state = loom_core::merge_states(&app_state_clone, &user_state_clone, &session_state);

        let now = Utc::now();
        let data = SessionData { id: id.clone(), events: Vec::new(), state: merged_state.clone(), updated_at: now };

        let mut sessions = self.sessions.write().unwrap();
        if sessions.contains_key(&id.key()) {
            return Err(LoomError::AlreadyExists(format!("session {session_id} already exists")));
        }
        sessions.insert(id.key(), data);
        drop(sessions);

        Ok(Box::new(InMemorySession { id, state: merged_state, events: Vec::new(), updated_at: now }))
    }

    async fn get(&self, req: GetRequest) -> Result<Box<dyn Session>> {
        let id =
            SessionId { app_name: req.app_name.clone(), user_id: req.user_id.clone(), session_id: req.session_id.clone() };

        let sessions = self.sessions.read().unwrap();
        let data = sessions
            .get(&id.key())
            .ok_or_else(|| LoomError::NotFound(format!("session {} not found", req.session_id)))?;

        let app_state_lock = self.app_state.read().unwrap();
        let app_state = app_state_lock.get(&req.app_name).cloned().unwrap_or_default();
        drop(app_state_lock);

        let user_state_lock = self.user_state.read().unwrap();
        let user_state =
            user_state_lock.get(&req.app_name).and_then(|m| m.get(&req.user_id)).cloned().unwrap_or_default();
        drop(user_state_lock);

        let merged_state = loom_core::merge_states(&app_state, &user_state, &data.state);

        let mut events = data.events.clone();
        // `after` is a strict exclusive lower bound: events timestamped
        // exactly at the cursor were already seen by the caller.
        if let Some(after) = req.after {
            events.retain(|e| e.timestamp > after);
        }
        if let Some(num) = req.num_recent_events {
            let start = events.len().saturating_sub(num);
            events = events[start..].to_vec();
        }

        Ok(Box::new(InMemorySession { id: data.id.clone(), state: merged_state, events, updated_at: data.updated_at }))
    }

    async fn list(&self, req: ListRequest) -> Result<Vec<Box<dyn Session>>> {
        let sessions = self.sessions.read().unwrap();
        let mut result = Vec::new();

        for data in sessions.values() {
            if data.id.app_name == req.app_name && data.id.user_id == req.user_id {
                result.push(Box::new(InMemorySession {
                    id: data.id.clone(),
                    state: data.state.clone(),
                    events: data.events.clone(),
                    updated_at: data.updated_at,
                }) as Box<dyn Session>);
            }
        }

        Ok(result)
    }

    async fn delete(&self, req: DeleteRequest) -> Result<()> {
        let id = SessionId { app_name: req.app_name, user_id: req.user_id, session_id: req.session_id };

        let mut sessions = self.sessions.write().unwrap();
        sessions.remove(&id.key());
        Ok(())
    }

    async fn append_event(&self, session_id: &str, mut event: Event) -> Result<()> {
        // A partial streaming chunk carries content but no durable state
        // change yet, and never lands in the session's event log at all.
        if event.llm_response.partial {
            return Ok(());
        }

        let trimmed_delta = loom_core::trim_temp_delta(&event.actions.state_delta);
        event.actions.state_delta = trimmed_delta.clone();

        let (app_name, user_id, app_delta, user_delta) = {
            let mut sessions = self.sessions.write().unwrap();
            let data = sessions
                .values_mut()
                .find(|d| d.id.session_id == session_id)
                .ok_or_else(|| LoomError::NotFound(format!("session {session_id} not found")))?;

            // Stamped inside the write lock so concurrent appends never
            // observe out-of-order timestamps for the same session.
            event.timestamp = Utc::now();

            let (app_delta, user_delta, session_delta) = loom_core::extract_deltas(&trimmed_delta);

            data.state.extend(session_delta);
            data.events.push(event.clone());
            data.updated_at = event.timestamp;

            (data.id.app_name.clone(), data.id.user_id.clone(), app_delta, user_delta)
        };

        if !app_delta.is_empty() {
            let mut app_state_lock = self.app_state.write().unwrap();
            let app_state = app_state_lock.entry(app_name.clone()).or_default();
            app_state.extend(app_delta);
        }

        if !user_delta.is_empty() {
            let mut user_state_lock = self.user_state.write().unwrap();
            let user_map = user_state_lock.entry(app_name).or_default();
            let user_state = user_map.entry(user_id).or_default();
            user_state.extend(user_delta);
        }

        Ok(())
    }
}

#[derive(Debug)]
struct InMemorySession {
    id: SessionId,
    state: StateMap,
    events: Vec<Event>,
    updated_at: DateTime<Utc>,
}

impl Session for InMemorySession {
    fn id(&self) -> &str {
        &self.id.session_id
    }

    fn app_name(&self) -> &str {
        &self.id.app_name
    }

    fn user_id(&self) -> &str {
        &self.id.user_id
    }

    fn state(&self) -> &dyn State {
        self
    }

    fn events(&self) -> &dyn Events {
        self
    }

    fn last_update_time(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

impl State for InMemorySession {
    fn get(&self, key: &str) -> Option<Value> {
        self.state.get(key).cloned()
    }

    fn set(&mut self, key: String, value: Value) {
        self.state.insert(key, value);
    }

    fn all(&self) -> HashMap<String, Value> {
        self.state.clone()
    }
}

impl Events for InMemorySession {
    fn all(&self) -> Vec<Event> {
        self.events.clone()
    }

    fn len(&self) -> usize {
        self.events.len()
    }

    fn at(&self, index: usize) -> Option<&Event> {
        self.events.get(index)
    }
}
