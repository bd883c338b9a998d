//! Pure state-scope arithmetic shared by the session service and the
//! context layers. Kept free of any storage concern so the round-trip law
//! (`merge_states(extract_deltas(m)) == m` minus `temp:` keys) is directly
//! testable without a session service in the loop.

use crate::event::{KEY_PREFIX_APP, KEY_PREFIX_TEMP, KEY_PREFIX_USER};
use serde_json::Value;
use std::collections::HashMap;

pub const MAX_STATE_KEY_LEN: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    App,
    User,
    Temp,
    Session,
}

/// Classifies a state key by its prefix.
pub fn scope(key: &str) -> Scope {
    if key.starts_with(KEY_PREFIX_APP) {
        Scope::App
    } else if key.starts_with(KEY_PREFIX_USER) {
        Scope::User
    } else if key.starts_with(KEY_PREFIX_TEMP) {
        Scope::Temp
    } else {
        Scope::Session
    }
}

/// Rejects empty keys and keys past [`MAX_STATE_KEY_LEN`].
pub fn validate_state_key(key: &str) -> Result<(), String> {
    if key.is_empty() {
        return Err("state key must not be empty".to_string());
    }
    if key.len() > MAX_STATE_KEY_LEN {
        return Err(format!("state key exceeds {MAX_STATE_KEY_LEN} bytes"));
    }
    Ok(())
}

/// Splits a flat state delta into its three persisted scopes, discarding
/// `temp:` entries and stripping the prefix from app/user keys.
pub fn extract_deltas(
    delta: &HashMap<String, Value>,
) -> (HashMap<String, Value>, HashMap<String, Value>, HashMap<String, Value>) {
    let mut app = HashMap::new();
    let mut user = HashMap::new();
    let mut session = HashMap::new();

    for (key, value) in delta {
        match scope(key) {
            Scope::App => {
                app.insert(key[KEY_PREFIX_APP.len()..].to_string(), value.clone());
            }
            Scope::User => {
                user.insert(key[KEY_PREFIX_USER.len()..].to_string(), value.clone());
            }
            Scope::Temp => {}
            Scope::Session => {
                session.insert(key.clone(), value.clone());
            }
        }
    }

    (app, user, session)
}

/// Reattaches scope prefixes and flattens into the merged view a session
/// read returns: app ∪ user ∪ session, with session-local keys unprefixed.
pub fn merge_states(
    app: &HashMap<String, Value>,
    user: &HashMap<String, Value>,
    session: &HashMap<String, Value>,
) -> HashMap<String, Value> {
    let mut merged = session.clone();
    for (k, v) in app {
        merged.insert(format!("{KEY_PREFIX_APP}{k}"), v.clone());
    }
    for (k, v) in user {
        merged.insert(format!("{KEY_PREFIX_USER}{k}"), v.clone());
    }
    merged
}

/// Strips `temp:` entries from a delta before it is persisted onto an event.
pub fn trim_temp_delta(delta: &HashMap<String, Value>) -> HashMap<String, Value> {
    delta.iter().filter(|(k, _)| scope(k) != Scope::Temp).map(|(k, v)| (k.clone(), v.clone())).collect()
}
