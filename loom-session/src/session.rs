use crate::{Events, State};
use chrono::{DateTime, Utc};

pub use loom_core::{KEY_PREFIX_APP, KEY_PREFIX_TEMP, KEY_PREFIX_USER};

/// A stored conversation session: identity, scoped state, and its event log.
pub trait Session: Send + Sync + std::fmt::Debug {
    fn id(&self) -> &str;
    fn app_name(&self) -> &str;
    fn user_id(&self) -> &str;
    fn state(&self) -> &dyn State;
    fn events(&self) -> &dyn Events;
    fn last_update_time(&self) -> DateTime<Utc>;
}
