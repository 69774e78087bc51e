use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::stylist::types::{Gender, OutfitDescriptions, OutfitImages};

/// The most recently generated base outfit.
#[derive(Debug, Clone)]
pub struct OutfitRecord {
    pub images: OutfitImages,
    pub descriptions: OutfitDescriptions,
    /// Composed prompt without any appendix.
    pub base_prompt: String,
    pub inferred_gender: Gender,
}

#[derive(Debug, Default)]
pub struct SessionState {
    pub outfit: Option<OutfitRecord>,
    pub suggestions: Vec<String>,
    /// Suggestions last applied together through "try all".
    pub applied_extras: Vec<String>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn suggestion(&self, index: usize) -> Option<&str> {
        self.suggestions.get(index).map(String::as_str)
    }
}

pub type SessionGuard = OwnedMutexGuard<SessionState>;

#[derive(Debug, thiserror::Error)]
#[error("another request is already running for this session")]
pub struct SessionBusy;

/// Sessions keyed by id, each allowing one in-flight operation.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<i64, Arc<AsyncMutex<SessionState>>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn session(&self, session_id: i64) -> Arc<AsyncMutex<SessionState>> {
        self.sessions
            .lock()
            .entry(session_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(SessionState::new())))
            .clone()
    }

    /// Locks the session or reports that an operation is already running.
    pub fn try_acquire(&self, session_id: i64) -> Result<SessionGuard, SessionBusy> {
        self.session(session_id)
            .try_lock_owned()
            .map_err(|_| SessionBusy)
    }

    pub fn remove(&self, session_id: i64) -> bool {
        self.sessions.lock().remove(&session_id).is_some()
    }
}
