//! Per-request session handle

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::SessionError;
use crate::id::SessionId;
use crate::record::{SessionFields, SessionRecord};
use crate::store::{FieldChanges, SessionStore};

/// Where a request's session stands relative to the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No backing record yet; nothing is stored unless a field is written
    New,
    /// Backed by a live record in the store
    Bound(SessionId),
    /// Destroyed during this request; terminal
    Destroyed,
}

#[derive(Debug)]
struct HandleState {
    state: SessionState,
    /// Record snapshot with this request's writes applied
    fields: SessionFields,
    /// Writes not yet in the store, last write per key
    changes: HashMap<String, Option<Value>>,
    regenerate: bool,
}

/// What the gateway needs to write a handle back
#[derive(Debug)]
pub(crate) struct Pending {
    pub state: SessionState,
    pub fields: SessionFields,
    pub changes: FieldChanges,
    pub regenerate: bool,
}

impl Pending {
    /// Regeneration only counts for a handle that already has a record.
    pub fn is_dirty(&self) -> bool {
        let regenerate = self.regenerate && matches!(self.state, SessionState::Bound(_));
        !self.changes.is_empty() || regenerate
    }
}

/// Session handle attached to one request
///
/// Clones share state, so a handler can take a clone out of the depot, write
/// to it, and the middleware sees the writes when the request finishes.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Mutex<HandleState>>,
    store: Arc<dyn SessionStore>,
}

impl Session {
    pub(crate) fn uninitialized(store: Arc<dyn SessionStore>) -> Self {
        Self::with_state(store, SessionState::New, HashMap::new())
    }

    pub(crate) fn bound(store: Arc<dyn SessionStore>, record: SessionRecord) -> Self {
        let id = record.id().clone();
        Self::with_state(store, SessionState::Bound(id), record.into_data())
    }

    fn with_state(store: Arc<dyn SessionStore>, state: SessionState, fields: SessionFields) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HandleState {
                state,
                fields,
                changes: HashMap::new(),
                regenerate: false,
            })),
            store,
        }
    }

    /// ID of the backing record, if there is one
    pub fn id(&self) -> Option<SessionId> {
        match &self.inner.lock().state {
            SessionState::Bound(id) => Some(id.clone()),
            _ => None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state.clone()
    }

    /// Check if this session has no backing record yet
    pub fn is_new(&self) -> bool {
        self.inner.lock().state == SessionState::New
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.lock().state == SessionState::Destroyed
    }

    /// Check if there are writes that still have to reach the store
    pub fn is_modified(&self) -> bool {
        let inner = self.inner.lock();
        !inner.changes.is_empty() || inner.regenerate
    }

    /// Check if `regenerate` was requested for this request
    pub fn should_regenerate(&self) -> bool {
        self.inner.lock().regenerate
    }

    /// Get a value from the session
    pub fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        let value = self.inner.lock().fields.get(key).cloned()?;
        serde_json::from_value(value).ok()
    }

    /// Set a value in the session
    ///
    /// Writes after `destroy` are dropped.
    pub fn set<T: Serialize>(&self, key: &str, value: T) -> Result<(), SessionError> {
        let value = serde_json::to_value(value)?;
        let mut inner = self.inner.lock();
        if inner.state == SessionState::Destroyed {
            tracing::debug!(key, "ignoring write to destroyed session");
            return Ok(());
        }
        inner.fields.insert(key.to_string(), value.clone());
        inner.changes.insert(key.to_string(), Some(value));
        Ok(())
    }

    /// Remove a value from the session
    pub fn remove(&self, key: &str) -> Option<Value> {
        let mut inner = self.inner.lock();
        let removed = inner.fields.remove(key)?;
        inner.changes.insert(key.to_string(), None);
        Some(removed)
    }

    /// Check if a key exists in the session
    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().fields.contains_key(key)
    }

    /// Move the session to a new ID when the request finishes
    ///
    /// Only a session that already has a stored record has an ID to move away
    /// from; on a new session this does nothing.
    pub fn regenerate(&self) {
        let mut inner = self.inner.lock();
        if matches!(inner.state, SessionState::Bound(_)) {
            inner.regenerate = true;
        }
    }

    /// Destroy the session now
    ///
    /// The backing record is removed from the store immediately and the
    /// handle stays destroyed for the rest of the request. Returns whether a
    /// stored record existed.
    pub async fn destroy(&self) -> Result<bool, SessionError> {
        let previous = {
            let mut inner = self.inner.lock();
            inner.fields.clear();
            inner.changes.clear();
            inner.regenerate = false;
            std::mem::replace(&mut inner.state, SessionState::Destroyed)
        };
        match previous {
            SessionState::Bound(id) => {
                let existed = self
                    .store
                    .destroy(&id)
                    .await
                    .map_err(|e| SessionError::persistence("destroy", e))?;
                tracing::debug!(session_id = %id, "session destroyed");
                Ok(existed)
            }
            _ => Ok(false),
        }
    }

    pub(crate) fn pending(&self) -> Pending {
        let inner = self.inner.lock();
        Pending {
            state: inner.state.clone(),
            fields: inner.fields.clone(),
            changes: inner
                .changes
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            regenerate: inner.regenerate,
        }
    }

    /// Record that the handle's state now lives in the store under `id`.
    pub(crate) fn mark_persisted(&self, id: SessionId) {
        let mut inner = self.inner.lock();
        if inner.state != SessionState::Destroyed {
            inner.state = SessionState::Bound(id);
            inner.changes.clear();
            inner.regenerate = false;
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Session")
            .field("state", &inner.state)
            .field("fields", &inner.fields)
            .field("pending", &inner.changes.len())
            .finish()
    }
}
