//! Session store trait

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::SessionError;
use crate::id::SessionId;
use crate::record::SessionRecord;

/// Field changes applied in one step: `Some` writes the value, `None` removes the key.
pub type FieldChanges = Vec<(String, Option<Value>)>;

/// Trait for session storage backends
///
/// Absence is never an error: a missing or expired session is reported as
/// `None` or `false`. Every operation on one identifier is atomic with respect
/// to every other operation on that identifier.
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// Create an empty session under a fresh identifier
    ///
    /// Identifiers that collide with a live session are regenerated.
    async fn create(&self) -> Result<SessionRecord, SessionError>;

    /// Get a live session and touch it
    async fn get(&self, id: &SessionId) -> Result<Option<SessionRecord>, SessionError>;

    /// Set one field of a live session and touch it
    ///
    /// Returns `false` without doing anything when the session is absent or expired.
    async fn set(&self, id: &SessionId, key: &str, value: Value) -> Result<bool, SessionError> {
        self.update(id, vec![(key.to_string(), Some(value))]).await
    }

    /// Apply several field changes to a live session at once and touch it
    async fn update(&self, id: &SessionId, changes: FieldChanges) -> Result<bool, SessionError>;

    /// Destroy a session; returns whether one existed
    async fn destroy(&self, id: &SessionId) -> Result<bool, SessionError>;

    /// Remove every session whose deadline lies before `now`
    async fn sweep(&self, now: DateTime<Utc>) -> Result<usize, SessionError>;

    /// List live session IDs
    async fn ids(&self) -> Result<Vec<SessionId>, SessionError>;

    /// Count live sessions
    async fn len(&self) -> Result<usize, SessionError> {
        Ok(self.ids().await?.len())
    }

    /// Destroy all sessions
    async fn clear(&self) -> Result<(), SessionError>;
}
