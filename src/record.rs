//! Stored session record

use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

use crate::config::ExpirationMode;
use crate::id::SessionId;

/// Field data of a session
pub type SessionFields = HashMap<String, Value>;

/// One session as held by the store
#[derive(Debug, Clone)]
pub struct SessionRecord {
    id: SessionId,
    created_at: DateTime<Utc>,
    last_accessed_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    data: SessionFields,
}

/// Deadline arithmetic shared by every record of one store
#[derive(Debug, Clone, Copy)]
pub(crate) struct Expiry {
    ttl: TimeDelta,
    mode: ExpirationMode,
}

impl Expiry {
    pub(crate) fn new(ttl: Duration, mode: ExpirationMode) -> Self {
        Self {
            ttl: TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX),
            mode,
        }
    }

    fn deadline(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        from.checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

impl SessionRecord {
    pub(crate) fn new(id: SessionId, now: DateTime<Utc>, expiry: &Expiry) -> Self {
        Self {
            id,
            created_at: now,
            last_accessed_at: now,
            expires_at: expiry.deadline(now),
            data: HashMap::new(),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_accessed_at(&self) -> DateTime<Utc> {
        self.last_accessed_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn data(&self) -> &SessionFields {
        &self.data
    }

    /// Typed read of one field; `None` when absent or of another shape.
    pub fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn into_data(self) -> SessionFields {
        self.data
    }

    /// A record past its deadline is dead even while it is still in the map.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Advance the access time and recompute the deadline.
    pub(crate) fn touch(&mut self, now: DateTime<Utc>, expiry: &Expiry) {
        // Clock steps backwards must not move the access time back.
        if now > self.last_accessed_at {
            self.last_accessed_at = now;
        }
        if expiry.mode == ExpirationMode::Sliding {
            self.expires_at = expiry.deadline(self.last_accessed_at);
        }
    }

    /// Apply field changes; `None` removes the key.
    pub(crate) fn apply<I>(&mut self, changes: I)
    where
        I: IntoIterator<Item = (String, Option<Value>)>,
    {
        for (key, change) in changes {
            match change {
                Some(value) => {
                    self.data.insert(key, value);
                }
                None => {
                    self.data.remove(&key);
                }
            }
        }
    }
}
