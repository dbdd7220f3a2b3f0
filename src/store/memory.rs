//! In-memory session store
//!
//! Records live in a fixed number of shards, each behind its own mutex, so
//! sessions that hash to different shards never wait on each other. Every
//! operation holds exactly one shard lock for one map operation and never
//! awaits while holding it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::hash::BuildHasher;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::{FieldChanges, SessionStore};
use crate::config::StoreConfig;
use crate::error::SessionError;
use crate::id::SessionId;
use crate::record::{Expiry, SessionRecord};

/// Attempts at finding an unused identifier before giving up.
const MAX_CREATE_ATTEMPTS: usize = 8;

type Shard = Mutex<HashMap<SessionId, SessionRecord>>;
type IdSource = fn() -> Result<SessionId, SessionError>;

struct Inner {
    shards: Box<[Shard]>,
    hasher: RandomState,
    expiry: Expiry,
    generate: IdSource,
}

impl Inner {
    fn shard(&self, id: &SessionId) -> &Shard {
        let idx = (self.hasher.hash_one(id) % self.shards.len() as u64) as usize;
        &self.shards[idx]
    }

    /// Run `f` on the live record for `id`, dropping it first if it has expired.
    fn with_live<R>(
        &self,
        id: &SessionId,
        now: DateTime<Utc>,
        f: impl FnOnce(&mut SessionRecord) -> R,
    ) -> Result<Option<R>, SessionError> {
        let mut shard = self.shard(id).lock();
        let Some(record) = shard.get_mut(id) else {
            return Ok(None);
        };
        if record.id() != id {
            return Err(SessionError::Corruption(format!(
                "record {} stored under key {}",
                record.id(),
                id
            )));
        }
        if record.is_expired_at(now) {
            shard.remove(id);
            tracing::debug!(session_id = %id, "session expired on access");
            return Ok(None);
        }
        record.touch(now, &self.expiry);
        Ok(Some(f(record)))
    }

    fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        for shard in self.shards.iter() {
            let mut shard = shard.lock();
            let before = shard.len();
            shard.retain(|_, record| record.expires_at() >= now);
            removed += before - shard.len();
        }
        removed
    }
}

/// In-memory session store
///
/// Cloning is cheap and every clone shares the same sessions. Sessions are
/// lost on restart and are not shared across processes.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

/// Running background sweep; the task stops when this handle is dropped.
#[derive(Debug)]
pub struct SweeperHandle {
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop sweeping
    pub fn stop(self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl MemoryStore {
    /// Create a memory store with the default 24 hour sliding TTL
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Self::with_id_source(config, SessionId::generate)
    }

    pub(crate) fn with_id_source(config: StoreConfig, generate: IdSource) -> Self {
        let shards = (0..config.shards.max(1))
            .map(|_| Mutex::new(HashMap::new()))
            .collect();
        Self {
            inner: Arc::new(Inner {
                shards,
                hasher: RandomState::new(),
                expiry: Expiry::new(config.idle_ttl, config.expiration),
                generate,
            }),
        }
    }

    /// Sweep expired sessions every `interval` on the current tokio runtime.
    ///
    /// Returns `None` when called outside a runtime. The task only holds a weak
    /// reference, so it ends by itself once every clone of the store is gone.
    pub fn spawn_sweeper(&self, interval: Duration) -> Option<SweeperHandle> {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::warn!("Cannot start session sweeper outside a runtime: {}", e);
                return None;
            }
        };
        let period = interval.max(Duration::from_millis(1));
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);

        let task = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let removed = inner.sweep(Utc::now());
                if removed > 0 {
                    tracing::debug!(removed, "swept expired sessions");
                }
            }
        });
        Some(SweeperHandle { task })
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create(&self) -> Result<SessionRecord, SessionError> {
        for _ in 0..MAX_CREATE_ATTEMPTS {
            let id = (self.inner.generate)()?;
            let now = Utc::now();
            let mut shard = self.inner.shard(&id).lock();
            if let Some(existing) = shard.get(&id) {
                if !existing.is_expired_at(now) {
                    tracing::warn!("Session ID collision, regenerating");
                    continue;
                }
            }
            let record = SessionRecord::new(id.clone(), now, &self.inner.expiry);
            shard.insert(id, record.clone());
            return Ok(record);
        }
        Err(SessionError::Entropy(format!(
            "no unused session ID after {} attempts",
            MAX_CREATE_ATTEMPTS
        )))
    }

    async fn get(&self, id: &SessionId) -> Result<Option<SessionRecord>, SessionError> {
        self.inner.with_live(id, Utc::now(), |record| record.clone())
    }

    async fn update(&self, id: &SessionId, changes: FieldChanges) -> Result<bool, SessionError> {
        let applied = self
            .inner
            .with_live(id, Utc::now(), |record| record.apply(changes))?;
        Ok(applied.is_some())
    }

    async fn destroy(&self, id: &SessionId) -> Result<bool, SessionError> {
        Ok(self.inner.shard(id).lock().remove(id).is_some())
    }

    async fn sweep(&self, now: DateTime<Utc>) -> Result<usize, SessionError> {
        Ok(self.inner.sweep(now))
    }

    async fn ids(&self) -> Result<Vec<SessionId>, SessionError> {
        let now = Utc::now();
        let mut ids = Vec::new();
        for shard in self.inner.shards.iter() {
            let shard = shard.lock();
            ids.extend(
                shard
                    .values()
                    .filter(|record| !record.is_expired_at(now))
                    .map(|record| record.id().clone()),
            );
        }
        Ok(ids)
    }

    async fn clear(&self) -> Result<(), SessionError> {
        for shard in self.inner.shards.iter() {
            shard.lock().clear();
        }
        Ok(())
    }
}
