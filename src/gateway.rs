//! Per-request session gateway
//!
//! The gateway sits between a transport (cookies, headers) and the store. At
//! the start of a request it turns the identifier the client presented into a
//! [`Session`] handle; at the end it writes the handle back and tells the
//! transport which identifier, if any, the client should hold.

use std::sync::Arc;

use crate::error::SessionError;
use crate::id::SessionId;
use crate::record::SessionFields;
use crate::session::{Session, SessionState};
use crate::store::SessionStore;

/// Instruction for the transport layer after a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieDirective {
    /// Leave whatever the client holds untouched
    None,
    /// Hand this identifier to the client (new or refreshed)
    Set(SessionId),
    /// Remove the identifier from the client
    Clear,
}

/// Loads and writes back request sessions against one store
#[derive(Clone)]
pub struct SessionGateway {
    store: Arc<dyn SessionStore>,
    rolling: bool,
}

impl SessionGateway {
    pub fn new<S: SessionStore>(store: S) -> Self {
        Self::from_arc(Arc::new(store))
    }

    pub fn from_arc(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            rolling: false,
        }
    }

    /// Refresh the client's identifier on every request that has a session
    pub fn with_rolling(mut self, rolling: bool) -> Self {
        self.rolling = rolling;
        self
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Resolve the identifier presented by the client into a session handle.
    ///
    /// Missing, malformed, unknown and expired identifiers all give an
    /// uninitialized handle. Only store failures are returned as errors.
    pub async fn load(&self, candidate: Option<&str>) -> Result<Session, SessionError> {
        let Some(id) = candidate.and_then(SessionId::parse) else {
            if candidate.is_some() {
                tracing::debug!("ignoring malformed session ID");
            }
            return Ok(Session::uninitialized(self.store.clone()));
        };

        match self.store.get(&id).await? {
            Some(record) => Ok(Session::bound(self.store.clone(), record)),
            None => {
                tracing::debug!(session_id = %id, "no live session for presented ID");
                Ok(Session::uninitialized(self.store.clone()))
            }
        }
    }

    /// Write the handle back and decide what the client should hold.
    pub async fn commit(&self, session: &Session) -> Result<CookieDirective, SessionError> {
        let pending = session.pending();

        let id = match pending.state {
            SessionState::Destroyed => return Ok(CookieDirective::Clear),
            SessionState::New if !pending.is_dirty() => return Ok(CookieDirective::None),
            SessionState::New => self.persist_new(pending.fields).await?,
            SessionState::Bound(id) if pending.regenerate => {
                // The old record goes only once its fields are safe under the new ID.
                let new_id = self.persist_new(pending.fields).await?;
                if let Err(e) = self.store.destroy(&id).await {
                    self.discard(&new_id).await;
                    return Err(SessionError::persistence("regenerate", e));
                }
                tracing::debug!(old = %id, new = %new_id, "session regenerated");
                new_id
            }
            SessionState::Bound(id) if pending.is_dirty() => {
                let applied = self
                    .store
                    .update(&id, pending.changes)
                    .await
                    .map_err(|e| SessionError::persistence("update", e))?;
                if applied {
                    id
                } else {
                    // Expired or destroyed by a concurrent request while this one ran.
                    tracing::debug!(session_id = %id, "session vanished before write-back");
                    self.persist_new(pending.fields).await?
                }
            }
            SessionState::Bound(id) if self.rolling => return Ok(CookieDirective::Set(id)),
            SessionState::Bound(_) => return Ok(CookieDirective::None),
        };

        session.mark_persisted(id.clone());
        Ok(CookieDirective::Set(id))
    }

    async fn persist_new(&self, fields: SessionFields) -> Result<SessionId, SessionError> {
        let record = self
            .store
            .create()
            .await
            .map_err(|e| SessionError::persistence("create", e))?;
        let id = record.id().clone();
        let changes = fields.into_iter().map(|(k, v)| (k, Some(v))).collect();
        let written = match self.store.update(&id, changes).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(SessionError::Persistence(format!(
                "session {} expired before it could be written",
                id
            ))),
            Err(e) => Err(SessionError::persistence("write", e)),
        };
        if let Err(e) = written {
            self.discard(&id).await;
            return Err(e);
        }
        tracing::debug!(session_id = %id, "session created");
        Ok(id)
    }

    /// Best-effort removal of a record left behind by a failed write-back.
    async fn discard(&self, id: &SessionId) {
        if let Err(e) = self.store.destroy(id).await {
            tracing::warn!(session_id = %id, "Failed to discard unsaved session: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::record::SessionRecord;
    use crate::store::{FieldChanges, MemoryStore};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn gateway() -> SessionGateway {
        SessionGateway::new(MemoryStore::new())
    }

    /// Drive one request: load, run `f` on the handle, commit.
    async fn request<F>(gateway: &SessionGateway, cookie: Option<&SessionId>, f: F) -> CookieDirective
    where
        F: FnOnce(&Session),
    {
        let session = gateway.load(cookie.map(|id| id.as_str())).await.unwrap();
        f(&session);
        gateway.commit(&session).await.unwrap()
    }

    fn issued(directive: CookieDirective) -> SessionId {
        match directive {
            CookieDirective::Set(id) => id,
            other => panic!("expected an issued ID, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_read_only_request_creates_nothing() {
        let gateway = gateway();
        let directive = request(&gateway, None, |s| {
            assert_eq!(s.get::<i64>("views"), None);
        })
        .await;
        assert_eq!(directive, CookieDirective::None);
        assert_eq!(gateway.store().len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unknown_or_malformed_id_is_uninitialized() {
        let gateway = gateway();
        let session = gateway.load(Some("not-a-session")).await.unwrap();
        assert!(session.is_new());

        let stranger = SessionId::generate().unwrap();
        let session = gateway.load(Some(stranger.as_str())).await.unwrap();
        assert!(session.is_new());
        assert_eq!(gateway.commit(&session).await.unwrap(), CookieDirective::None);
    }

    #[tokio::test]
    async fn test_views_persist_across_requests() {
        let gateway = gateway();
        let bump = |s: &Session| {
            let views: i64 = s.get("views").unwrap_or(0);
            s.set("views", views + 1).unwrap();
        };

        let id = issued(request(&gateway, None, |s| {
            s.set("userId", "user_42").unwrap();
            bump(s);
        })
        .await);

        let directive = request(&gateway, Some(&id), |s| {
            assert_eq!(s.get::<i64>("views"), Some(1));
            assert_eq!(s.get::<String>("userId"), Some("user_42".to_string()));
        })
        .await;
        assert_eq!(directive, CookieDirective::None);

        assert_eq!(issued(request(&gateway, Some(&id), bump).await), id);
        request(&gateway, Some(&id), |s| {
            assert_eq!(s.get::<i64>("views"), Some(2));
        })
        .await;
        assert_eq!(gateway.store().len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_clients_are_isolated() {
        let gateway = gateway();
        let first = issued(request(&gateway, None, |s| s.set("userId", "user_1").unwrap()).await);
        let second = issued(request(&gateway, None, |s| s.set("userId", "user_2").unwrap()).await);
        assert_ne!(first, second);

        request(&gateway, Some(&first), |s| {
            assert_eq!(s.get::<String>("userId"), Some("user_1".to_string()));
        })
        .await;
        request(&gateway, None, |s| {
            assert_eq!(s.get::<String>("userId"), None);
        })
        .await;
    }

    #[tokio::test]
    async fn test_destroy_clears_and_is_terminal() {
        let gateway = gateway();
        let id = issued(request(&gateway, None, |s| s.set("userId", "user_42").unwrap()).await);

        let session = gateway.load(Some(id.as_str())).await.unwrap();
        assert!(session.destroy().await.unwrap());
        assert_eq!(session.get::<String>("userId"), None);
        assert_eq!(gateway.commit(&session).await.unwrap(), CookieDirective::Clear);

        let after = gateway.load(Some(id.as_str())).await.unwrap();
        assert!(after.is_new());
        assert_eq!(after.get::<String>("userId"), None);
    }

    #[tokio::test]
    async fn test_idle_session_is_forgotten() {
        let gateway = SessionGateway::new(MemoryStore::with_config(
            StoreConfig::default().with_idle_ttl(Duration::from_millis(20)),
        ));
        let id = issued(request(&gateway, None, |s| s.set("views", 1).unwrap()).await);
        tokio::time::sleep(Duration::from_millis(40)).await;

        let session = gateway.load(Some(id.as_str())).await.unwrap();
        assert!(session.is_new());
        assert_eq!(session.get::<i64>("views"), None);
    }

    #[tokio::test]
    async fn test_regenerate_moves_fields_to_new_id() {
        let gateway = gateway();
        let old = issued(request(&gateway, None, |s| s.set("userId", "user_42").unwrap()).await);

        let new = issued(request(&gateway, Some(&old), |s| s.regenerate()).await);
        assert_ne!(old, new);
        assert!(gateway.store().get(&old).await.unwrap().is_none());
        let record = gateway.store().get(&new).await.unwrap().unwrap();
        assert_eq!(record.get::<String>("userId"), Some("user_42".to_string()));
    }

    #[tokio::test]
    async fn test_regenerate_without_a_session_creates_nothing() {
        let gateway = gateway();
        assert_eq!(request(&gateway, None, |s| s.regenerate()).await, CookieDirective::None);
        assert_eq!(gateway.store().len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rolling_refreshes_clean_sessions() {
        let gateway = gateway().with_rolling(true);
        let id = issued(request(&gateway, None, |s| s.set("views", 1).unwrap()).await);
        assert_eq!(
            request(&gateway, Some(&id), |_| {}).await,
            CookieDirective::Set(id.clone())
        );
        assert_eq!(request(&gateway, None, |_| {}).await, CookieDirective::None);
    }

    #[tokio::test]
    async fn test_write_to_vanished_session_recreates_it() {
        let gateway = gateway();
        let id = issued(request(&gateway, None, |s| s.set("views", 1).unwrap()).await);

        let session = gateway.load(Some(id.as_str())).await.unwrap();
        // A concurrent logout removes the record mid-request.
        gateway.store().destroy(&id).await.unwrap();
        session.set("views", 2).unwrap();

        let fresh = issued(gateway.commit(&session).await.unwrap());
        assert_ne!(fresh, id);
        let record = gateway.store().get(&fresh).await.unwrap().unwrap();
        assert_eq!(record.get::<i64>("views"), Some(2));
    }

    #[tokio::test]
    async fn test_commit_twice_is_idempotent() {
        let gateway = gateway();
        let session = gateway.load(None).await.unwrap();
        session.set("views", 1).unwrap();
        let id = issued(gateway.commit(&session).await.unwrap());
        assert_eq!(session.id(), Some(id));
        assert_eq!(gateway.commit(&session).await.unwrap(), CookieDirective::None);
        assert_eq!(gateway.store().len().await.unwrap(), 1);
    }

    /// Store whose every write fails
    struct BrokenStore;

    #[async_trait]
    impl SessionStore for BrokenStore {
        async fn create(&self) -> Result<SessionRecord, SessionError> {
            Err(SessionError::Corruption("disk on fire".to_string()))
        }

        async fn get(&self, _id: &SessionId) -> Result<Option<SessionRecord>, SessionError> {
            Ok(None)
        }

        async fn update(&self, _id: &SessionId, _changes: FieldChanges) -> Result<bool, SessionError> {
            Err(SessionError::Corruption("disk on fire".to_string()))
        }

        async fn destroy(&self, _id: &SessionId) -> Result<bool, SessionError> {
            Err(SessionError::Corruption("disk on fire".to_string()))
        }

        async fn sweep(&self, _now: DateTime<Utc>) -> Result<usize, SessionError> {
            Ok(0)
        }

        async fn ids(&self) -> Result<Vec<SessionId>, SessionError> {
            Ok(Vec::new())
        }

        async fn clear(&self) -> Result<(), SessionError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_write_back_failure_is_reported_as_persistence() {
        let gateway = SessionGateway::new(BrokenStore);
        let session = gateway.load(None).await.unwrap();
        // Read-only requests never touch the broken write path.
        assert_eq!(gateway.commit(&session).await.unwrap(), CookieDirective::None);

        session.set("views", 1).unwrap();
        let err = gateway.commit(&session).await.unwrap_err();
        assert!(matches!(err, SessionError::Persistence(_)));
        assert!(session.is_new());
    }

    /// Memory store whose writes can be made to fail on demand
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail_updates: AtomicBool,
        undeletable: parking_lot::Mutex<Option<SessionId>>,
    }

    fn disk_on_fire() -> SessionError {
        SessionError::Corruption("disk on fire".to_string())
    }

    #[async_trait]
    impl SessionStore for FlakyStore {
        async fn create(&self) -> Result<SessionRecord, SessionError> {
            self.inner.create().await
        }

        async fn get(&self, id: &SessionId) -> Result<Option<SessionRecord>, SessionError> {
            self.inner.get(id).await
        }

        async fn update(&self, id: &SessionId, changes: FieldChanges) -> Result<bool, SessionError> {
            if self.fail_updates.load(Ordering::SeqCst) {
                return Err(disk_on_fire());
            }
            self.inner.update(id, changes).await
        }

        async fn destroy(&self, id: &SessionId) -> Result<bool, SessionError> {
            if self.undeletable.lock().as_ref() == Some(id) {
                return Err(disk_on_fire());
            }
            self.inner.destroy(id).await
        }

        async fn sweep(&self, now: DateTime<Utc>) -> Result<usize, SessionError> {
            self.inner.sweep(now).await
        }

        async fn ids(&self) -> Result<Vec<SessionId>, SessionError> {
            self.inner.ids().await
        }

        async fn clear(&self) -> Result<(), SessionError> {
            self.inner.clear().await
        }
    }

    #[tokio::test]
    async fn test_failed_first_write_leaves_no_record() {
        let store = Arc::new(FlakyStore::default());
        let gateway = SessionGateway::from_arc(store.clone());
        store.fail_updates.store(true, Ordering::SeqCst);

        let session = gateway.load(None).await.unwrap();
        session.set("userId", "user_42").unwrap();
        let err = gateway.commit(&session).await.unwrap_err();
        assert!(matches!(err, SessionError::Persistence(_)));
        assert!(session.is_new());
        assert_eq!(store.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_regenerate_keeps_old_session() {
        let store = Arc::new(FlakyStore::default());
        let gateway = SessionGateway::from_arc(store.clone());
        let old = issued(request(&gateway, None, |s| s.set("userId", "user_42").unwrap()).await);

        store.fail_updates.store(true, Ordering::SeqCst);
        let session = gateway.load(Some(old.as_str())).await.unwrap();
        session.regenerate();
        let err = gateway.commit(&session).await.unwrap_err();
        assert!(matches!(err, SessionError::Persistence(_)));
        assert_eq!(session.id(), Some(old.clone()));

        assert_eq!(store.ids().await.unwrap(), vec![old.clone()]);
        let record = store.get(&old).await.unwrap().unwrap();
        assert_eq!(record.get::<String>("userId"), Some("user_42".to_string()));
    }

    #[tokio::test]
    async fn test_regenerate_drops_new_record_when_old_cannot_be_destroyed() {
        let store = Arc::new(FlakyStore::default());
        let gateway = SessionGateway::from_arc(store.clone());
        let old = issued(request(&gateway, None, |s| s.set("userId", "user_42").unwrap()).await);

        *store.undeletable.lock() = Some(old.clone());
        let session = gateway.load(Some(old.as_str())).await.unwrap();
        session.regenerate();
        let err = gateway.commit(&session).await.unwrap_err();
        assert!(matches!(err, SessionError::Persistence(_)));
        assert_eq!(session.id(), Some(old.clone()));

        assert_eq!(store.ids().await.unwrap(), vec![old.clone()]);
        let record = store.get(&old).await.unwrap().unwrap();
        assert_eq!(record.get::<String>("userId"), Some("user_42".to_string()));
    }
}
