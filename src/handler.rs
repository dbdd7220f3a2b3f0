//! Salvo middleware driving the session gateway

use salvo_core::http::cookie::{self, Cookie};
use salvo_core::http::header::CONTENT_TYPE;
use salvo_core::prelude::*;
use std::sync::Arc;

use crate::config::{SameSite, SessionConfig};
use crate::cookie_signature::CookieSigner;
use crate::depot_ext::attach_session;
use crate::gateway::{CookieDirective, SessionGateway};
use crate::id::SessionId;
use crate::store::{MemoryStore, SessionStore, SweeperHandle};

/// Session middleware
///
/// Reads the signed session cookie, attaches a [`crate::Session`] to the
/// depot for the rest of the chain, and after the chain has run writes the
/// session back and sets or clears the cookie as needed.
#[derive(Clone)]
pub struct SessionHandler {
    gateway: SessionGateway,
    signer: CookieSigner,
    config: Arc<SessionConfig>,
    sweeper: Option<Arc<SweeperHandle>>,
}

impl SessionHandler {
    /// Create a session handler over any store
    pub fn new<S: SessionStore>(store: S, config: SessionConfig) -> Self {
        Self {
            gateway: SessionGateway::new(store).with_rolling(config.rolling),
            signer: CookieSigner::new(config.secrets.clone()),
            config: Arc::new(config),
            sweeper: None,
        }
    }

    /// Create a session handler with its own in-memory store
    ///
    /// When `sweep_interval` is configured and a tokio runtime is running, a
    /// background sweep lives as long as the handler.
    pub fn memory(config: SessionConfig) -> Self {
        let store = MemoryStore::with_config(config.store.clone());
        let sweeper = config
            .sweep_interval
            .and_then(|interval| store.spawn_sweeper(interval))
            .map(Arc::new);
        Self {
            sweeper,
            ..Self::new(store, config)
        }
    }

    pub fn gateway(&self) -> &SessionGateway {
        &self.gateway
    }

    /// Whether a background sweep is attached to this handler
    pub fn is_sweeping(&self) -> bool {
        self.sweeper.as_ref().is_some_and(|s| !s.is_finished())
    }

    /// Get session ID from cookie
    fn session_id_from_cookie(&self, req: &Request) -> Option<String> {
        let cookie = req.cookie(&self.config.cookie_name)?;
        self.signer.unsign_cookie(cookie.value())
    }

    /// Set session cookie on response
    fn set_session_cookie(&self, res: &mut Response, id: &SessionId) {
        let Some(signed) = self.signer.sign(id.as_str()) else {
            tracing::error!("No secret configured, cannot issue session cookie");
            return;
        };

        let mut builder = Cookie::build((self.config.cookie_name.clone(), signed))
            .path(self.config.cookie_path.clone())
            .http_only(self.config.cookie_http_only)
            .secure(self.config.cookie_secure)
            .max_age(cookie::time::Duration::seconds(self.config.max_age_secs()))
            .same_site(match self.config.cookie_same_site {
                SameSite::Strict => cookie::SameSite::Strict,
                SameSite::Lax => cookie::SameSite::Lax,
                SameSite::None => cookie::SameSite::None,
            });

        if let Some(domain) = self.config.cookie_domain.clone() {
            builder = builder.domain(domain);
        }

        res.add_cookie(builder.build());
    }

    /// Remove session cookie
    fn remove_session_cookie(&self, res: &mut Response) {
        let cookie = Cookie::build(self.config.cookie_name.clone())
            .path(self.config.cookie_path.clone())
            .max_age(cookie::time::Duration::ZERO)
            .build();

        res.add_cookie(cookie);
    }
}

#[async_trait]
impl Handler for SessionHandler {
    async fn handle(&self, req: &mut Request, depot: &mut Depot, res: &mut Response, ctrl: &mut FlowCtrl) {
        let candidate = self.session_id_from_cookie(req);
        let session = match self.gateway.load(candidate.as_deref()).await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!("Failed to load session: {}", e);
                res.status_code(StatusCode::INTERNAL_SERVER_ERROR);
                ctrl.skip_rest();
                return;
            }
        };

        attach_session(depot, session.clone());

        ctrl.call_next(req, depot, res).await;

        match self.gateway.commit(&session).await {
            Ok(CookieDirective::Set(id)) => self.set_session_cookie(res, &id),
            Ok(CookieDirective::Clear) => self.remove_session_cookie(res),
            Ok(CookieDirective::None) => {}
            Err(e) => {
                tracing::error!("Failed to save session: {}", e);
                // The route's body describes work that did not stick.
                res.take_body();
                res.headers_mut().remove(CONTENT_TYPE);
                res.status_code(StatusCode::INTERNAL_SERVER_ERROR);
                res.render(Text::Plain("Failed to save session."));
            }
        }
    }
}
