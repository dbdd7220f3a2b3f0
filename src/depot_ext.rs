//! Depot access to the request's session

use salvo_core::Depot;

use crate::session::Session;

const SESSION_KEY: &str = "salvo.session.handle";

/// Reach the session that [`crate::SessionHandler`] attached to the request
pub trait SessionDepotExt {
    fn session(&self) -> Option<&Session>;

    /// Owned handle to the same session
    ///
    /// The handle shares state with the middleware's copy, so writes made
    /// through it are committed when the request finishes. Useful when the
    /// session must outlive the depot borrow, e.g. across an `.await`.
    fn session_handle(&self) -> Option<Session>;
}

impl SessionDepotExt for Depot {
    fn session(&self) -> Option<&Session> {
        self.get::<Session>(SESSION_KEY).ok()
    }

    fn session_handle(&self) -> Option<Session> {
        self.session().cloned()
    }
}

pub(crate) fn attach_session(depot: &mut Depot, session: Session) {
    depot.insert(SESSION_KEY, session);
}
