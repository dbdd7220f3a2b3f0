//! # salvo-session-store
//!
//! In-memory server-side sessions for the Salvo web framework.
//!
//! A session is a small key-value record addressed by an unguessable
//! identifier that the client carries in a signed, express-session compatible
//! cookie. Records expire after a configurable idle time and can be destroyed
//! explicitly (logout).
//!
//! ## Layers
//!
//! - [`SessionId`]: 192-bit random identifiers from the OS random source
//! - [`MemoryStore`]: sharded in-memory [`SessionStore`] with lazy and
//!   background expiration
//! - [`SessionGateway`]: per-request load and write-back; a session that is
//!   only read is never stored and no cookie is issued for it
//! - [`SessionHandler`]: Salvo middleware that wires the gateway to cookies
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use salvo::prelude::*;
//! use salvo_session_store::{SessionConfig, SessionDepotExt, SessionHandler};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = SessionConfig::new("your-secret-key").with_cookie_name("sessionId");
//!
//!     let router = Router::new()
//!         .hoop(SessionHandler::memory(config))
//!         .get(index);
//!
//!     let acceptor = TcpListener::new("127.0.0.1:5800").bind().await;
//!     Server::new(acceptor).serve(router).await;
//! }
//!
//! #[handler]
//! async fn index(depot: &mut Depot) -> String {
//!     let session = depot.session().unwrap();
//!     let views: i64 = session.get("views").unwrap_or(0);
//!     session.set("views", views + 1).ok();
//!     format!("views: {}", views + 1)
//! }
//! ```

pub mod config;
pub mod cookie_signature;
pub mod error;
pub mod gateway;
pub mod handler;
pub mod id;
pub mod record;
pub mod session;
pub mod store;

pub use config::{ExpirationMode, SessionConfig, StoreConfig};
pub use error::SessionError;
pub use gateway::{CookieDirective, SessionGateway};
pub use handler::SessionHandler;
pub use id::SessionId;
pub use record::SessionRecord;
pub use session::{Session, SessionState};
pub use store::{MemoryStore, SessionStore, SweeperHandle};

/// Extension trait for Depot to easily access session
pub mod depot_ext;
pub use depot_ext::SessionDepotExt;
