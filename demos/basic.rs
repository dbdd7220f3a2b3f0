//! Session demo with the in-memory store
//!
//! Routes:
//!   GET /set-session  - store a user ID and bump the view counter
//!   GET /get-session  - show what the session holds
//!   GET /logout       - destroy the session

use rand::Rng;
use salvo::prelude::*;
use salvo_session_store::{SessionConfig, SessionDepotExt, SessionHandler};
use std::time::Duration;

#[handler]
async fn set_session(depot: &mut Depot, res: &mut Response) {
    let session = depot.session_handle().expect("Session not found");

    let user_id = format!("user_{}", rand::thread_rng().gen_range(0..1000));
    let views: i64 = session.get("views").unwrap_or(0) + 1;

    let saved = session
        .set("userId", &user_id)
        .and_then(|_| session.set("views", views));
    match saved {
        Ok(()) => res.render(format!("Session set! UserId: {}, Views: {}", user_id, views)),
        Err(e) => {
            tracing::error!("Could not update session: {}", e);
            res.status_code(StatusCode::INTERNAL_SERVER_ERROR);
        }
    }
}

#[handler]
async fn get_session(depot: &mut Depot, res: &mut Response) {
    let session = depot.session().expect("Session not found");

    res.render(Json(serde_json::json!({
        "userId": session.get::<String>("userId"),
        "views": session.get::<i64>("views"),
    })));
}

#[handler]
async fn logout(depot: &mut Depot, res: &mut Response) {
    let session = depot.session_handle().expect("Session not found");

    match session.destroy().await {
        Ok(_) => res.render("Logged out successfully."),
        Err(e) => {
            tracing::error!("Logout failed: {}", e);
            res.status_code(StatusCode::INTERNAL_SERVER_ERROR);
            res.render("Could not log out.");
        }
    }
}

#[tokio::main]
async fn main() {
    // Set up logging
    tracing_subscriber::fmt::init();

    let config = SessionConfig::new("your-secret-key")
        .with_cookie_name("sessionId")
        .with_idle_ttl(Duration::from_secs(60 * 60 * 24))
        .with_sweep_interval(Duration::from_secs(60));

    let router = Router::new()
        .hoop(SessionHandler::memory(config))
        .push(Router::with_path("set-session").get(set_session))
        .push(Router::with_path("get-session").get(get_session))
        .push(Router::with_path("logout").get(logout));

    let acceptor = TcpListener::new("127.0.0.1:3000").bind().await;
    println!("Server is running on port 3000");
    println!("  GET /set-session");
    println!("  GET /get-session");
    println!("  GET /logout");

    Server::new(acceptor).serve(router).await;
}
