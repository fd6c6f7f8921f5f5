// src/server.rs
use anyhow::Context;
use axum::{extract::DefaultBodyLimit, Router};
use time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tower_sessions::cookie::SameSite;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};

use crate::api;
use crate::state::AppState;

const MAX_BODY_BYTES: usize = 1024 * 1024;

/// The HTTP API under `/api`.
pub fn api_router() -> Router<AppState> {
    Router::new().nest("/api", api::routes::routes())
}

/// Wraps `router` in the session, tracing and body limit layers.
pub fn build_app(router: Router<AppState>, state: AppState) -> Router {
    let auth = &state.config.auth;
    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_name(auth.session_cookie_name.clone())
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(Duration::minutes(auth.session_inactivity_minutes)))
        .with_secure(auth.secure_cookies);

    router
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(session_layer)
        .with_state(state)
}

pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let server = &state.config.server;
    let addr = format!("{}:{}", server.bind_address, server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    log::info!("Listening on http://{}", listener.local_addr()?);

    let app = build_app(api_router(), state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for shutdown signal: {}", e);
            }
            log::info!("Shutting down");
        })
        .await
        .context("server error")?;
    Ok(())
}
