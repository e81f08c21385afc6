//! Console: Axum server feeding chat messages to the house.
//!
//! Stands in for the chat transport: `POST /api/messages` runs a message
//! through the command dispatcher and returns the reply lines. The GET
//! routes expose read-only reports as JSON.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use routes::AppState;

/// Bind the console port and serve it on a background task.
pub async fn spawn_console(state: AppState, port: u16) -> Result<()> {
    let app = build_router(state);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind console port {port}"))?;
    info!(port, "Console listening on http://{addr}");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "Console server stopped");
        }
    });

    Ok(())
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("*"))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/messages", post(routes::post_message))
        .route("/api/round", get(routes::get_round))
        .route("/api/results", get(routes::get_results))
        .route("/api/participants", get(routes::get_participants))
        .route("/api/bets", get(routes::get_bets))
        .route("/health", get(routes::health))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
