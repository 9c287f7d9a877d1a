//! `provost serve` -- HTTP JSON API for the lifecycle engine.
//!
//! Exposes the engine to the admin front-ends as an async HTTP service
//! using `axum` + `tokio`. Actors arrive as opaque strings in request
//! bodies; authentication and role checks belong to the session layer in
//! front of this service, which only records who asked.
//!
//! Endpoints:
//! - GET    /health                    - Server status
//! - GET    /workflows                 - Registered workflow definitions
//! - POST   /records                   - Create a record
//! - GET    /records?type=...          - List records of a type
//! - GET    /records/{id}              - Fetch one record
//! - PATCH  /records/{id}              - Merge fields into the payload
//! - DELETE /records/{id}              - Delete a record
//! - POST   /records/{id}/transition   - Move a record to a new status
//! - GET    /summary?type=...          - Status counts and amount sums
//!
//! All responses use Content-Type: application/json.

mod handlers;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};

use provost_engine::LifecycleEngine;
use provost_storage::RecordStorage;

/// Maximum request body size: 1 MB.
const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Application state shared across request handlers.
pub(crate) struct AppState<S: RecordStorage> {
    pub(crate) engine: LifecycleEngine<S>,
}

/// Construct a JSON error response with the given status code and message.
fn json_error(status: StatusCode, message: &str) -> impl IntoResponse {
    (status, Json(serde_json::json!({"error": message})))
}

/// Start the HTTP server on the given port.
///
/// CORS is permissive (`Any` origin) for local dev; tighten for
/// production deployments behind the session layer.
pub(crate) async fn start_server<S: RecordStorage>(
    port: u16,
    engine: LifecycleEngine<S>,
) -> Result<(), String> {
    let state = Arc::new(AppState { engine });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handlers::handle_health))
        .route("/workflows", get(handlers::handle_workflows::<S>))
        .route(
            "/records",
            post(handlers::handle_create::<S>).get(handlers::handle_list::<S>),
        )
        .route(
            "/records/{id}",
            get(handlers::handle_get::<S>)
                .patch(handlers::handle_update::<S>)
                .delete(handlers::handle_delete::<S>),
        )
        .route(
            "/records/{id}/transition",
            post(handlers::handle_transition::<S>),
        )
        .route("/summary", get(handlers::handle_summary::<S>))
        .fallback(handlers::handle_not_found)
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| format!("failed to bind {}: {}", addr, e))?;
    eprintln!("Provost API listening on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| e.to_string())?;

    eprintln!("\nServer shut down.");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
    eprintln!("\nReceived shutdown signal...");
}
