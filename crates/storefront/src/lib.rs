//! Atacado Storefront library.
//!
//! This crate provides the storefront runtime as a library, allowing it to be
//! tested and driven from the CLI: the cart and analytics context, the
//! abandonment detector, the backend and webhook clients, and the HTTP API.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod routes;
pub mod services;
pub mod state;
pub mod storage;

use axum::{Router, http::Method, routing::get};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use context::Storefront;
pub use state::AppState;

/// Build the HTTP application (routes, tracing and CORS) over `state`.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .merge(routes::routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check the backend.
async fn health() -> &'static str {
    "ok"
}
