//! Real-time session hub built with Rust.
//!
//! Authenticated WebSocket sessions with presence, one-to-one chat relay,
//! watch rooms with synchronized playback, and WebRTC voice signaling.

pub mod auth;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod services;

pub use config::Config;
pub use error::AppError;
pub use handlers::http::AppState;
pub use services::Hub;

use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use handlers::http;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

/// Build the API router (ws, health, auth, chat history, rooms, presence). Used by main and by integration tests.
pub fn create_app(state: AppState, allowed_origins: &[String]) -> axum::Router {
    let auth_routes = axum::Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    let api_routes = axum::Router::new()
        .route("/chat/:friend_id", get(http::chat_history))
        .route("/rooms/:room_id", get(http::room_snapshot))
        .route("/presence/:user_id", get(http::presence));

    axum::Router::new()
        .route("/ws", get(handlers::ws_handler))
        .route("/health", get(http::health))
        .nest("/auth", auth_routes)
        .nest("/api", api_routes)
        .layer(cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
