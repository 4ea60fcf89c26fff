use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

pub mod config;
pub mod errors;
pub mod http;
pub mod logging;
pub mod mcp;
pub mod transport;

use crate::http::SseTransport;

#[derive(Clone)]
pub struct AppState {
    pub transport: Arc<SseTransport>,
    pub sse_path: Arc<str>,
    pub messages_path: Arc<str>,
}

impl AppState {
    pub fn new(transport: Arc<SseTransport>, sse_path: &str, messages_path: &str) -> Self {
        Self {
            transport,
            sse_path: Arc::from(sse_path),
            messages_path: Arc::from(messages_path),
        }
    }
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(http::handlers::health))
        .route(&state.sse_path, get(http::handlers::sse_endpoint))
        .route(&state.messages_path, post(http::handlers::message_endpoint))
        .layer(middleware::from_fn(logging::request_logging_middleware))
        .with_state(state)
}
