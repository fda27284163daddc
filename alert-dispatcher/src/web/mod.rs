//! Web server module for handling inbound webhooks.
//!
//! This module provides a thin, fast web server that:
//! - Receives Sqreen security alert webhooks
//! - Verifies the body signature
//! - Immediately enqueues a dispatch task
//! - Returns 200 OK without waiting for delivery

pub mod handlers;
pub mod signature;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub use handlers::{
    health, security_alert, AppState, ErrorResponse, HealthResponse, WebhookResponse,
};
pub use signature::{compute_signature, verify_signature, SIGNATURE_HEADER};

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/security_alert", post(security_alert))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
