//! Webhook endpoint handlers.
//!
//! The ingestion handler is designed to be fast - it only:
//! 1. Verifies the body signature
//! 2. Parses the events and enqueues one dispatch task
//! 3. Returns immediately
//!
//! Delivery to the backends happens later, in the worker pool.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::backend::BackendRegistry;
use crate::event::parse_events;
use crate::queue::{DispatchQueue, DispatchTask, QueueError};
use crate::web::signature::{verify_signature, SIGNATURE_HEADER};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub secret: Arc<[u8]>,
    pub registry: Arc<BackendRegistry>,
    pub queue: DispatchQueue,
}

impl AppState {
    pub fn new(
        secret: impl AsRef<[u8]>,
        registry: Arc<BackendRegistry>,
        queue: DispatchQueue,
    ) -> Self {
        Self {
            secret: Arc::from(secret.as_ref()),
            registry,
            queue,
        }
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub queued: usize,
}

/// Health check endpoint.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        queued: state.queue.len(),
    })
}

// =============================================================================
// Security Alert Webhook
// =============================================================================

/// Successful ingestion response.
#[derive(Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
    pub events: usize,
}

/// Rejection response.
#[derive(Serialize)]
pub struct ErrorResponse {
    pub message: &'static str,
}

fn reject(status: StatusCode, message: &'static str) -> Response {
    (status, Json(ErrorResponse { message })).into_response()
}

/// Sqreen security alert endpoint.
///
/// This endpoint:
/// 1. Verifies the `X-Sqreen-Integrity` HMAC over the raw body
/// 2. Enqueues a dispatch task for the parsed events
/// 3. Returns 200 OK before any backend runs
pub async fn security_alert(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    info!(
        body_length = body.len(),
        has_signature = !signature.is_empty(),
        "security_alert_received"
    );

    if !verify_signature(&state.secret, signature, &body) {
        warn!(body_length = body.len(), "security_alert_signature_invalid");
        return reject(StatusCode::BAD_REQUEST, "wrong signature");
    }

    let events = match parse_events(&body) {
        Ok(events) => events,
        Err(e) => {
            warn!(
                error = %e,
                body_preview = %String::from_utf8_lossy(&body[..body.len().min(200)]),
                "security_alert_payload_invalid"
            );
            return reject(StatusCode::BAD_REQUEST, "invalid payload");
        }
    };

    let event_count = events.len();
    let task = DispatchTask::new(Arc::clone(&state.registry), events);

    match state.queue.push(task) {
        Ok(()) => {}
        Err(QueueError::Full(capacity)) => {
            error!(capacity, "security_alert_queue_full");
            return reject(StatusCode::SERVICE_UNAVAILABLE, "dispatch queue full");
        }
        Err(QueueError::Closed) => {
            error!("security_alert_queue_closed");
            return reject(StatusCode::SERVICE_UNAVAILABLE, "dispatch queue closed");
        }
    }

    info!(
        events = event_count,
        queued = state.queue.len(),
        "security_alert_enqueued"
    );

    (
        StatusCode::OK,
        Json(WebhookResponse {
            status: "enqueued",
            events: event_count,
        }),
    )
        .into_response()
}
