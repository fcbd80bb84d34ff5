//! REST endpoints: fulfillment webhook and health check.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::{info, warn};

use togglgo_core::flow::FlowError;
use togglgo_core::types::{Intent, Turn};

use super::dialogflow::{webhook_response, WebhookRequest};
use super::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/fulfillment", post(fulfillment))
        .route("/health", get(health))
}

/// Errors that end a request without a conversational reply.
pub enum ApiError {
    BadRequest(String),
    Flow(FlowError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Flow(e @ FlowError::UnsupportedLocale(_)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
            }
            ApiError::Flow(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<FlowError> for ApiError {
    fn from(e: FlowError) -> Self {
        ApiError::Flow(e)
    }
}

// --- Health ---

async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

// --- Fulfillment ---

async fn fulfillment(
    State(state): State<Arc<AppState>>,
    body: Result<Json<WebhookRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(req) = body.map_err(|e| {
        warn!("Rejected webhook request: {}", e);
        ApiError::BadRequest(e.body_text())
    })?;

    let intent_name = req.intent_name();
    let locale = req.locale();
    let session = req.session_data();

    let outcome = match Intent::from_display_name(intent_name) {
        Some(intent) => {
            let turn = Turn {
                intent,
                locale,
                user_id: state.verifier.subject(req.id_token()),
                session,
                surface: req.surface_info(),
                sign_in: req.helper_status("SIGN_IN"),
                new_surface: req.helper_status("NEW_SURFACE"),
                api_key: req.api_key(),
            };
            state.conversation.handle(turn).await?
        }
        None => state
            .conversation
            .unknown_intent(intent_name, &locale, session)?,
    };

    info!(
        "Fulfilled {:?} for session {}",
        intent_name,
        req.session.rsplit('/').next().unwrap_or("")
    );
    Ok(Json(webhook_response(
        &req.session,
        &outcome.reply,
        &outcome.session,
    )))
}
