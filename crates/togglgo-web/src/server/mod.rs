//! Web server: Axum router + shared state.

pub mod api;
pub mod dialogflow;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;

use togglgo_core::flow::Conversation;
use togglgo_core::identity::IdentityVerifier;

/// Shared application state, read-only for the lifetime of the server.
pub struct AppState {
    pub conversation: Conversation,
    pub verifier: IdentityVerifier,
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::very_permissive();

    Router::new()
        .merge(api::routes())
        .layer(cors)
        .with_state(state)
}
