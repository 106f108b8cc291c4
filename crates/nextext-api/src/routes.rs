use axum::{
    Json, Router, middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;

use crate::auth;
use crate::conversations;
use crate::messages;
use crate::middleware::require_auth;
use crate::state::AppState;

/// Full HTTP surface. Transport layers (CORS, tracing) are added by the binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health_check))
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    let protected_routes = Router::new()
        .route("/user", get(auth::current_user))
        .route("/conversations", get(conversations::list_conversations))
        .route("/start-chat", post(conversations::start_chat))
        .route(
            "/messages/{conversation_id}",
            get(messages::get_messages).post(messages::send_message),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}
