use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::debug;
use uuid::Uuid;

use nextext_types::api::{Claims, SendMessageRequest};
use nextext_types::models::Message;

use crate::convert;
use crate::error::{ApiError, ApiResult};
use crate::extract::JsonBody;
use crate::state::{AppState, run_db};

/// Outsiders get the same answer as for a conversation that does not exist.
const NOT_FOUND: &str = "Conversation not found";

pub async fn get_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<Message>>> {
    let user_id = claims.sub.to_string();
    let rows = run_db(&state, move |db| {
        db.get_messages_for_member(&conversation_id, &user_id)
    })
    .await?
    .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;

    Ok(Json(rows.into_iter().map(convert::message).collect()))
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Extension(claims): Extension<Claims>,
    JsonBody(req): JsonBody<SendMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let content = req.content.trim().to_string();
    if content.is_empty() {
        return Err(ApiError::invalid("Message content is required"));
    }

    let message_id = Uuid::new_v4().to_string();
    let user_id = claims.sub.to_string();
    let sender_email = claims.email.clone();
    let row = run_db(&state, move |db| {
        db.insert_message(&message_id, &conversation_id, &user_id, &sender_email, &content)
    })
    .await?
    .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;

    debug!("{} posted {} in {}", row.sender_email, row.id, row.conversation_id);

    Ok((StatusCode::CREATED, Json(convert::message(row))))
}
