use std::cmp::Ordering;

use axum::{Extension, Json, extract::State};
use tracing::info;
use uuid::Uuid;

use nextext_db::models::{ConversationListRow, ParticipantRow};
use nextext_types::api::{Claims, ConversationSummary, StartChatRequest, StartChatResponse};
use nextext_types::models::PublicProfile;

use crate::convert;
use crate::error::{ApiError, ApiResult};
use crate::extract::JsonBody;
use crate::shortcode;
use crate::state::{AppState, run_db, session_user};

/// Resolve a short code to a user and find or open the conversation with them.
pub async fn start_chat(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    JsonBody(req): JsonBody<StartChatRequest>,
) -> ApiResult<Json<StartChatResponse>> {
    let code = req.short_code.trim().to_ascii_uppercase();
    if code.is_empty() {
        return Err(ApiError::invalid("Short code is required"));
    }

    let requester = session_user(&state, &claims).await?;

    if !shortcode::is_well_formed(&code) {
        return Err(ApiError::not_found("User not found"));
    }
    let target = run_db(&state, move |db| db.get_user_by_short_code(&code))
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    if target.id == requester.id {
        return Err(ApiError::invalid("Cannot start a chat with yourself"));
    }

    let first = ParticipantRow {
        user_id: requester.id.clone(),
        email: requester.email.clone(),
    };
    let second = ParticipantRow {
        user_id: target.id.clone(),
        email: target.email.clone(),
    };
    let new_id = Uuid::new_v4().to_string();
    let resolved = run_db(&state, move |db| {
        db.find_or_create_conversation(&new_id, &first, &second)
    })
    .await?;

    if resolved.created {
        info!(
            "Opened conversation {} between {} and {}",
            resolved.id, requester.email, target.email
        );
    }

    Ok(Json(StartChatResponse {
        conversation_id: returned_id(&resolved.id)?,
        is_new: resolved.created,
    }))
}

/// Clients poll the id they get back, so a corrupt one is a storage failure
/// rather than a nil fallback.
fn returned_id(raw: &str) -> ApiResult<Uuid> {
    raw.parse()
        .map_err(|e| ApiError::Storage(anyhow::anyhow!("corrupt conversation id '{}': {}", raw, e)))
}

pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<ConversationSummary>>> {
    let user_id = claims.sub.to_string();
    let rows = run_db(&state, move |db| db.list_conversations(&user_id)).await?;

    let mut summaries: Vec<ConversationSummary> = rows
        .into_iter()
        .map(|row| summarize(row, claims.sub))
        .collect();
    sort_summaries(&mut summaries);

    Ok(Json(summaries))
}

fn summarize(row: ConversationListRow, viewer: Uuid) -> ConversationSummary {
    let participants: Vec<_> = row.participants.into_iter().map(convert::participant).collect();

    let other = match &row.counterpart {
        Some(user) => convert::profile(user),
        // Counterpart record gone: fall back to the snapshot.
        None => PublicProfile {
            name: String::new(),
            email: participants
                .iter()
                .find(|p| p.user_id != viewer)
                .map(|p| p.email.clone())
                .unwrap_or_default(),
            short_code: String::new(),
        },
    };

    ConversationSummary {
        id: convert::parse_uuid(&row.conversation.id, "conversation id"),
        participants,
        other,
        last_message: row.last_message.map(convert::message),
        created_at: convert::parse_timestamp(&row.conversation.created_at),
        updated_at: convert::parse_timestamp(&row.conversation.updated_at),
    }
}

/// Most recent message first. Conversations without messages go after all
/// the others, newest first among themselves.
pub fn sort_summaries(summaries: &mut [ConversationSummary]) {
    summaries.sort_by(|a, b| match (&a.last_message, &b.last_message) {
        (Some(ma), Some(mb)) => mb.created_at.cmp(&ma.created_at),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => b.created_at.cmp(&a.created_at),
    });
}
