//! Row → API model conversion. Corrupt stored values are logged and replaced
//! with defaults instead of failing the whole response.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use nextext_db::models::{MessageRow, ParticipantRow, UserRow};
use nextext_types::models::{Message, ParticipantSnapshot, PublicProfile};

pub fn parse_uuid(value: &str, what: &str) -> Uuid {
    value.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", what, value, e);
        Uuid::default()
    })
}

pub fn parse_timestamp(value: &str) -> DateTime<Utc> {
    value
        .parse::<DateTime<Utc>>()
        .or_else(|_| {
            // Rows written by SQLite's datetime('now') carry no timezone.
            NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", value, e);
            DateTime::default()
        })
}

pub fn message(row: MessageRow) -> Message {
    Message {
        id: parse_uuid(&row.id, "message id"),
        conversation_id: parse_uuid(&row.conversation_id, "conversation id"),
        sender_email: row.sender_email,
        content: row.content,
        created_at: parse_timestamp(&row.created_at),
    }
}

pub fn participant(row: ParticipantRow) -> ParticipantSnapshot {
    ParticipantSnapshot {
        user_id: parse_uuid(&row.user_id, "participant id"),
        email: row.email,
    }
}

pub fn profile(user: &UserRow) -> PublicProfile {
    PublicProfile {
        name: user.name.clone(),
        email: user.email.clone(),
        short_code: user.short_code.clone(),
    }
}
