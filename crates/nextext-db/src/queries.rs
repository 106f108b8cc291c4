use crate::models::{
    ConversationListRow, ConversationRow, MessageRow, ParticipantRow, ResolvedConversation, UserRow,
};
use crate::{Database, now_timestamp, pair_key};
use anyhow::Result;
use rusqlite::{Connection, Row, TransactionBehavior};
use tracing::debug;

const USER_COLUMNS: &str = "id, name, email, password, short_code, created_at";
const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_email, content, created_at";

impl Database {
    // -- Users --

    /// Insert a user. Returns `None` when the email is already registered.
    pub fn create_user(
        &self,
        id: &str,
        name: &str,
        email: &str,
        password_hash: &str,
        short_code: &str,
    ) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let created_at = now_timestamp();
            let inserted = conn.execute(
                "INSERT INTO users (id, name, email, password, short_code, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(email) DO NOTHING",
                rusqlite::params![id, name, email, password_hash, short_code, created_at],
            )?;

            if inserted == 0 {
                return Ok(None);
            }

            Ok(Some(UserRow {
                id: id.to_string(),
                name: name.to_string(),
                email: email.to_string(),
                password: password_hash.to_string(),
                short_code: short_code.to_string(),
                created_at,
            }))
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email = ?1", email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id = ?1", id))
    }

    /// Short codes are not constrained unique; the oldest holder wins.
    pub fn get_user_by_short_code(&self, short_code: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "short_code = ?1", short_code))
    }

    pub fn short_code_taken(&self, short_code: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let taken = conn
                .query_row(
                    "SELECT 1 FROM users WHERE short_code = ?1 LIMIT 1",
                    [short_code],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();
            Ok(taken)
        })
    }

    // -- Conversations --

    /// Find the conversation between two users, creating it if absent.
    ///
    /// Keyed by the canonical pair key under a UNIQUE constraint, so two
    /// racing callers end up with the same conversation and only one of them
    /// sees `created == true`.
    pub fn find_or_create_conversation(
        &self,
        new_id: &str,
        first: &ParticipantRow,
        second: &ParticipantRow,
    ) -> Result<ResolvedConversation> {
        let key = pair_key(&first.user_id, &second.user_id);

        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let now = now_timestamp();
            let inserted = tx.execute(
                "INSERT INTO conversations (id, pair_key, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)
                 ON CONFLICT(pair_key) DO NOTHING",
                rusqlite::params![new_id, key, now],
            )?;

            let resolved = if inserted == 1 {
                for (position, p) in [first, second].into_iter().enumerate() {
                    tx.execute(
                        "INSERT INTO conversation_participants (conversation_id, user_id, email, position)
                         VALUES (?1, ?2, ?3, ?4)",
                        rusqlite::params![new_id, p.user_id, p.email, position as i64],
                    )?;
                }
                ResolvedConversation {
                    id: new_id.to_string(),
                    created: true,
                }
            } else {
                let id: String = tx.query_row(
                    "SELECT id FROM conversations WHERE pair_key = ?1",
                    [&key],
                    |row| row.get(0),
                )?;
                ResolvedConversation { id, created: false }
            };

            tx.commit()?;
            debug!("Resolved conversation {} (created: {})", resolved.id, resolved.created);
            Ok(resolved)
        })
    }

    pub fn get_participants(&self, conversation_id: &str) -> Result<Vec<ParticipantRow>> {
        self.with_conn(|conn| query_participants(conn, conversation_id))
    }

    pub fn is_participant(&self, conversation_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| query_is_participant(conn, conversation_id, user_id))
    }

    /// Every conversation `user_id` takes part in, unsorted.
    pub fn list_conversations(&self, user_id: &str) -> Result<Vec<ConversationListRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.created_at, c.updated_at
                 FROM conversations c
                 JOIN conversation_participants p ON p.conversation_id = c.id
                 WHERE p.user_id = ?1",
            )?;

            let conversations = stmt
                .query_map([user_id], |row| {
                    Ok(ConversationRow {
                        id: row.get(0)?,
                        created_at: row.get(1)?,
                        updated_at: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut rows = Vec::with_capacity(conversations.len());
            for conversation in conversations {
                let participants = query_participants(conn, &conversation.id)?;
                let counterpart = match participants.iter().find(|p| p.user_id != user_id) {
                    Some(other) => query_user(conn, "id = ?1", &other.user_id)?,
                    None => None,
                };
                let last_message = query_last_message(conn, &conversation.id)?;

                rows.push(ConversationListRow {
                    conversation,
                    participants,
                    counterpart,
                    last_message,
                });
            }

            Ok(rows)
        })
    }

    // -- Messages --

    /// All messages of a conversation, oldest first. `None` when the
    /// conversation does not exist or `user_id` is not a participant.
    pub fn get_messages_for_member(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<Option<Vec<MessageRow>>> {
        self.with_conn(|conn| {
            if !query_is_participant(conn, conversation_id, user_id)? {
                return Ok(None);
            }
            query_messages(conn, conversation_id).map(Some)
        })
    }

    /// Append a message if `user_id` is a participant, bumping the
    /// conversation's `updated_at`. Membership check and insert share one
    /// transaction. Returns `None` when the sender is not a participant.
    pub fn insert_message(
        &self,
        id: &str,
        conversation_id: &str,
        user_id: &str,
        sender_email: &str,
        content: &str,
    ) -> Result<Option<MessageRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            if !query_is_participant(&tx, conversation_id, user_id)? {
                return Ok(None);
            }

            let created_at = now_timestamp();
            tx.execute(
                "INSERT INTO messages (id, conversation_id, sender_email, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, conversation_id, sender_email, content, created_at],
            )?;
            tx.execute(
                "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
                rusqlite::params![created_at, conversation_id],
            )?;
            tx.commit()?;

            Ok(Some(MessageRow {
                id: id.to_string(),
                conversation_id: conversation_id.to_string(),
                sender_email: sender_email.to_string(),
                content: content.to_string(),
                created_at,
            }))
        })
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        short_code: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_email: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
    })
}

/// `filter` is a fixed WHERE clause taking a single `?1` parameter.
fn query_user(conn: &Connection, filter: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!(
        "SELECT {} FROM users WHERE {} ORDER BY created_at, rowid LIMIT 1",
        USER_COLUMNS, filter
    );
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt.query_row([value], user_from_row).optional()?;
    Ok(row)
}

fn query_participants(conn: &Connection, conversation_id: &str) -> Result<Vec<ParticipantRow>> {
    let mut stmt = conn.prepare(
        "SELECT user_id, email FROM conversation_participants
         WHERE conversation_id = ?1
         ORDER BY position",
    )?;

    let rows = stmt
        .query_map([conversation_id], |row| {
            Ok(ParticipantRow {
                user_id: row.get(0)?,
                email: row.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn query_is_participant(conn: &Connection, conversation_id: &str, user_id: &str) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM conversation_participants WHERE conversation_id = ?1 AND user_id = ?2",
            [conversation_id, user_id],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    Ok(found)
}

fn query_messages(conn: &Connection, conversation_id: &str) -> Result<Vec<MessageRow>> {
    // rowid breaks ties between messages stamped in the same microsecond
    let sql = format!(
        "SELECT {} FROM messages WHERE conversation_id = ?1 ORDER BY created_at ASC, rowid ASC",
        MESSAGE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([conversation_id], message_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn query_last_message(conn: &Connection, conversation_id: &str) -> Result<Option<MessageRow>> {
    let sql = format!(
        "SELECT {} FROM messages WHERE conversation_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT 1",
        MESSAGE_COLUMNS
    );
    let row = conn.query_row(&sql, [conversation_id], message_from_row).optional()?;
    Ok(row)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
