/// SQLite row types. Kept apart from the nextext-types API models so the
/// storage layer does not depend on the wire format.

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password: String,
    pub short_code: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct ConversationRow {
    pub id: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct ParticipantRow {
    pub user_id: String,
    pub email: String,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub sender_email: String,
    pub content: String,
    pub created_at: String,
}

/// A conversation as seen from one of its participants, with everything the
/// conversation list needs in one row.
#[derive(Debug, Clone)]
pub struct ConversationListRow {
    pub conversation: ConversationRow,
    pub participants: Vec<ParticipantRow>,
    /// The other participant's current user record, if it still exists.
    pub counterpart: Option<UserRow>,
    pub last_message: Option<MessageRow>,
}

/// Outcome of a find-or-create on a participant pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConversation {
    pub id: String,
    pub created: bool,
}
