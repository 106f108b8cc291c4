//! Shallow change detection for polled snapshots.
//!
//! Each detector remembers just enough of the previous snapshot to decide
//! whether the displayed state needs replacing and whether anything deserves
//! a notification. The first snapshot a detector sees only primes it.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use nextext_types::api::ConversationSummary;
use nextext_types::models::Message;

/// A message from someone else that arrived since the previous poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub conversation_id: Uuid,
    pub sender_email: String,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

impl From<&Message> for Notification {
    fn from(m: &Message) -> Self {
        Self {
            conversation_id: m.conversation_id,
            sender_email: m.sender_email.clone(),
            content: m.content.clone(),
            sent_at: m.created_at,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Observation {
    /// Displayed state should be replaced with the new snapshot.
    pub changed: bool,
    pub notifications: Vec<Notification>,
}

impl Observation {
    pub fn unchanged() -> Self {
        Self::default()
    }
}

pub trait Detect<T>: Send + 'static {
    fn observe(&mut self, snapshot: &T) -> Observation;
}

/// Single conversation view: compares the id of the last message.
#[derive(Debug)]
pub struct LastMessageDetector {
    me: String,
    last_id: Option<Uuid>,
    primed: bool,
}

impl LastMessageDetector {
    pub fn new(me: impl Into<String>) -> Self {
        Self {
            me: me.into(),
            last_id: None,
            primed: false,
        }
    }
}

impl Detect<Vec<Message>> for LastMessageDetector {
    fn observe(&mut self, messages: &Vec<Message>) -> Observation {
        let last = messages.last();
        let last_id = last.map(|m| m.id);
        if self.primed && last_id == self.last_id {
            return Observation::unchanged();
        }

        let notifications = match last {
            Some(m) if self.primed && m.sender_email != self.me => vec![Notification::from(m)],
            _ => vec![],
        };

        self.primed = true;
        self.last_id = last_id;
        Observation {
            changed: true,
            notifications,
        }
    }
}

/// Conversation list view: compares each conversation's last-message time.
///
/// Also keeps the unread badge: conversations that received a message from
/// someone else since they were last opened.
#[derive(Debug)]
pub struct ConversationListDetector {
    me: String,
    seen: HashMap<Uuid, Option<DateTime<Utc>>>,
    unread: HashSet<Uuid>,
    primed: bool,
}

impl ConversationListDetector {
    pub fn new(me: impl Into<String>) -> Self {
        Self {
            me: me.into(),
            seen: HashMap::new(),
            unread: HashSet::new(),
            primed: false,
        }
    }

    pub fn unread(&self) -> &HashSet<Uuid> {
        &self.unread
    }

    /// Conversation opened. Returns whether it carried the badge.
    pub fn mark_read(&mut self, conversation_id: Uuid) -> bool {
        self.unread.remove(&conversation_id)
    }
}

impl Detect<Vec<ConversationSummary>> for ConversationListDetector {
    fn observe(&mut self, conversations: &Vec<ConversationSummary>) -> Observation {
        let current: HashMap<Uuid, Option<DateTime<Utc>>> = conversations
            .iter()
            .map(|c| (c.id, c.last_message.as_ref().map(|m| m.created_at)))
            .collect();

        if self.primed && current == self.seen {
            return Observation::unchanged();
        }

        let mut notifications = Vec::new();
        if self.primed {
            for c in conversations {
                let Some(m) = &c.last_message else { continue };
                let previous = self.seen.get(&c.id).copied().flatten();
                if previous.is_none_or(|p| m.created_at > p) && m.sender_email != self.me {
                    self.unread.insert(c.id);
                    notifications.push(Notification::from(m));
                }
            }
        }

        self.primed = true;
        self.seen = current;
        Observation {
            changed: true,
            notifications,
        }
    }
}
