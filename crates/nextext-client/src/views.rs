//! The two polled views: the conversation list (dashboard) and a single
//! open conversation.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use nextext_types::api::ConversationSummary;
use nextext_types::models::Message;

use crate::client::ApiClient;
use crate::detect::{ConversationListDetector, LastMessageDetector};
use crate::error::ClientError;
use crate::poller::{Fetch, Notifier, SyncPoller};

pub struct ConversationsFetch {
    client: ApiClient,
}

impl Fetch for ConversationsFetch {
    type Snapshot = Vec<ConversationSummary>;

    fn fetch(&self) -> impl Future<Output = Result<Self::Snapshot, ClientError>> + Send {
        self.client.conversations()
    }
}

pub struct MessagesFetch {
    client: ApiClient,
    conversation_id: Uuid,
}

impl Fetch for MessagesFetch {
    type Snapshot = Vec<Message>;

    fn fetch(&self) -> impl Future<Output = Result<Self::Snapshot, ClientError>> + Send {
        self.client.messages(self.conversation_id)
    }
}

pub type ConversationListView = SyncPoller<ConversationsFetch, ConversationListDetector>;
pub type ConversationView = SyncPoller<MessagesFetch, LastMessageDetector>;

/// Unread badge of a conversation list view.
impl<F> SyncPoller<F, ConversationListDetector>
where
    F: Fetch<Snapshot = Vec<ConversationSummary>>,
{
    /// Conversations with messages from others not yet opened.
    pub fn unread(&self) -> HashSet<Uuid> {
        self.with_detector(|d| d.unread().clone())
    }

    /// The user opened this conversation. Returns whether it was unread.
    pub fn clear_unread(&self, conversation_id: Uuid) -> bool {
        self.with_detector(|d| d.mark_read(conversation_id))
    }
}

/// Poller for the logged-in user's conversation list.
pub fn conversation_list(
    client: ApiClient,
    notifier: Arc<dyn Notifier>,
    period: Duration,
) -> Result<ConversationListView, ClientError> {
    let me = client.email().ok_or(ClientError::NotLoggedIn)?.to_string();
    Ok(SyncPoller::with_period(
        ConversationsFetch { client },
        ConversationListDetector::new(me),
        notifier,
        period,
    ))
}

/// Poller for the messages of one conversation.
pub fn conversation(
    client: ApiClient,
    conversation_id: Uuid,
    notifier: Arc<dyn Notifier>,
    period: Duration,
) -> Result<ConversationView, ClientError> {
    let me = client.email().ok_or(ClientError::NotLoggedIn)?.to_string();
    Ok(SyncPoller::with_period(
        MessagesFetch {
            client,
            conversation_id,
        },
        LastMessageDetector::new(me),
        notifier,
        period,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use chrono::Utc;
    use nextext_types::models::PublicProfile;

    use crate::poller::{DEFAULT_POLL_INTERVAL, LogNotifier};

    struct FakeList(Arc<Mutex<Vec<ConversationSummary>>>);

    impl Fetch for FakeList {
        type Snapshot = Vec<ConversationSummary>;

        fn fetch(&self) -> impl Future<Output = Result<Self::Snapshot, ClientError>> + Send {
            let list = self.0.lock().unwrap().clone();
            async move { Ok(list) }
        }
    }

    fn summary(id: Uuid, sender: &str) -> ConversationSummary {
        ConversationSummary {
            id,
            participants: vec![],
            other: PublicProfile {
                name: "Bob".into(),
                email: "bob@x.com".into(),
                short_code: "BOB123".into(),
            },
            last_message: Some(Message {
                id: Uuid::new_v4(),
                conversation_id: id,
                sender_email: sender.into(),
                content: "hey".into(),
                created_at: Utc::now(),
            }),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn list_view_tracks_unread_until_opened() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let list = Arc::new(Mutex::new(vec![]));
        let view = SyncPoller::new(
            FakeList(list.clone()),
            ConversationListDetector::new("me@x.com"),
            Arc::new(LogNotifier),
        );

        view.poll_once().await;
        assert!(view.unread().is_empty());

        *list.lock().unwrap() = vec![summary(a, "bob@x.com"), summary(b, "me@x.com")];
        view.poll_once().await;
        assert_eq!(view.unread(), HashSet::from([a]));

        assert!(view.clear_unread(a));
        assert!(view.unread().is_empty());

        // Same snapshot again: nothing new, badge stays cleared.
        view.poll_once().await;
        assert!(view.unread().is_empty());
    }

    #[test]
    fn views_need_a_logged_in_client() {
        let client = ApiClient::new("http://127.0.0.1:9");
        assert!(matches!(
            conversation_list(client.clone(), Arc::new(LogNotifier), DEFAULT_POLL_INTERVAL),
            Err(ClientError::NotLoggedIn)
        ));

        let client = client.with_session("token", "me@x.com");
        let view = conversation(client, Uuid::new_v4(), Arc::new(LogNotifier), DEFAULT_POLL_INTERVAL)
            .unwrap();
        assert!(!view.is_visible());
    }
}
