//! Client side of NexText: a typed HTTP client and the polling sync that
//! keeps a conversation list or a single conversation up to date.

pub mod client;
pub mod detect;
pub mod error;
pub mod poller;
pub mod views;

pub use client::ApiClient;
pub use error::ClientError;
pub use poller::{Fetch, LogNotifier, Notifier, SyncPoller, ViewState};
