//! Terminal chat: logs in, opens a conversation by short code, prints
//! incoming messages as they are polled and sends each stdin line.
//!
//! Usage: `nextext-chat <short-code>`

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use reqwest::StatusCode;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{info, warn};

use nextext_client::detect::Notification;
use nextext_client::poller::{DEFAULT_POLL_INTERVAL, LogNotifier, Notifier};
use nextext_client::{ApiClient, ViewState, views};
use nextext_types::models::Message;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nextext_client=info,nextext_chat=info".into()),
        )
        .init();

    // Config
    let Some(short_code) = std::env::args().nth(1) else {
        bail!("usage: nextext-chat <short-code>");
    };
    let base_url = std::env::var("NEXTEXT_URL").unwrap_or_else(|_| "http://127.0.0.1:3000".into());
    let email = std::env::var("NEXTEXT_EMAIL").context("NEXTEXT_EMAIL is not set")?;
    let password = std::env::var("NEXTEXT_PASSWORD").context("NEXTEXT_PASSWORD is not set")?;
    let period = match std::env::var("NEXTEXT_POLL_MS") {
        Ok(ms) => Duration::from_millis(ms.parse().context("NEXTEXT_POLL_MS must be a number")?),
        Err(_) => DEFAULT_POLL_INTERVAL,
    };

    let mut client = ApiClient::new(base_url);
    client.login(&email, &password).await?;
    let me = client.current_user().await?;
    info!("Logged in as {} (short code {})", me.name, me.short_code);

    let chat = match client.start_chat(&short_code).await {
        Ok(chat) => chat,
        Err(e) if e.status() == Some(StatusCode::NOT_FOUND) => {
            bail!("no user with short code {}", short_code)
        }
        Err(e) => return Err(e.into()),
    };
    let conversation_id = chat.conversation_id;
    if chat.is_new {
        info!("Started conversation {}", conversation_id);
    }

    // The list view only announces other conversations; the open one is
    // printed in full anyway.
    let elsewhere: Arc<dyn Notifier> = Arc::new(move |n: &Notification| {
        if n.conversation_id != conversation_id {
            LogNotifier.notify(n);
        }
    });
    let quiet: Arc<dyn Notifier> = Arc::new(|_: &Notification| {});

    let mut dashboard = views::conversation_list(client.clone(), elsewhere, period)?;
    let mut view = views::conversation(client.clone(), conversation_id, quiet, period)?;

    let printer = tokio::spawn(print_messages(view.subscribe()));
    let mut dashboard_state = dashboard.subscribe();
    dashboard.show();
    view.show();

    let mut unread_elsewhere = 0;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            changed = dashboard_state.changed() => {
                if changed.is_err() {
                    break;
                }
                // The open conversation is on screen, so it is never unread.
                dashboard.clear_unread(conversation_id);
                let unread = dashboard.unread().len();
                if unread != unread_elsewhere {
                    unread_elsewhere = unread;
                    if unread > 0 {
                        info!("{} other conversation(s) with unread messages", unread);
                    }
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                if let Err(e) = client.send_message(conversation_id, &line).await {
                    warn!("Send failed: {}", e);
                    continue;
                }
                // Show our own message without waiting for the next tick
                view.poll_once().await;
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    view.hide();
    dashboard.hide();
    printer.abort();
    info!("Bye");
    Ok(())
}

async fn print_messages(mut state: watch::Receiver<ViewState<Vec<Message>>>) {
    let mut printed = HashSet::new();
    while state.changed().await.is_ok() {
        let snapshot = state.borrow_and_update();
        if let Some(error) = &snapshot.error {
            warn!("Sync error: {}", error);
        }
        for m in snapshot.data.iter().flatten() {
            if printed.insert(m.id) {
                println!("[{}] {}: {}", m.created_at.format("%H:%M:%S"), m.sender_email, m.content);
            }
        }
    }
}
