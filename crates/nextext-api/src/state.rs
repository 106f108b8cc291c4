use std::sync::Arc;

use tracing::error;

use nextext_db::Database;
use nextext_db::models::UserRow;
use nextext_types::api::Claims;

use crate::error::{ApiError, ApiResult};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
}

// -- Helpers --

/// Run blocking DB work off the async runtime.
pub(crate) async fn run_db<F, T>(state: &AppState, f: F) -> ApiResult<T>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Storage(anyhow::anyhow!("blocking task failed: {}", e))
        })?
        .map_err(ApiError::Storage)
}

/// Resolve the session owner by the email carried in their token.
pub(crate) async fn session_user(state: &AppState, claims: &Claims) -> ApiResult<UserRow> {
    let email = claims.email.clone();
    run_db(state, move |db| db.get_user_by_email(&email))
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))
}
