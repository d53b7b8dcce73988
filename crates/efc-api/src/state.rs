use std::sync::Arc;

use tracing::error;

use efc_db::Database;

use crate::config::Config;
use crate::error::{ApiError, ApiResult};
use crate::mail::Mailer;
use crate::storage::Storage;
use crate::tokens::TokenService;

pub type AppState = Arc<AppStateInner>;

/// Services built once at startup and shared by every request.
pub struct AppStateInner {
    pub db: Database,
    pub storage: Storage,
    pub tokens: TokenService,
    pub mailer: Arc<dyn Mailer>,
    pub config: Config,
}

/// Runs a blocking store call off the async executor.
pub async fn with_db<F, T>(state: &AppState, f: F) -> ApiResult<T>
where
    F: FnOnce(&Database) -> efc_db::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(e.to_string())
        })?
        .map_err(ApiError::from)
}
