use std::sync::Arc;

use tracing::{error, warn};

use msgly_db::Database;

use crate::credentials;
use crate::error::{ApiError, ApiResult};
use crate::tokens::TokenIssuer;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub tokens: TokenIssuer,
}

impl AppStateInner {
    pub fn new(db: Database, tokens: TokenIssuer) -> AppState {
        if !credentials::prime_dummy_hash() {
            warn!("Dummy password hash unavailable; unknown-user logins will skip the Argon2 verify");
        }
        Arc::new(Self { db, tokens })
    }
}

/// Run blocking store work off the async runtime.
pub async fn run_blocking<F, T>(state: &AppState, f: F) -> ApiResult<T>
where
    F: FnOnce(&AppStateInner) -> ApiResult<T> + Send + 'static,
    T: Send + 'static,
{
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || f(&state))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::StoreUnavailable
        })?
}
