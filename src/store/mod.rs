//! Storage backends for identities, refresh tokens and one-time tokens.
//!
//! Services hold the stores as `Arc<dyn _>` trait objects and wrap every call
//! in [`with_deadline`]. There is no retry anywhere in this layer.

pub mod cleanup;
pub mod memory;
pub mod postgres;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::one_time_token::OneTimeTokenStore;
use crate::auth::refresh_token::RefreshTokenStore;
use crate::auth::user::UserStore;
use crate::error::AppError;

/// Run a storage operation with a time limit.
///
/// When `limit` elapses the future is dropped, which cancels the in-flight
/// operation, and `AppError::Timeout` is returned.
pub async fn with_deadline<T, F>(limit: Duration, op: &'static str, fut: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::error!(operation = op, timeout_ms = limit.as_millis() as u64, "Storage operation timed out");
            Err(AppError::Timeout(op.to_string()))
        }
    }
}

/// The three collections, behind whichever backend was configured
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub refresh_tokens: Arc<dyn RefreshTokenStore>,
    pub one_time_tokens: Arc<dyn OneTimeTokenStore>,
}

impl Stores {
    pub fn in_memory() -> Self {
        let store = Arc::new(memory::InMemoryStore::new());
        Self {
            users: store.clone(),
            refresh_tokens: store.clone(),
            one_time_tokens: store,
        }
    }

    pub fn postgres(pool: sqlx::PgPool) -> Self {
        let store = Arc::new(postgres::PgStore::new(pool));
        Self {
            users: store.clone(),
            refresh_tokens: store.clone(),
            one_time_tokens: store,
        }
    }
}
