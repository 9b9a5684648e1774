//! Background sweep of expired refresh and one-time tokens.
//!
//! Validation never depends on this running; it only keeps the tables small.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;

use crate::auth::one_time_token::OneTimeTokenStore;
use crate::auth::refresh_token::RefreshTokenStore;
use crate::error::AppError;
use crate::store::with_deadline;

#[derive(Clone)]
pub struct TokenSweeper {
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    one_time_tokens: Arc<dyn OneTimeTokenStore>,
    timeout: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub refresh_tokens: u64,
    pub one_time_tokens: u64,
}

impl TokenSweeper {
    pub fn new(
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        one_time_tokens: Arc<dyn OneTimeTokenStore>,
        timeout: Duration,
    ) -> Self {
        Self {
            refresh_tokens,
            one_time_tokens,
            timeout,
        }
    }

    /// Delete every token already expired.
    pub async fn run_once(&self) -> Result<SweepReport, AppError> {
        let now = Utc::now();
        let report = SweepReport {
            refresh_tokens: with_deadline(
                self.timeout,
                "refresh_tokens.purge_expired",
                self.refresh_tokens.purge_expired(now),
            )
            .await?,
            one_time_tokens: with_deadline(
                self.timeout,
                "one_time_tokens.purge_expired",
                self.one_time_tokens.purge_expired(now),
            )
            .await?,
        };

        if report != SweepReport::default() {
            tracing::info!(
                refresh_tokens = report.refresh_tokens,
                one_time_tokens = report.one_time_tokens,
                "Purged expired tokens"
            );
        }
        Ok(report)
    }

    /// Sweep every `interval` until the runtime shuts down
    pub fn spawn(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(e) = self.run_once().await {
                    tracing::error!(error = %e, "Token sweep failed");
                }
            }
        })
    }
}
