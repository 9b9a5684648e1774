/// Single-use tokens for account activation and password reset
///
/// Both kinds share one shape and one service; the kind is fixed at the type
/// level through `TokenPurpose`, so an activation service can never consume a
/// password-reset token. A token is valid iff `now < expires_at && !used`, and
/// that is re-checked by the store at consumption time.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use uuid::Uuid;

use crate::error::{AppError, OneTimeTokenError};
use crate::store::with_deadline;

/// 256 bits of entropy per token
const TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Activation,
    PasswordReset,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Activation => "activation",
            TokenKind::PasswordReset => "password_reset",
        }
    }
}

/// Binds a `OneTimeTokenService` to one token kind
pub trait TokenPurpose: Send + Sync + 'static {
    const KIND: TokenKind;
}

#[derive(Debug, Clone, Copy)]
pub struct Activation;

impl TokenPurpose for Activation {
    const KIND: TokenKind = TokenKind::Activation;
}

#[derive(Debug, Clone, Copy)]
pub struct PasswordReset;

impl TokenPurpose for PasswordReset {
    const KIND: TokenKind = TokenKind::PasswordReset;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneTimeToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: TokenKind,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

impl OneTimeToken {
    pub fn new(kind: TokenKind, user_id: Uuid, ttl: Duration) -> Self {
        let created_at = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            kind,
            token: generate_token_value(),
            expires_at: created_at + ttl,
            used: false,
            created_at,
        }
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at && !self.used
    }

    /// Why this token can not be consumed at `now`, if it can't
    pub fn rejection_at(&self, now: DateTime<Utc>) -> Option<OneTimeTokenError> {
        if self.used {
            Some(OneTimeTokenError::AlreadyUsed)
        } else if now >= self.expires_at {
            Some(OneTimeTokenError::Expired)
        } else {
            None
        }
    }
}

/// Hex-encoded random token value
pub fn generate_token_value() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Persistence for one-time tokens, partitioned by `TokenKind`
#[async_trait]
pub trait OneTimeTokenStore: Send + Sync {
    /// The token value is unique per kind; a collision is `Internal`
    async fn insert(&self, token: &OneTimeToken) -> Result<(), AppError>;

    async fn find(&self, kind: TokenKind, token: &str) -> Result<Option<OneTimeToken>, AppError>;

    /// Single conditional update: mark used where `used = false` and
    /// `expires_at > now`. Returns the owner when this call flipped the flag.
    async fn consume(
        &self,
        kind: TokenKind,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>, AppError>;

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError>;
}

pub struct OneTimeTokenService<P: TokenPurpose> {
    store: Arc<dyn OneTimeTokenStore>,
    timeout: StdDuration,
    _purpose: PhantomData<fn() -> P>,
}

impl<P: TokenPurpose> Clone for OneTimeTokenService<P> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            timeout: self.timeout,
            _purpose: PhantomData,
        }
    }
}

impl<P: TokenPurpose> OneTimeTokenService<P> {
    pub fn new(store: Arc<dyn OneTimeTokenStore>, timeout: StdDuration) -> Self {
        Self {
            store,
            timeout,
            _purpose: PhantomData,
        }
    }

    pub fn kind(&self) -> TokenKind {
        P::KIND
    }

    /// Persist a fresh token for `owner` and return its raw value for
    /// out-of-band delivery
    pub async fn issue(&self, owner: Uuid, ttl: Duration) -> Result<String, AppError> {
        let record = OneTimeToken::new(P::KIND, owner, ttl);

        with_deadline(self.timeout, "one_time_tokens.insert", self.store.insert(&record))
            .await
            .map_err(|e| {
                tracing::error!(user_id = %owner, kind = P::KIND.as_str(), error = %e, "Failed to issue token");
                e
            })?;

        tracing::info!(user_id = %owner, kind = P::KIND.as_str(), expires_at = %record.expires_at, "Issued one-time token");
        Ok(record.token)
    }

    /// `Ok(false)` for missing, expired or used tokens; `Err` only on storage faults
    pub async fn is_valid(&self, token: &str) -> Result<bool, AppError> {
        let record = with_deadline(
            self.timeout,
            "one_time_tokens.find",
            self.store.find(P::KIND, token),
        )
        .await?;

        Ok(record.map_or(false, |r| r.is_valid_at(Utc::now())))
    }

    /// Validate and mark used in one step, returning the owner
    ///
    /// # Errors
    /// `NotFound`, `Expired` or `AlreadyUsed` when the token can not be consumed
    pub async fn consume(&self, token: &str) -> Result<Uuid, AppError> {
        let now = Utc::now();
        let consumed = with_deadline(
            self.timeout,
            "one_time_tokens.consume",
            self.store.consume(P::KIND, token, now),
        )
        .await?;

        if let Some(owner) = consumed {
            tracing::info!(user_id = %owner, kind = P::KIND.as_str(), "Consumed one-time token");
            return Ok(owner);
        }

        // Lost the conditional update; look again only to report why.
        let record = with_deadline(
            self.timeout,
            "one_time_tokens.find",
            self.store.find(P::KIND, token),
        )
        .await?;

        let reason = match record {
            None => OneTimeTokenError::NotFound,
            Some(r) => r.rejection_at(now).unwrap_or(OneTimeTokenError::AlreadyUsed),
        };
        tracing::warn!(kind = P::KIND.as_str(), reason = %reason, "One-time token rejected");
        Err(reason.into())
    }
}
