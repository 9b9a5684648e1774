/// Refresh Token Records
///
/// Refresh tokens are signed JWTs handed to the client. The server keeps only
/// an HMAC digest of each one, with its owner and expiry:
/// - created at login, refresh and external-identity login
/// - deleted on every refresh (rotation) and on logout (all records of the owner)
/// - never updated in place

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    /// HMAC digest of the token, never the token itself
    pub token_hash: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl RefreshTokenRecord {
    pub fn new(user_id: Uuid, token_hash: String, ttl: Duration) -> Self {
        let issued_at = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            token_hash,
            issued_at,
            expires_at: issued_at + ttl,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Persistence for refresh-token digests
///
/// Implementations index `token_hash` uniquely and `expires_at` for sweeping.
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Insert a new record. A `token_hash` collision is reported as `Internal`,
    /// never as a silent overwrite.
    async fn store_refresh_token(&self, record: &RefreshTokenRecord) -> Result<(), AppError>;

    /// Fails with `NotFound` when no record has this digest
    async fn find_by_hash(&self, token_hash: &str) -> Result<RefreshTokenRecord, AppError>;

    /// Idempotent. Returns whether a record was actually removed.
    async fn delete_by_hash(&self, token_hash: &str) -> Result<bool, AppError>;

    /// Idempotent bulk revoke for one identity
    async fn delete_all_by_owner(&self, user_id: Uuid) -> Result<u64, AppError>;

    /// Physically remove records expired at `now`
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_expiry_boundary() {
        let record = RefreshTokenRecord::new(Uuid::new_v4(), "digest".to_string(), Duration::days(7));

        assert!(!record.is_expired_at(record.issued_at));
        assert!(!record.is_expired_at(record.expires_at - Duration::seconds(1)));
        assert!(record.is_expired_at(record.expires_at));
        assert!(record.is_expired_at(record.expires_at + Duration::seconds(1)));
    }

    #[test]
    fn test_records_get_distinct_ids() {
        let owner = Uuid::new_v4();
        let first = RefreshTokenRecord::new(owner, "a".to_string(), Duration::days(7));
        let second = RefreshTokenRecord::new(owner, "b".to_string(), Duration::days(7));
        assert_ne!(first.id, second.id);
        assert_eq!(first.user_id, second.user_id);
    }
}
