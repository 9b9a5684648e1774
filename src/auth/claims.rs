/// JWT Claims structure
///
/// Access and refresh tokens share this payload; only the lifetime (and the
/// signing secret) differ between the two kinds.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::role::Role;
use crate::auth::user::User;
use crate::error::{AppError, AuthError};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Subject (user ID as UUID string)
    pub sub: String,
    pub username: String,
    pub role: Role,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Not before (Unix timestamp)
    pub nbf: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Unique token id
    pub jti: String,
}

impl Claims {
    /// Claims for `user`, valid from now for `ttl`
    pub fn new(user: &User, ttl: Duration) -> Self {
        let now = Utc::now().timestamp();
        Self {
            sub: user.id.to_string(),
            username: user.username.clone(),
            role: user.role,
            iat: now,
            nbf: now,
            exp: now + ttl.num_seconds(),
            jti: Uuid::new_v4().to_string(),
        }
    }

    /// Extract user ID from claims
    ///
    /// # Errors
    /// Returns `InvalidToken` if the subject is not a UUID
    pub fn user_id(&self) -> Result<Uuid, AppError> {
        Uuid::parse_str(&self.sub).map_err(|_| AppError::Auth(AuthError::InvalidToken))
    }
}
