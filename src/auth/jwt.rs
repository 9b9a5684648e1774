/// JWT Token Generation and Validation
///
/// Stateless codec for access and refresh tokens. Every call takes the signing
/// secret explicitly. Tokens are HS256 only: a token whose header names any
/// other algorithm (including `none`) is rejected.

use chrono::Duration;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::auth::claims::Claims;
use crate::auth::user::User;
use crate::error::{AppError, AuthError};

pub const ACCESS_TOKEN_TTL_SECS: i64 = 60 * 60;
pub const REFRESH_TOKEN_TTL_SECS: i64 = 60 * 60 * 24 * 7;

/// Generate a short-lived access token for `user`
pub fn generate_access_token(user: &User, secret: &str) -> Result<String, AppError> {
    generate_token(user, secret, Duration::seconds(ACCESS_TOKEN_TTL_SECS))
}

/// Generate a long-lived refresh token for `user`
pub fn generate_refresh_token(user: &User, secret: &str) -> Result<String, AppError> {
    generate_token(user, secret, Duration::seconds(REFRESH_TOKEN_TTL_SECS))
}

/// Sign a token for `user` valid for `ttl`
///
/// # Errors
/// Returns `Internal` if the secret is empty or signing fails
pub fn generate_token(user: &User, secret: &str, ttl: Duration) -> Result<String, AppError> {
    if secret.is_empty() {
        tracing::error!(user_id = %user.id, "Refusing to sign a token with an empty secret");
        return Err(AppError::internal("Token signing secret is empty"));
    }

    let claims = Claims::new(user, ttl);

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| {
        tracing::error!(user_id = %user.id, error = %e, "Token generation failed");
        AppError::internal(format!("Token generation failed: {}", e))
    })
}

/// Validate a token and extract its claims
///
/// # Errors
/// Returns `InvalidToken` if the token is malformed, signed with another key or
/// algorithm, not yet valid, or expired
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, AppError> {
    if secret.is_empty() {
        tracing::error!("Refusing to validate a token against an empty secret");
        return Err(AppError::Auth(AuthError::InvalidToken));
    }

    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation.validate_nbf = true;
    validation.set_required_spec_claims(&["exp", "nbf", "iat", "sub"]);

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::warn!(error = %e, "JWT validation error");
        AppError::Auth(AuthError::InvalidToken)
    })
}
