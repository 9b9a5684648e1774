/// Password Hashing and Verification
///
/// bcrypt with a configurable cost. Length bounds are checked by the callers
/// through `validators::is_valid_password`.

use bcrypt::{hash, verify, DEFAULT_COST};

use crate::error::AppError;

/// Cost bounds bcrypt accepts
pub const MIN_BCRYPT_COST: u32 = 4;
pub const MAX_BCRYPT_COST: u32 = 31;

/// Hash a password using bcrypt at the default cost
pub fn hash_password(password: &str) -> Result<String, AppError> {
    hash_password_with_cost(password, DEFAULT_COST)
}

/// Hash a password using bcrypt
///
/// # Errors
/// Returns `Internal` if bcrypt fails (invalid cost or entropy failure)
pub fn hash_password_with_cost(password: &str, cost: u32) -> Result<String, AppError> {
    hash(password, cost).map_err(|e| {
        tracing::error!(error = %e, "Password hashing failed");
        AppError::internal(format!("Password hashing failed: {}", e))
    })
}

/// Verify a password against its hash
///
/// A malformed stored hash counts as a mismatch rather than an error, so the
/// caller reports `InvalidCredentials` instead of a server fault.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match verify(password, hash) {
        Ok(matches) => matches,
        Err(e) => {
            tracing::warn!(error = %e, "Stored password hash could not be verified");
            false
        }
    }
}
