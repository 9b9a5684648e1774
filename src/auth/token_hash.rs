/// Keyed hashing of opaque token strings
///
/// Refresh tokens are stored only as HMAC-SHA256 digests so the table can be
/// searched by the presented token without ever holding the raw material.

use base64::{engine::general_purpose::URL_SAFE, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

fn keyed_mac(token: &str, secret: &str) -> Result<HmacSha256, AppError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::internal(format!("Invalid HMAC secret: {}", e)))?;
    mac.update(token.as_bytes());
    Ok(mac)
}

/// Deterministic keyed digest of `token`, base64url encoded
pub fn hash_token(token: &str, secret: &str) -> Result<String, AppError> {
    Ok(URL_SAFE.encode(keyed_mac(token, secret)?.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_deterministic() {
        let first = hash_token("some.jwt.value", "hmac-secret").unwrap();
        let second = hash_token("some.jwt.value", "hmac-secret").unwrap();
        assert_eq!(first, second);
        assert_ne!(first, "some.jwt.value");
        // 32-byte digest, padded base64
        assert_eq!(first.len(), 44);
    }

    #[test]
    fn test_hash_depends_on_key_and_input() {
        let base = hash_token("token-a", "key-1").unwrap();
        assert_ne!(base, hash_token("token-b", "key-1").unwrap());
        assert_ne!(base, hash_token("token-a", "key-2").unwrap());
    }
}
