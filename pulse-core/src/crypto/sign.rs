//! HMAC-SHA256 body signing.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{PulseError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Compute the HMAC-SHA256 of `body` under `key` and return it
/// hex-encoded, as carried in the HashSHA256 header.
pub fn sign(body: &[u8], key: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| PulseError::Auth { reason: format!("invalid hmac key: {e}") })?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Recompute the digest and compare against the hex value from the
/// header.
pub fn verify(body: &[u8], key: &[u8], expected_hex: &str) -> Result<bool> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| PulseError::Auth { reason: format!("invalid hmac key: {e}") })?;
    mac.update(body);

    let expected = hex::decode(expected_hex)
        .map_err(|e| PulseError::Auth { reason: format!("invalid hmac hex: {e}") })?;
    Ok(mac.verify_slice(&expected).is_ok())
}
