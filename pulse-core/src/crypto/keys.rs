//! RSA key loading and PKCS#1 v1.5 body encryption.
//!
//! Keys are PKCS#1 PEM files (`RSA PUBLIC KEY` / `RSA PRIVATE KEY`
//! blocks). The whole request body is encrypted as a single block, so
//! the configured key must be sized for the payload.

use std::path::Path;

use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};

use crate::error::{PulseError, Result};

/// Load an RSA public key from a PKCS#1 PEM file.
pub fn load_public_key(path: impl AsRef<Path>) -> Result<RsaPublicKey> {
    let path = path.as_ref();
    let pem = std::fs::read_to_string(path)
        .map_err(|e| PulseError::Io { path: path.to_path_buf(), source: e })?;

    RsaPublicKey::from_pkcs1_pem(&pem)
        .map_err(|e| PulseError::InvalidConfig { reason: format!("can't parse public key: {e}") })
}

/// Load an RSA private key from a PKCS#1 PEM file.
pub fn load_private_key(path: impl AsRef<Path>) -> Result<RsaPrivateKey> {
    let path = path.as_ref();
    let pem = std::fs::read_to_string(path)
        .map_err(|e| PulseError::Io { path: path.to_path_buf(), source: e })?;

    RsaPrivateKey::from_pkcs1_pem(&pem)
        .map_err(|e| PulseError::InvalidConfig { reason: format!("can't parse private key: {e}") })
}

/// Encrypt a body with the server's public key.
pub fn encrypt(key: &RsaPublicKey, body: &[u8]) -> Result<Vec<u8>> {
    let mut rng = rand::thread_rng();
    key.encrypt(&mut rng, Pkcs1v15Encrypt, body)
        .map_err(|e| PulseError::decode(format!("can't encrypt body: {e}")))
}

/// Decrypt a body with the paired private key.
pub fn decrypt(key: &RsaPrivateKey, body: &[u8]) -> Result<Vec<u8>> {
    key.decrypt(Pkcs1v15Encrypt, body)
        .map_err(|e| PulseError::decode(format!("can't decrypt body: {e}")))
}
