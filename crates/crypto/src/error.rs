//! Typed error type for the crypto crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    /// No key material configured and the process runs in production mode.
    #[error("encryption key is not configured")]
    KeyMissing,

    /// Key material could not be turned into a 32-byte key.
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    /// GCM authentication tag mismatch — the token was tampered with or
    /// encrypted under a different key.
    #[error("ciphertext authentication failed")]
    AuthFailed,

    /// The token is not base64, is too short to contain IV and tag, or the
    /// decrypted plaintext is not what the caller asked for.
    #[error("malformed ciphertext token: {0}")]
    Malformed(String),
}
