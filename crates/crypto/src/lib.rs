//! `crypto` crate — authenticated encryption for credential blobs.
//!
//! Credentials are stored as opaque tokens of the form
//! `base64(IV[12] || tag[16] || ciphertext)`, AES-256-GCM under a single
//! process-wide key. The key comes from `FLOWGRID_ENCRYPTION_KEY`: a
//! 64-hex-character value is decoded as 32 raw bytes, anything else is
//! stretched with scrypt under a fixed salt.

pub mod error;

pub use error::CryptoError;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::RngCore;
use serde_json::Value;
use tracing::warn;

/// Environment variable holding the key material.
pub const KEY_ENV: &str = "FLOWGRID_ENCRYPTION_KEY";

const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Salt for scrypt derivation of non-hex key material. Changing this
/// invalidates every stored credential.
const KEY_SALT: &[u8] = b"flowgrid-credential-store";

/// Placeholder key material used when no key is configured outside
/// production.
const DEV_KEY_MATERIAL: &str = "flowgrid-dev-insecure-key";

// ---------------------------------------------------------------------------
// Cipher
// ---------------------------------------------------------------------------

/// A process-wide AES-256-GCM cipher over a derived 32-byte key.
#[derive(Clone)]
pub struct Cipher {
    key: [u8; 32],
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key bytes.
        f.debug_struct("Cipher").finish_non_exhaustive()
    }
}

impl Cipher {
    /// Build a cipher from raw key material.
    ///
    /// A 64-character hex string is decoded as the raw 32-byte key;
    /// anything else is treated as a passphrase and derived via scrypt
    /// (N=2^14, r=8, p=1) under [`KEY_SALT`].
    pub fn from_key_material(material: &str) -> Result<Self, CryptoError> {
        let key = if material.len() == 64 && material.bytes().all(|b| b.is_ascii_hexdigit()) {
            let bytes = hex::decode(material)
                .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
            let mut key = [0u8; 32];
            key.copy_from_slice(&bytes);
            key
        } else {
            let params = scrypt::Params::new(14, 8, 1, 32)
                .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
            let mut key = [0u8; 32];
            scrypt::scrypt(material.as_bytes(), KEY_SALT, &params, &mut key)
                .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
            key
        };

        Ok(Self { key })
    }

    /// Build a cipher from [`KEY_ENV`].
    ///
    /// # Errors
    /// [`CryptoError::KeyMissing`] when the variable is absent and
    /// `production` is true. Outside production a constant placeholder key
    /// is used instead, with a loud warning.
    pub fn from_env(production: bool) -> Result<Self, CryptoError> {
        match std::env::var(KEY_ENV) {
            Ok(material) => Self::from_key_material(&material),
            Err(_) if production => Err(CryptoError::KeyMissing),
            Err(_) => {
                warn!(
                    "{KEY_ENV} is not set — using an insecure development key. \
                     Credentials encrypted with it are NOT protected."
                );
                Self::from_key_material(DEV_KEY_MATERIAL)
            }
        }
    }

    /// Encrypt a JSON value into an opaque token.
    ///
    /// Strings encrypt their raw bytes; every other value encrypts its
    /// canonical JSON serialization.
    pub fn encrypt(&self, value: &Value) -> Result<String, CryptoError> {
        match value {
            Value::String(s) => self.encrypt_str(s),
            other => self.encrypt_str(&other.to_string()),
        }
    }

    /// Encrypt a raw string into an opaque token.
    pub fn encrypt_str(&self, plaintext: &str) -> Result<String, CryptoError> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;

        let mut iv = [0u8; IV_LEN];
        rand::rngs::OsRng.fill_bytes(&mut iv);

        // aes-gcm appends the 16-byte tag to the ciphertext; the wire
        // format wants IV || tag || ciphertext.
        let sealed = cipher
            .encrypt(Nonce::from_slice(&iv), plaintext.as_bytes())
            .map_err(|_| CryptoError::AuthFailed)?;
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);

        let mut out = Vec::with_capacity(IV_LEN + TAG_LEN + ciphertext.len());
        out.extend_from_slice(&iv);
        out.extend_from_slice(tag);
        out.extend_from_slice(ciphertext);

        Ok(BASE64.encode(out))
    }

    /// Decrypt a token produced by [`Cipher::encrypt`] back into a JSON
    /// value.
    ///
    /// # Errors
    /// [`CryptoError::AuthFailed`] on tag mismatch,
    /// [`CryptoError::Malformed`] on encoding/length errors or when the
    /// plaintext is not valid JSON.
    pub fn decrypt(&self, token: &str) -> Result<Value, CryptoError> {
        let plaintext = self.decrypt_str(token)?;
        serde_json::from_str(&plaintext)
            .map_err(|e| CryptoError::Malformed(format!("plaintext is not JSON: {e}")))
    }

    /// Decrypt a token back into the raw plaintext string.
    pub fn decrypt_str(&self, token: &str) -> Result<String, CryptoError> {
        let raw = BASE64
            .decode(token)
            .map_err(|e| CryptoError::Malformed(e.to_string()))?;

        if raw.len() < IV_LEN + TAG_LEN {
            return Err(CryptoError::Malformed(format!(
                "token too short: {} bytes",
                raw.len()
            )));
        }

        let (iv, rest) = raw.split_at(IV_LEN);
        let (tag, ciphertext) = rest.split_at(TAG_LEN);

        // Re-append the tag for the aead API.
        let mut sealed = Vec::with_capacity(ciphertext.len() + TAG_LEN);
        sealed.extend_from_slice(ciphertext);
        sealed.extend_from_slice(tag);

        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let plaintext = cipher
            .decrypt(Nonce::from_slice(iv), sealed.as_ref())
            .map_err(|_| CryptoError::AuthFailed)?;

        String::from_utf8(plaintext).map_err(|e| CryptoError::Malformed(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

/// Generate a 32-byte cryptographically random token, hex-encoded.
///
/// Used for OAuth `state` values.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cipher() -> Cipher {
        Cipher::from_key_material("test passphrase, definitely not hex").unwrap()
    }

    #[test]
    fn round_trip_preserves_json_values() {
        let c = cipher();
        let value = json!({
            "token": "abc",
            "nested": { "n": 42, "flag": true },
            "list": [1, 2, 3],
        });

        let token = c.encrypt(&value).expect("encrypt");
        let back = c.decrypt(&token).expect("decrypt");
        assert_eq!(back, value);
    }

    #[test]
    fn raw_string_round_trip() {
        let c = cipher();
        let token = c.encrypt_str("not json at all {").unwrap();
        assert_eq!(c.decrypt_str(&token).unwrap(), "not json at all {");
    }

    #[test]
    fn fresh_iv_produces_distinct_tokens() {
        let c = cipher();
        let value = json!({ "same": "plaintext" });
        let a = c.encrypt(&value).unwrap();
        let b = c.encrypt(&value).unwrap();
        assert_ne!(a, b);
        // Both still decrypt to the same value.
        assert_eq!(c.decrypt(&a).unwrap(), c.decrypt(&b).unwrap());
    }

    #[test]
    fn tampered_ciphertext_fails_authentication() {
        let c = cipher();
        let token = c.encrypt(&json!({ "token": "abc" })).unwrap();

        let mut raw = BASE64.decode(&token).unwrap();
        // Flip a bit in the ciphertext region (past IV and tag).
        let idx = IV_LEN + TAG_LEN;
        raw[idx] ^= 0x01;
        let tampered = BASE64.encode(raw);

        assert!(matches!(c.decrypt(&tampered), Err(CryptoError::AuthFailed)));
    }

    #[test]
    fn tampered_tag_fails_authentication() {
        let c = cipher();
        let token = c.encrypt(&json!({ "k": "v" })).unwrap();

        let mut raw = BASE64.decode(&token).unwrap();
        raw[IV_LEN] ^= 0xff; // first tag byte
        let tampered = BASE64.encode(raw);

        assert!(matches!(c.decrypt(&tampered), Err(CryptoError::AuthFailed)));
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        let c = cipher();
        assert!(matches!(
            c.decrypt("@@not-base64@@"),
            Err(CryptoError::Malformed(_))
        ));
        // Valid base64 but shorter than IV + tag.
        let short = BASE64.encode([0u8; 8]);
        assert!(matches!(c.decrypt(&short), Err(CryptoError::Malformed(_))));
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let a = Cipher::from_key_material("key one").unwrap();
        let b = Cipher::from_key_material("key two").unwrap();
        let token = a.encrypt(&json!({ "secret": 1 })).unwrap();
        assert!(matches!(b.decrypt(&token), Err(CryptoError::AuthFailed)));
    }

    #[test]
    fn hex_key_material_is_used_verbatim() {
        let hex_key = "00".repeat(32);
        let a = Cipher::from_key_material(&hex_key).unwrap();
        let b = Cipher::from_key_material(&hex_key).unwrap();
        // Same raw key: tokens decrypt across instances.
        let token = a.encrypt(&json!({ "x": 1 })).unwrap();
        assert_eq!(b.decrypt(&token).unwrap(), json!({ "x": 1 }));
    }

    #[test]
    fn generated_tokens_are_hex_and_unique() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert!(a.bytes().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
