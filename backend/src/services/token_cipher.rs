//! Encryption at rest for OAuth tokens.
//!
//! Tokens are encrypted with AES-256-GCM before they touch the database.
//! The stored form is base64(nonce || ciphertext); the 96-bit nonce is
//! generated fresh for every encryption.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::error::{AppError, Result};

const NONCE_LEN: usize = 12;

#[derive(Clone)]
pub struct TokenCipher {
    cipher: Aes256Gcm,
}

impl TokenCipher {
    /// Build a cipher from a 64-character hex key (32 bytes).
    pub fn from_hex_key(hex_key: &str) -> Result<Self> {
        let key_bytes = hex::decode(hex_key)
            .map_err(|_| AppError::Config("TOKEN_ENCRYPTION_KEY is not valid hex".into()))?;
        if key_bytes.len() != 32 {
            return Err(AppError::Config(
                "TOKEN_ENCRYPTION_KEY must decode to 32 bytes".into(),
            ));
        }
        let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| AppError::Internal("token encryption failed".into()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(out))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String> {
        let raw = BASE64
            .decode(encoded)
            .map_err(|_| AppError::Internal("stored token is not valid base64".into()))?;
        if raw.len() <= NONCE_LEN {
            return Err(AppError::Internal("stored token is truncated".into()));
        }
        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| AppError::Internal("token decryption failed".into()))?;
        String::from_utf8(plaintext)
            .map_err(|_| AppError::Internal("decrypted token is not valid UTF-8".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    #[test]
    fn round_trip() {
        let cipher = TokenCipher::from_hex_key(TEST_KEY).unwrap();
        let encrypted = cipher.encrypt("access-token-value").unwrap();
        assert_ne!(encrypted, "access-token-value");
        assert_eq!(cipher.decrypt(&encrypted).unwrap(), "access-token-value");
    }

    #[test]
    fn fresh_nonce_per_encryption() {
        let cipher = TokenCipher::from_hex_key(TEST_KEY).unwrap();
        let a = cipher.encrypt("same").unwrap();
        let b = cipher.encrypt("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_short_key() {
        assert!(TokenCipher::from_hex_key("abcd").is_err());
    }

    #[test]
    fn rejects_non_hex_key() {
        let bad = "z".repeat(64);
        assert!(TokenCipher::from_hex_key(&bad).is_err());
    }

    #[test]
    fn rejects_tampered_ciphertext() {
        let cipher = TokenCipher::from_hex_key(TEST_KEY).unwrap();
        let encrypted = cipher.encrypt("secret").unwrap();
        let mut raw = BASE64.decode(&encrypted).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xff;
        let tampered = BASE64.encode(raw);
        assert!(cipher.decrypt(&tampered).is_err());
    }

    #[test]
    fn rejects_garbage_input() {
        let cipher = TokenCipher::from_hex_key(TEST_KEY).unwrap();
        assert!(cipher.decrypt("not base64 !!!").is_err());
        assert!(cipher.decrypt("YWJj").is_err()); // too short
    }
}
