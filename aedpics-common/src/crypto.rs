//! Field-level encryption for personal data (user phone numbers)
//!
//! ChaCha20-Poly1305 with a key derived from the configured secret by SHA-256.
//! Stored form: base64(nonce || ciphertext).

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    ChaCha20Poly1305, Nonce,
};
use sha2::{Digest, Sha256};

use crate::{Error, Result};

const NONCE_LEN: usize = 12;

#[derive(Clone)]
pub struct FieldCipher {
    cipher: ChaCha20Poly1305,
}

impl FieldCipher {
    pub fn new(secret: &str) -> Self {
        let key = Sha256::digest(secret.as_bytes());
        Self {
            cipher: ChaCha20Poly1305::new(&key),
        }
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| Error::Crypto(format!("encrypt failed: {}", e)))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(out))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String> {
        let raw = STANDARD
            .decode(encoded)
            .map_err(|e| Error::Crypto(format!("invalid base64: {}", e)))?;
        if raw.len() <= NONCE_LEN {
            return Err(Error::Crypto("ciphertext too short".to_string()));
        }
        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| Error::Crypto(format!("decrypt failed: {}", e)))?;
        String::from_utf8(plaintext).map_err(|e| Error::Crypto(e.to_string()))
    }
}

impl std::fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FieldCipher(..)")
    }
}
