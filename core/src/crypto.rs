//! At-rest protection for stored provider keys.
//!
//! Payloads are AES-256-GCM sealed and stored as base64 of
//! `iv (12 bytes) || tag (16 bytes) || ciphertext`.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD as B64_ENGINE;
use base64::Engine;
use sha2::{Digest, Sha256};

const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;

pub struct SecretCipher {
    cipher: Aes256Gcm,
}

impl SecretCipher {
    /// A 64-character hex string is used as the raw key; anything else is
    /// hashed with SHA-256.
    pub fn from_passphrase(raw: &str) -> Self {
        let mut key = [0u8; 32];
        if raw.len() != 64 || hex::decode_to_slice(raw, &mut key).is_err() {
            key.copy_from_slice(&Sha256::digest(raw.as_bytes()));
        }
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key)),
        }
    }

    pub fn encrypt(&self, plain: &str) -> Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = self
            .cipher
            .encrypt(&nonce, plain.as_bytes())
            .map_err(|_| anyhow!("failed to encrypt secret"))?;
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);

        let mut out = Vec::with_capacity(IV_LEN + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(tag);
        out.extend_from_slice(ciphertext);
        Ok(B64_ENGINE.encode(out))
    }

    pub fn decrypt(&self, payload: &str) -> Result<String> {
        let buf = B64_ENGINE
            .decode(payload.trim().as_bytes())
            .map_err(|_| anyhow!("stored secret is not valid base64"))?;
        if buf.len() < IV_LEN + TAG_LEN {
            return Err(anyhow!("stored secret is truncated"));
        }
        let (iv, rest) = buf.split_at(IV_LEN);
        let (tag, ciphertext) = rest.split_at(TAG_LEN);

        let mut sealed = Vec::with_capacity(rest.len());
        sealed.extend_from_slice(ciphertext);
        sealed.extend_from_slice(tag);
        let plain = self
            .cipher
            .decrypt(Nonce::from_slice(iv), sealed.as_ref())
            .map_err(|_| anyhow!("stored secret failed authentication"))?;
        String::from_utf8(plain).map_err(|_| anyhow!("stored secret was not valid UTF-8"))
    }
}
