//! Field-level encryption for the order owner identifier. The at-rest type
//! is always opaque bytes (nonce prefix + ciphertext + tag); the in-memory
//! type is always the plaintext account id. See the REDESIGN FLAGS note on
//! ORM-managed field encryption.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use anyhow::{Context, Result};
use rand::RngCore;

const NONCE_LEN: usize = 12;

pub struct FieldCipher {
    cipher: Aes256Gcm,
}

impl FieldCipher {
    pub fn new(key: &[u8; 32]) -> Self {
        FieldCipher {
            cipher: Aes256Gcm::new(key.into()),
        }
    }

    /// Encrypts `plaintext`, returning `nonce || ciphertext+tag` self-framed
    /// so it survives a database round-trip opaquely.
    pub fn encode(&self, plaintext: &str) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| anyhow::anyhow!("field encryption failed"))?;

        let mut framed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        framed.extend_from_slice(&nonce_bytes);
        framed.extend_from_slice(&ciphertext);
        Ok(framed)
    }

    pub fn decode(&self, framed: &[u8]) -> Result<String> {
        if framed.len() < NONCE_LEN {
            anyhow::bail!("ciphertext shorter than nonce frame");
        }
        let (nonce_bytes, ciphertext) = framed.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| anyhow::anyhow!("field decryption failed (wrong key or tampered data)"))?;

        String::from_utf8(plaintext).context("decrypted owner field was not valid UTF-8")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_under_the_same_key() {
        let key = [7u8; 32];
        let cipher = FieldCipher::new(&key);
        let encoded = cipher.encode("42").unwrap();
        assert_eq!(cipher.decode(&encoded).unwrap(), "42");
    }

    #[test]
    fn fails_under_a_different_key() {
        let cipher_a = FieldCipher::new(&[1u8; 32]);
        let cipher_b = FieldCipher::new(&[2u8; 32]);
        let encoded = cipher_a.encode("42").unwrap();
        assert!(cipher_b.decode(&encoded).is_err());
    }

    #[test]
    fn fails_on_tampered_ciphertext() {
        let cipher = FieldCipher::new(&[3u8; 32]);
        let mut encoded = cipher.encode("42").unwrap();
        let last = encoded.len() - 1;
        encoded[last] ^= 0xff;
        assert!(cipher.decode(&encoded).is_err());
    }
}
