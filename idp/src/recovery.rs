//! Single-use recovery codes: generated in batches of 10, ≥128 bits of
//! entropy each, hashed with the same KDF family as passwords.

use anyhow::Result;
use base64::{engine::general_purpose::STANDARD, Engine};
use rand::RngCore;

use crate::password::PasswordHasher;

pub const BATCH_SIZE: usize = 10;
const CODE_BYTES: usize = 16; // 128 bits

pub fn generate_batch() -> Vec<String> {
    (0..BATCH_SIZE)
        .map(|_| {
            let mut bytes = [0u8; CODE_BYTES];
            rand::thread_rng().fill_bytes(&mut bytes);
            hex::encode(bytes)
        })
        .collect()
}

pub fn hash_batch(hasher: &PasswordHasher, codes: &[String]) -> Result<Vec<String>> {
    codes.iter().map(|c| hasher.hash(c)).collect()
}

/// Builds the downloadable text artifact for a batch of plaintext codes.
pub fn encode_download(codes: &[String]) -> String {
    let text = codes.join("\n");
    STANDARD.encode(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_has_ten_unique_high_entropy_codes() {
        let batch = generate_batch();
        assert_eq!(batch.len(), BATCH_SIZE);
        let unique: std::collections::HashSet<_> = batch.iter().collect();
        assert_eq!(unique.len(), BATCH_SIZE);
        for code in &batch {
            assert_eq!(code.len(), CODE_BYTES * 2);
        }
    }

    #[test]
    fn download_artifact_round_trips() {
        let batch = generate_batch();
        let encoded = encode_download(&batch);
        let decoded = STANDARD.decode(encoded).unwrap();
        let text = String::from_utf8(decoded).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines, batch);
    }
}
