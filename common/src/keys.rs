//! Shared public-key wire types for the IdP's key-distribution endpoint.
//! The IdP keeps its private key to itself; this is only what it publishes.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey};
use rsa::RsaPublicKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Wire shape of the IdP's `GET /auth/public-key` endpoint. `previous` is
/// populated only during a key-rotation grace window, carrying the key being
/// retired so dependents can still verify tokens it signed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicKeyWireResponse {
    pub public_key: String,
    pub algorithm: String,
    pub key_id: String,
    #[serde(default)]
    pub previous: Option<PreviousKey>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviousKey {
    pub public_key: String,
    pub key_id: String,
}

/// Stable key-id: SHA-256 of the DER-encoded SubjectPublicKeyInfo, base64url,
/// truncated to the first 16 bytes. Computed the same way on the IdP (at
/// generation) and here (at verification), so both sides agree without
/// exchanging the id out of band.
pub fn derive_kid_from_public_pem(pem: &str) -> Result<String> {
    let public_key = RsaPublicKey::from_public_key_pem(pem).context("invalid public key PEM")?;
    let der = public_key
        .to_public_key_der()
        .context("failed to DER-encode public key")?;
    let digest = Sha256::digest(der.as_bytes());
    Ok(URL_SAFE_NO_PAD.encode(&digest[..16]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kid_is_deterministic() {
        let mut rng = rand::thread_rng();
        let private_key = rsa::RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let public_key = RsaPublicKey::from(&private_key);
        let pem = public_key
            .to_public_key_pem(rsa::pkcs8::LineEnding::LF)
            .unwrap();

        let kid1 = derive_kid_from_public_pem(&pem).unwrap();
        let kid2 = derive_kid_from_public_pem(&pem).unwrap();
        assert_eq!(kid1, kid2);
    }
}
