//! Access-token verification shared by every service that sits behind the
//! IdP: acquires the IdP's public key at startup (filesystem first, HTTP
//! poll fallback), caches it by `kid`, and refetches once on an unknown
//! `kid` before giving up. See spec §4.4.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::{decode, DecodingKey, Validation};
use parking_lot::RwLock;

use crate::claims::{Claims, TokenKind};
use crate::keys::PublicKeyWireResponse;

struct CachedKey {
    decoding_key: DecodingKey,
}

struct Cache {
    keys: HashMap<String, CachedKey>,
    last_refresh: Option<Instant>,
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("token signature or claims invalid")]
    Invalid,
    #[error("token expired")]
    Expired,
    #[error("unknown signing key")]
    UnknownKey,
    #[error("key provider unavailable: {0}")]
    KeyProviderUnavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("no verifying key available within {0:?}")]
    Timeout(Duration),
    #[error("fetched key did not parse: {0}")]
    Unparseable(String),
}

/// Fetches and caches the IdP's public keys, verifying bearer tokens against
/// them. One instance is shared (behind an `Arc`) by the whole process.
pub struct TokenVerifier {
    key_endpoint: String,
    http: reqwest::Client,
    cache: Arc<RwLock<Cache>>,
    min_refresh_interval: Duration,
}

impl TokenVerifier {
    pub fn new(key_endpoint: impl Into<String>) -> Self {
        TokenVerifier {
            key_endpoint: key_endpoint.into(),
            http: reqwest::Client::new(),
            cache: Arc::new(RwLock::new(Cache {
                keys: HashMap::new(),
                last_refresh: None,
            })),
            min_refresh_interval: Duration::from_secs(5),
        }
    }

    fn insert(&self, kid: &str, public_key_pem: &str) -> Result<(), VerifyError> {
        let decoding_key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
            .map_err(|_| VerifyError::Invalid)?;
        self.cache
            .write()
            .keys
            .insert(kid.to_string(), CachedKey { decoding_key });
        Ok(())
    }

    /// Startup key acquisition per §4.4: try `filesystem_path` first (the
    /// IdP's published PEM on a shared volume); if absent or unparseable,
    /// poll the HTTP key endpoint with bounded backoff until a key is
    /// obtained or `timeout` elapses.
    pub async fn bootstrap(
        &self,
        filesystem_path: Option<&str>,
        timeout: Duration,
    ) -> Result<(), BootstrapError> {
        if let Some(path) = filesystem_path {
            if let Ok(pem) = std::fs::read_to_string(Path::new(path)) {
                if let Ok(kid) = crate::keys::derive_kid_from_public_pem(&pem) {
                    if self.insert(&kid, &pem).is_ok() {
                        self.cache.write().last_refresh = Some(Instant::now());
                        tracing::info!(path, "loaded verifying key from shared filesystem path");
                        return Ok(());
                    }
                }
            }
        }

        let deadline = Instant::now() + timeout;
        let mut delay = Duration::from_millis(250);
        loop {
            match self.refresh_unconditionally().await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    if Instant::now() >= deadline {
                        return Err(BootstrapError::Timeout(timeout));
                    }
                    tracing::warn!(error = %e, "verifying key not yet available, retrying");
                    tokio::time::sleep(delay.min(deadline.saturating_duration_since(Instant::now())))
                        .await;
                    delay = (delay * 2).min(Duration::from_secs(5));
                }
            }
        }
    }

    async fn refresh_unconditionally(&self) -> Result<(), VerifyError> {
        let resp = self
            .http
            .get(&self.key_endpoint)
            .send()
            .await
            .map_err(|e| VerifyError::KeyProviderUnavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| VerifyError::KeyProviderUnavailable(e.to_string()))?
            .json::<PublicKeyWireResponse>()
            .await
            .map_err(|e| VerifyError::KeyProviderUnavailable(e.to_string()))?;

        self.insert(&resp.key_id, &resp.public_key)?;
        if let Some(previous) = resp.previous {
            self.insert(&previous.key_id, &previous.public_key)?;
        }
        self.cache.write().last_refresh = Some(Instant::now());
        Ok(())
    }

    async fn refresh(&self) -> Result<(), VerifyError> {
        {
            let cache = self.cache.read();
            if let Some(last) = cache.last_refresh {
                if last.elapsed() < self.min_refresh_interval {
                    return Ok(());
                }
            }
        }
        self.refresh_unconditionally().await
    }

    fn cached(&self, kid: &str) -> Option<DecodingKey> {
        let cache = self.cache.read();
        cache.keys.get(kid).map(|k| k.decoding_key.clone())
    }

    /// Verifies a RS256 access token, refetching keys once if `kid` is unknown.
    pub async fn verify(&self, token: &str) -> Result<Claims, VerifyError> {
        let header = jsonwebtoken::decode_header(token).map_err(|_| VerifyError::Invalid)?;
        let kid = header.kid.ok_or(VerifyError::Invalid)?;

        let decoding_key = match self.cached(&kid) {
            Some(k) => k,
            None => {
                self.refresh().await?;
                self.cached(&kid).ok_or(VerifyError::UnknownKey)?
            }
        };

        let mut validation = Validation::new(jsonwebtoken::Algorithm::RS256);
        validation.validate_exp = true;

        let data = decode::<Claims>(token, &decoding_key, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => VerifyError::Expired,
                _ => VerifyError::Invalid,
            }
        })?;

        // Resource endpoints only ever accept access tokens; a refresh token
        // is a long-lived credential scoped to `/auth/refresh` alone.
        if !matches!(data.claims.kind, TokenKind::Access) {
            return Err(VerifyError::Invalid);
        }

        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn bootstrap_times_out_without_a_key_source() {
        let verifier = TokenVerifier::new("http://127.0.0.1:1/auth/public-key");
        let result = verifier.bootstrap(None, Duration::from_millis(300)).await;
        assert!(matches!(result, Err(BootstrapError::Timeout(_))));
    }

    #[tokio::test]
    async fn bootstrap_prefers_filesystem_path() {
        let mut rng = rand::thread_rng();
        let private_key = rsa::RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let public_key = rsa::RsaPublicKey::from(&private_key);
        let pem = rsa::pkcs8::EncodePublicKey::to_public_key_pem(
            &public_key,
            rsa::pkcs8::LineEnding::LF,
        )
        .unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(pem.as_bytes()).unwrap();

        let verifier = TokenVerifier::new("http://127.0.0.1:1/auth/public-key");
        verifier
            .bootstrap(Some(file.path().to_str().unwrap()), Duration::from_secs(1))
            .await
            .unwrap();

        let kid = crate::keys::derive_kid_from_public_pem(&pem).unwrap();
        assert!(verifier.cached(&kid).is_some());
    }

    fn signed_token(kind: TokenKind) -> (TokenVerifier, String) {
        let mut rng = rand::thread_rng();
        let private_key = rsa::RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let public_key = rsa::RsaPublicKey::from(&private_key);
        let public_pem = rsa::pkcs8::EncodePublicKey::to_public_key_pem(
            &public_key,
            rsa::pkcs8::LineEnding::LF,
        )
        .unwrap();
        let private_pem = rsa::pkcs1::EncodeRsaPrivateKey::to_pkcs1_pem(
            &private_key,
            rsa::pkcs8::LineEnding::LF,
        )
        .unwrap();

        let kid = crate::keys::derive_kid_from_public_pem(&public_pem).unwrap();
        let verifier = TokenVerifier::new("http://127.0.0.1:1/auth/public-key");
        verifier.insert(&kid, &public_pem).unwrap();

        let now = unix_now();
        let claims = Claims {
            sub: "1".to_string(),
            username: "alice".to_string(),
            iat: now,
            exp: now + 3600,
            kind,
            ver: 0,
            jti: "test".to_string(),
            is_admin: false,
        };
        let mut header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256);
        header.kid = Some(kid);
        let encoding_key =
            jsonwebtoken::EncodingKey::from_rsa_pem(private_pem.as_bytes()).unwrap();
        let token = jsonwebtoken::encode(&header, &claims, &encoding_key).unwrap();

        (verifier, token)
    }

    fn unix_now() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64
    }

    #[tokio::test]
    async fn accepts_an_access_token() {
        let (verifier, token) = signed_token(TokenKind::Access);
        assert!(verifier.verify(&token).await.is_ok());
    }

    #[tokio::test]
    async fn rejects_a_refresh_token_presented_as_a_bearer_credential() {
        let (verifier, token) = signed_token(TokenKind::Refresh);
        assert!(matches!(verifier.verify(&token).await, Err(VerifyError::Invalid)));
    }
}
