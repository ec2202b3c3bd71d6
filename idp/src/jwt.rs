//! RS256 token issuance. Mission: sign access/refresh tokens against the
//! loaded signing key, with `kid` carried in the header so dependents know
//! which public key to verify against.

use anyhow::{Context, Result};
use chrono::Utc;
use common::claims::{Claims, TokenKind};
use jsonwebtoken::{encode, EncodingKey, Header};
use uuid::Uuid;

use crate::keys::SigningKey;
use crate::models::Account;

pub struct TokenIssuer {
    encoding_key: EncodingKey,
    kid: String,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
}

pub struct IssuedPair {
    pub access: String,
    pub refresh: String,
}

impl TokenIssuer {
    pub fn new(key: &SigningKey, access_ttl_secs: i64, refresh_ttl_secs: i64) -> Result<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_pem.as_bytes())
            .context("failed to load RSA private key for signing")?;
        Ok(TokenIssuer {
            encoding_key,
            kid: key.kid.clone(),
            access_ttl_secs,
            refresh_ttl_secs,
        })
    }

    fn sign(&self, claims: &Claims) -> Result<String> {
        let mut header = Header::new(jsonwebtoken::Algorithm::RS256);
        header.kid = Some(self.kid.clone());
        encode(&header, claims, &self.encoding_key).context("failed to sign token")
    }

    pub fn issue_pair(&self, account: &Account) -> Result<IssuedPair> {
        let now = Utc::now().timestamp();

        let access_claims = Claims {
            sub: account.id.to_string(),
            username: account.username.clone(),
            iat: now,
            exp: now + self.access_ttl_secs,
            kind: TokenKind::Access,
            ver: account.token_version,
            jti: Uuid::new_v4().to_string(),
            is_admin: account.is_admin,
        };

        let refresh_claims = Claims {
            sub: account.id.to_string(),
            username: account.username.clone(),
            iat: now,
            exp: now + self.refresh_ttl_secs,
            kind: TokenKind::Refresh,
            ver: account.token_version,
            jti: Uuid::new_v4().to_string(),
            is_admin: account.is_admin,
        };

        Ok(IssuedPair {
            access: self.sign(&access_claims)?,
            refresh: self.sign(&refresh_claims)?,
        })
    }

    /// Re-issues just the access token, keyed off a trusted refresh claim set.
    pub fn issue_access_from_refresh(&self, refresh_claims: &Claims) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: refresh_claims.sub.clone(),
            username: refresh_claims.username.clone(),
            iat: now,
            exp: now + self.access_ttl_secs,
            kind: TokenKind::Access,
            ver: refresh_claims.ver,
            jti: Uuid::new_v4().to_string(),
            is_admin: refresh_claims.is_admin,
        };
        self.sign(&claims)
    }

    pub fn issue_refresh_from_refresh(&self, refresh_claims: &Claims) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: refresh_claims.sub.clone(),
            username: refresh_claims.username.clone(),
            iat: now,
            exp: now + self.refresh_ttl_secs,
            kind: TokenKind::Refresh,
            ver: refresh_claims.ver,
            jti: Uuid::new_v4().to_string(),
            is_admin: refresh_claims.is_admin,
        };
        self.sign(&claims)
    }
}

/// Decodes and validates a token against this process's own public key.
/// `alg` is pinned to RS256 by `Validation::new`; jsonwebtoken rejects any
/// other algorithm (including `none`) in the header unconditionally.
pub fn decode_with_public_key(token: &str, public_pem: &str) -> Result<Claims> {
    use jsonwebtoken::{decode, DecodingKey, Validation};
    let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())
        .context("failed to load RSA public key for verification")?;
    let mut validation = Validation::new(jsonwebtoken::Algorithm::RS256);
    validation.validate_exp = true;
    let data = decode::<Claims>(token, &decoding_key, &validation).context("token invalid")?;
    Ok(data.claims)
}

/// Decodes a token signed by this process's own key without validating exp,
/// used only in tests to inspect claims shape end to end.
#[cfg(test)]
pub fn unsafe_decode_for_test(token: &str, public_pem: &str) -> Result<Claims> {
    use jsonwebtoken::{decode, DecodingKey, Validation};
    let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())?;
    let mut validation = Validation::new(jsonwebtoken::Algorithm::RS256);
    validation.validate_exp = false;
    Ok(decode::<Claims>(token, &decoding_key, &validation)?.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc as ChronoUtc;

    fn test_account() -> Account {
        Account {
            id: 7,
            username: "alice".to_string(),
            email: "a@x".to_string(),
            password_hash: "irrelevant".to_string(),
            is_active: true,
            is_admin: false,
            token_version: 1,
            created_at: ChronoUtc::now(),
        }
    }

    #[test]
    fn issues_and_round_trips_claims() {
        let key = crate::keys::load_or_generate(
            tempfile::TempDir::new().unwrap().path().to_str().unwrap(),
        )
        .unwrap();
        let issuer = TokenIssuer::new(&key, 900, 86_400).unwrap();
        let account = test_account();
        let pair = issuer.issue_pair(&account).unwrap();

        let claims = unsafe_decode_for_test(&pair.access, &key.public_pem).unwrap();
        assert_eq!(claims.sub, "7");
        assert_eq!(claims.username, "alice");
        assert!(matches!(claims.kind, TokenKind::Access));
    }
}
