//! Account, second-factor and recovery-code types, plus the request/response
//! DTOs for the public HTTP surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct Account {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_active: bool,
    pub is_admin: bool,
    pub token_version: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SecondFactor {
    pub account_id: i64,
    pub totp_secret: String,
    pub confirmed: bool,
    pub last_verified_step: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct RecoveryCode {
    pub account_id: i64,
    pub code_hash: String,
    pub used: bool,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AccountProjection {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub is_active: bool,
}

impl From<&Account> for AccountProjection {
    fn from(a: &Account) -> Self {
        AccountProjection {
            id: a.id,
            username: a.username.clone(),
            email: a.email.clone(),
            is_active: a.is_active,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ObtainTokenRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ObtainTokenResponse {
    Tokens {
        access: String,
        refresh: String,
        user: AccountProjection,
    },
    RequiresTwoFactor {
        requires_2fa: bool,
        username: String,
    },
}

#[derive(Debug, Deserialize)]
pub struct VerifyTwoFactorRequest {
    pub username: String,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct TokenPairResponse {
    pub access: String,
    pub refresh: String,
    pub user: AccountProjection,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub access: String,
    pub refresh: String,
}

#[derive(Debug, Serialize)]
pub struct TwoFactorSetupResponse {
    pub secret: String,
    pub provisioning_uri: String,
    pub recovery_codes: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct TwoFactorVerifySetupRequest {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct TwoFactorStatusResponse {
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct PasswordConfirmRequest {
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RecoveryCodesResponse {
    pub recovery_codes: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct RecoveryCodesDownloadResponse {
    pub filename: &'static str,
    pub content_base64: String,
}
