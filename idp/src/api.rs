//! Public HTTP surface. Mission: register/login/2FA endpoints, modeled on
//! the shape of a typical `AuthState` + router pair, generalized to the
//! full account/2FA/token-refresh flow.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use common::claims::TokenKind;
use common::error::AppError;

use crate::config::Config;
use crate::jwt::TokenIssuer;
use crate::keys::SigningKey;
use crate::models::*;
use crate::password::PasswordHasher;
use crate::recovery;
use crate::store::AccountStore;
use crate::totp;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<AccountStore>,
    pub hasher: Arc<PasswordHasher>,
    pub issuer: Arc<TokenIssuer>,
    pub signing_key: Arc<SigningKey>,
    pub config: Arc<Config>,
}

pub fn public_router(state: AppState) -> Router {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/token", post(obtain_token))
        .route("/auth/verify-2fa", post(verify_two_factor))
        .route("/auth/refresh", post(refresh))
        .route("/auth/public-key", get(public_key))
        .with_state(state)
}

pub fn protected_router(state: AppState) -> Router {
    Router::new()
        .route("/auth/2fa/setup", post(setup_two_factor))
        .route("/auth/2fa/verify-setup", post(verify_two_factor_setup))
        .route("/auth/2fa/status", get(two_factor_status))
        .route("/auth/2fa/disable", post(disable_two_factor))
        .route("/auth/2fa/regenerate", post(regenerate_recovery_codes))
        .route("/auth/2fa/download", post(download_recovery_codes))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}

/// Caller identity extracted from a verified access token.
#[derive(Debug, Clone)]
pub struct AuthenticatedCaller {
    pub account_id: i64,
    pub username: String,
    pub is_admin: bool,
}

async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .ok_or(AppError::AuthMissing)?;

    let claims = crate::jwt::decode_with_public_key(token, &state.signing_key.public_pem)
        .map_err(|_| AppError::AuthInvalid)?;

    if !matches!(claims.kind, TokenKind::Access) {
        return Err(AppError::AuthInvalid);
    }

    let account_id = claims.account_id().map_err(|_| AppError::AuthInvalid)?;
    let account = state
        .store
        .get_by_id(account_id)?
        .ok_or(AppError::AuthInvalid)?;

    if account.token_version != claims.ver || !account.is_active {
        return Err(AppError::AuthInvalid);
    }

    req.extensions_mut().insert(AuthenticatedCaller {
        account_id: account.id,
        username: account.username,
        is_admin: account.is_admin,
    });

    Ok(next.run(req).await)
}

fn extract_caller(req: &Request) -> Result<&AuthenticatedCaller, AppError> {
    req.extensions()
        .get::<AuthenticatedCaller>()
        .ok_or(AppError::AuthMissing)
}

async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<Json<AccountProjection>, AppError> {
    if body.username.trim().is_empty() || body.email.trim().is_empty() {
        return Err(AppError::InputInvalid(
            "username and email are required".to_string(),
        ));
    }
    if body.password.len() < 8 {
        return Err(AppError::InputInvalid(
            "password must be at least 8 characters".to_string(),
        ));
    }
    if state
        .store
        .username_or_email_taken(&body.username, &body.email)?
    {
        return Err(AppError::ConflictState(
            "username or email already registered".to_string(),
        ));
    }

    let password_hash = state.hasher.hash(&body.password)?;
    let account = state
        .store
        .create_account(&body.username, &body.email, &password_hash)?;

    Ok(Json(AccountProjection::from(&account)))
}

async fn obtain_token(
    State(state): State<AppState>,
    Json(body): Json<ObtainTokenRequest>,
) -> Result<Json<ObtainTokenResponse>, AppError> {
    let account = state.store.get_by_username(&body.username)?;

    let password_ok = state
        .hasher
        .verify(&body.password, account.as_ref().map(|a| a.password_hash.as_str()))?;

    if !password_ok {
        return Err(AppError::AuthInvalid);
    }
    let account = account.ok_or(AppError::AuthInvalid)?;

    if !account.is_active {
        return Err(AppError::AuthInvalid);
    }

    let second_factor = state.store.get_second_factor(account.id)?;
    if let Some(sf) = second_factor {
        if sf.confirmed {
            return Ok(Json(ObtainTokenResponse::RequiresTwoFactor {
                requires_2fa: true,
                username: account.username,
            }));
        }
    }

    let pair = state.issuer.issue_pair(&account)?;
    Ok(Json(ObtainTokenResponse::Tokens {
        access: pair.access,
        refresh: pair.refresh,
        user: AccountProjection::from(&account),
    }))
}

async fn verify_two_factor(
    State(state): State<AppState>,
    Json(body): Json<VerifyTwoFactorRequest>,
) -> Result<Json<TokenPairResponse>, AppError> {
    let account = state
        .store
        .get_by_username(&body.username)?
        .ok_or(AppError::TwoFactorInvalid)?;

    let sf = state
        .store
        .get_second_factor(account.id)?
        .filter(|sf| sf.confirmed)
        .ok_or(AppError::TwoFactorInvalid)?;

    let now = chrono::Utc::now().timestamp();

    if let Some(step) = totp::verify_totp(&sf.totp_secret, &body.code, now, sf.last_verified_step)
    {
        if !state.store.record_verified_step(account.id, step)? {
            return Err(AppError::TwoFactorInvalid);
        }
    } else {
        let code_hash_candidates = state.store.list_recovery_codes(account.id)?;
        let mut used_recovery = false;
        for candidate in code_hash_candidates.iter().filter(|c| !c.used) {
            if state
                .hasher
                .verify(&body.code, Some(&candidate.code_hash))?
            {
                if !state
                    .store
                    .mark_recovery_code_used(account.id, &candidate.code_hash)?
                {
                    return Err(AppError::TwoFactorInvalid);
                }
                used_recovery = true;
                break;
            }
        }
        if !used_recovery {
            return Err(AppError::TwoFactorInvalid);
        }
    }

    let pair = state.issuer.issue_pair(&account)?;
    Ok(Json(TokenPairResponse {
        access: pair.access,
        refresh: pair.refresh,
        user: AccountProjection::from(&account),
    }))
}

async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>, AppError> {
    let claims = crate::jwt::decode_with_public_key(&body.refresh, &state.signing_key.public_pem)
        .map_err(|_| AppError::AuthInvalid)?;

    if !matches!(claims.kind, TokenKind::Refresh) {
        return Err(AppError::AuthInvalid);
    }

    let account_id = claims.account_id().map_err(|_| AppError::AuthInvalid)?;
    let account = state
        .store
        .get_by_id(account_id)?
        .ok_or(AppError::AuthInvalid)?;

    if account.token_version != claims.ver || !account.is_active {
        return Err(AppError::AuthInvalid);
    }

    let access = state.issuer.issue_access_from_refresh(&claims)?;
    let new_refresh = state.issuer.issue_refresh_from_refresh(&claims)?;

    Ok(Json(RefreshResponse {
        access,
        refresh: new_refresh,
    }))
}

async fn public_key(State(state): State<AppState>) -> Json<common::keys::PublicKeyWireResponse> {
    Json(common::keys::PublicKeyWireResponse {
        public_key: state.signing_key.public_pem.clone(),
        algorithm: "RS256".to_string(),
        key_id: state.signing_key.kid.clone(),
        previous: None,
    })
}

async fn setup_two_factor(
    State(state): State<AppState>,
    req: Request,
) -> Result<Json<TwoFactorSetupResponse>, AppError> {
    let caller = extract_caller(&req)?.clone();

    let secret = totp::generate_secret();
    state.store.upsert_second_factor(caller.account_id, &secret)?;

    let codes = recovery::generate_batch();
    let hashed = recovery::hash_batch(&state.hasher, &codes)?;
    state
        .store
        .replace_recovery_codes(caller.account_id, &hashed)?;

    let uri = totp::provisioning_uri("idp", &caller.username, &secret);

    Ok(Json(TwoFactorSetupResponse {
        secret,
        provisioning_uri: uri,
        recovery_codes: codes,
    }))
}

async fn verify_two_factor_setup(
    State(state): State<AppState>,
    req: Request,
) -> Result<Json<serde_json::Value>, AppError> {
    let caller = extract_caller(&req)?.clone();
    let body: TwoFactorVerifySetupRequest = extract_json(req).await?;

    let sf = state
        .store
        .get_second_factor(caller.account_id)?
        .ok_or(AppError::ConflictState("no second factor pending setup".to_string()))?;

    let now = chrono::Utc::now().timestamp();
    let step = totp::verify_totp(&sf.totp_secret, &body.code, now, sf.last_verified_step)
        .ok_or(AppError::TwoFactorInvalid)?;

    state.store.confirm_second_factor(caller.account_id)?;
    if !state.store.record_verified_step(caller.account_id, step)? {
        return Err(AppError::TwoFactorInvalid);
    }

    Ok(Json(serde_json::json!({ "confirmed": true })))
}

async fn two_factor_status(
    State(state): State<AppState>,
    req: Request,
) -> Result<Json<TwoFactorStatusResponse>, AppError> {
    let caller = extract_caller(&req)?.clone();
    let enabled = state
        .store
        .get_second_factor(caller.account_id)?
        .map(|sf| sf.confirmed)
        .unwrap_or(false);
    Ok(Json(TwoFactorStatusResponse { enabled }))
}

async fn disable_two_factor(
    State(state): State<AppState>,
    req: Request,
) -> Result<Json<serde_json::Value>, AppError> {
    let caller = extract_caller(&req)?.clone();
    let body: PasswordConfirmRequest = extract_json(req).await?;

    let account = state
        .store
        .get_by_id(caller.account_id)?
        .ok_or(AppError::AuthInvalid)?;

    if !state
        .hasher
        .verify(&body.password, Some(&account.password_hash))?
    {
        return Err(AppError::AuthInvalid);
    }

    state.store.delete_second_factor(caller.account_id)?;
    Ok(Json(serde_json::json!({ "disabled": true })))
}

async fn regenerate_recovery_codes(
    State(state): State<AppState>,
    req: Request,
) -> Result<Json<RecoveryCodesResponse>, AppError> {
    let caller = extract_caller(&req)?.clone();
    let body: PasswordConfirmRequest = extract_json(req).await?;

    let account = state
        .store
        .get_by_id(caller.account_id)?
        .ok_or(AppError::AuthInvalid)?;

    if !state
        .hasher
        .verify(&body.password, Some(&account.password_hash))?
    {
        return Err(AppError::AuthInvalid);
    }

    let codes = recovery::generate_batch();
    let hashed = recovery::hash_batch(&state.hasher, &codes)?;
    state
        .store
        .replace_recovery_codes(caller.account_id, &hashed)?;

    Ok(Json(RecoveryCodesResponse {
        recovery_codes: codes,
    }))
}

#[derive(serde::Deserialize)]
struct DownloadRequest {
    codes: Vec<String>,
}

async fn download_recovery_codes(
    req: Request,
) -> Result<Json<RecoveryCodesDownloadResponse>, AppError> {
    extract_caller(&req)?;
    let body: DownloadRequest = extract_json(req).await?;
    Ok(Json(RecoveryCodesDownloadResponse {
        filename: "recovery-codes.txt",
        content_base64: recovery::encode_download(&body.codes),
    }))
}

/// Pulls a JSON body out of a request after middleware has already taken
/// ownership of it via `Request` extraction (can't use the `Json` extractor
/// twice, since it consumes the body).
async fn extract_json<T: serde::de::DeserializeOwned>(req: Request) -> Result<T, AppError> {
    let bytes = axum::body::to_bytes(req.into_body(), usize::MAX)
        .await
        .map_err(|e| AppError::InputInvalid(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| AppError::InputInvalid(e.to_string()))
}
