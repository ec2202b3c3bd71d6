//! Internal `/rpc/*` surface: `ValidateUser`, gated by a shared-secret
//! bearer credential rather than a caller's access token.

use axum::{
    extract::State,
    http::StatusCode,
    routing::post,
    Json, Router,
};
use common::rpc_types::{ValidateUserRequest, ValidateUserResponse};

use crate::api::AppState;

pub fn rpc_router(state: AppState) -> Router {
    Router::new()
        .route("/rpc/validate-user", post(validate_user))
        .with_state(state)
}

async fn validate_user(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Json(body): Json<ValidateUserRequest>,
) -> Result<Json<ValidateUserResponse>, StatusCode> {
    require_rpc_secret(&headers, &state.config.internal_rpc_secret)?;

    let account = state
        .store
        .get_by_id(body.account_id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    match account {
        Some(a) => Ok(Json(ValidateUserResponse {
            account_id: a.id,
            username: a.username,
            is_active: a.is_active,
        })),
        None => Err(StatusCode::NOT_FOUND),
    }
}

pub fn require_rpc_secret(headers: &axum::http::HeaderMap, expected: &str) -> Result<(), StatusCode> {
    let provided = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "));

    match provided {
        Some(token) if constant_time_eq(token.as_bytes(), expected.as_bytes()) => Ok(()),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
