//! Shared error taxonomy.
//! Mission: one discriminated error kind per failure, never swallowed into a
//! more generic one, with a stable machine-readable discriminator for clients.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

/// Abstract error kinds, independent of transport. See spec §7.
#[derive(Debug, Clone)]
pub enum AppError {
    InputInvalid(String),
    AuthMissing,
    AuthInvalid,
    AuthExpired,
    TwoFactorRequired { username: String },
    TwoFactorInvalid,
    NotFound { resource: &'static str, id: String },
    ConflictState(String),
    InsufficientInventory { product_id: i64, available: i32 },
    DependencyUnavailable(String),
    Forbidden,
    Internal(String),
}

impl AppError {
    /// Stable machine-readable discriminator, independent of the HTTP status.
    pub fn discriminator(&self) -> &'static str {
        match self {
            AppError::InputInvalid(_) => "input_invalid",
            AppError::AuthMissing => "auth_missing",
            AppError::AuthInvalid => "auth_invalid",
            AppError::AuthExpired => "auth_expired",
            AppError::TwoFactorRequired { .. } => "two_factor_required",
            AppError::TwoFactorInvalid => "two_factor_invalid",
            AppError::NotFound { .. } => "not_found",
            AppError::ConflictState(_) => "conflict_state",
            AppError::InsufficientInventory { .. } => "insufficient_inventory",
            AppError::DependencyUnavailable(_) => "dependency_unavailable",
            AppError::Forbidden => "forbidden",
            AppError::Internal(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::InputInvalid(_) => StatusCode::BAD_REQUEST,
            AppError::AuthMissing | AppError::AuthInvalid | AppError::AuthExpired => {
                StatusCode::UNAUTHORIZED
            }
            AppError::TwoFactorRequired { .. } => StatusCode::OK,
            AppError::TwoFactorInvalid => StatusCode::UNAUTHORIZED,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::ConflictState(_) => StatusCode::CONFLICT,
            AppError::InsufficientInventory { .. } => StatusCode::BAD_REQUEST,
            AppError::DependencyUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Coarse, non-enumerating message for authentication failures (spec §7).
    fn message(&self) -> String {
        match self {
            AppError::InputInvalid(m) => m.clone(),
            AppError::AuthMissing => "authentication required".to_string(),
            AppError::AuthInvalid | AppError::AuthExpired => {
                "invalid username or password".to_string()
            }
            AppError::TwoFactorRequired { .. } => "second factor required".to_string(),
            AppError::TwoFactorInvalid => "invalid or replayed code".to_string(),
            AppError::NotFound { resource, id } => format!("{resource} {id} not found"),
            AppError::ConflictState(m) => m.clone(),
            AppError::InsufficientInventory {
                product_id,
                available,
            } => format!(
                "product {product_id} has insufficient inventory (available: {available})"
            ),
            AppError::DependencyUnavailable(m) => m.clone(),
            AppError::Forbidden => "insufficient permissions".to_string(),
            AppError::Internal(_) => "internal error".to_string(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    product_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    available: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let correlation_id = if let AppError::Internal(ref detail) = self {
            let id = Uuid::new_v4();
            tracing::error!(correlation_id = %id, detail, "internal error");
            Some(id.to_string())
        } else {
            None
        };

        let (product_id, available) = match &self {
            AppError::InsufficientInventory {
                product_id,
                available,
            } => (Some(*product_id), Some(*available)),
            _ => (None, None),
        };

        let username = match &self {
            AppError::TwoFactorRequired { username } => Some(username.clone()),
            _ => None,
        };

        let body = ErrorBody {
            error: self.discriminator(),
            message: self.message(),
            product_id,
            available,
            username,
            correlation_id,
        };

        (status, Json(json!(body))).into_response()
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.discriminator(), self.message())
    }
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        AppError::Internal(e.to_string())
    }
}
