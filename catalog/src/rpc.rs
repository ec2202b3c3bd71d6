//! Internal `/rpc/*` surface: `GetProductInfo`, `CheckAvailability`.
//! Shared-secret gated, independent of the caller's access token.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use common::rpc_types::{
    CheckAvailabilityRequest, CheckAvailabilityResponse, GetProductInfoRequest,
    GetProductInfoResponse, ProductInfo,
};

use crate::api::AppState;

pub fn rpc_router(state: AppState, rpc_secret: String) -> Router {
    Router::new()
        .route("/rpc/product-info", post(get_product_info))
        .route("/rpc/check-availability", post(check_availability))
        .route_layer(axum::middleware::from_fn_with_state(
            rpc_secret,
            require_rpc_secret,
        ))
        .with_state(state)
}

async fn require_rpc_secret(
    axum::extract::State(expected): axum::extract::State<String>,
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> Result<axum::response::Response, StatusCode> {
    let provided = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "));

    match provided {
        Some(token) if constant_time_eq(token.as_bytes(), expected.as_bytes()) => {
            Ok(next.run(req).await)
        }
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

async fn get_product_info(
    State(state): State<AppState>,
    Json(body): Json<GetProductInfoRequest>,
) -> Result<Json<GetProductInfoResponse>, StatusCode> {
    let product = state
        .store
        .get_by_id(body.product_id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .filter(|p| p.is_active);

    Ok(Json(GetProductInfoResponse {
        found: product.is_some(),
        product: product.map(|p| ProductInfo {
            product_id: p.id,
            name: p.name,
            unit_price: p.price,
            inventory_count: p.inventory_count,
            is_active: p.is_active,
        }),
    }))
}

async fn check_availability(
    State(state): State<AppState>,
    Json(body): Json<CheckAvailabilityRequest>,
) -> Result<Json<CheckAvailabilityResponse>, StatusCode> {
    let current_inventory = state
        .store
        .get_by_id(body.product_id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .filter(|p| p.is_active)
        .map(|p| p.inventory_count)
        .unwrap_or(0);

    Ok(Json(CheckAvailabilityResponse {
        available: current_inventory >= body.quantity,
        current_inventory,
    }))
}
