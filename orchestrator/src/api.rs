//! HTTP surface: create an order, fetch one of the caller's own orders, list
//! the caller's orders, and an admin-only listing across all owners.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use common::error::AppError;
use common::verify::TokenVerifier;

use crate::models::{CreateOrderRequest, ListQuery, Order, OrderListResponse};
use crate::order_service::OrderService;

#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<OrderService>,
    pub verifier: Arc<TokenVerifier>,
}

#[derive(Debug, Clone)]
pub struct AuthenticatedCaller {
    pub account_id: i64,
    pub is_admin: bool,
}

pub fn router(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/admin/orders", get(list_all_orders))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .route("/orders", post(create_order))
        .route("/orders", get(list_my_orders))
        .route("/orders/:id", get(get_order))
        .merge(admin_routes)
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
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
        .ok_or(AppError::AuthMissing)?
        .to_string();

    let claims = state
        .verifier
        .verify(&token)
        .await
        .map_err(|e| match e {
            common::verify::VerifyError::Expired => AppError::AuthExpired,
            _ => AppError::AuthInvalid,
        })?;

    let account_id = claims.account_id().map_err(|_| AppError::AuthInvalid)?;
    req.extensions_mut().insert(AuthenticatedCaller {
        account_id,
        is_admin: claims.is_admin,
    });

    Ok(next.run(req).await)
}

async fn require_admin(req: Request, next: Next) -> Result<Response, AppError> {
    let caller = req
        .extensions()
        .get::<AuthenticatedCaller>()
        .ok_or(AppError::AuthMissing)?;
    if !caller.is_admin {
        return Err(AppError::Forbidden);
    }
    Ok(next.run(req).await)
}

async fn create_order(
    State(state): State<AppState>,
    axum::Extension(caller): axum::Extension<AuthenticatedCaller>,
    Json(body): Json<CreateOrderRequest>,
) -> Result<Json<Order>, AppError> {
    let order = state.orders.create_order(caller.account_id, body).await?;
    Ok(Json(order))
}

async fn get_order(
    State(state): State<AppState>,
    axum::Extension(caller): axum::Extension<AuthenticatedCaller>,
    Path(id): Path<i64>,
) -> Result<Json<Order>, AppError> {
    let order = state.orders.get_order(id)?.ok_or(AppError::NotFound {
        resource: "order",
        id: id.to_string(),
    })?;
    if order.owner_account_id != caller.account_id && !caller.is_admin {
        return Err(AppError::NotFound {
            resource: "order",
            id: id.to_string(),
        });
    }
    Ok(Json(order))
}

async fn list_my_orders(
    State(state): State<AppState>,
    axum::Extension(caller): axum::Extension<AuthenticatedCaller>,
    Query(q): Query<ListQuery>,
) -> Result<Json<OrderListResponse>, AppError> {
    let page = q.page.unwrap_or(1).max(1);
    let orders = state.orders.list_for_owner(caller.account_id, page)?;
    Ok(Json(OrderListResponse {
        orders,
        page,
        page_size: crate::models::PAGE_SIZE,
    }))
}

async fn list_all_orders(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Result<Json<OrderListResponse>, AppError> {
    let page = q.page.unwrap_or(1).max(1);
    let orders = state.orders.list_all(page)?;
    Ok(Json(OrderListResponse {
        orders,
        page,
        page_size: crate::models::PAGE_SIZE,
    }))
}
