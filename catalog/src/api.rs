//! Public HTTP surface: paginated/searched product list, get-by-id,
//! admin-gated create/update/delete.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post, put},
    Json, Router,
};
use common::error::AppError;
use common::verify::TokenVerifier;

use crate::models::{CreateProductRequest, ListQuery, Product, ProductListResponse, UpdateProductRequest};
use crate::store::ProductStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ProductStore>,
    pub verifier: Arc<TokenVerifier>,
}

#[derive(Debug, Clone)]
pub struct AuthenticatedCaller {
    pub account_id: i64,
    pub is_admin: bool,
}

pub fn router(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/products", post(create_product))
        .route("/products/:id", put(update_product))
        .route("/products/:id", delete(delete_product))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .route("/products", get(list_products))
        .route("/products/:id", get(get_product))
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

async fn list_products(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Result<Json<ProductListResponse>, AppError> {
    let page = q.page.unwrap_or(1).max(1);
    let products = state.store.list(q.search.as_deref(), page)?;
    Ok(Json(ProductListResponse {
        products,
        page,
        page_size: crate::models::PAGE_SIZE,
    }))
}

async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Product>, AppError> {
    state
        .store
        .get_by_id(id)?
        .filter(|p| p.is_active)
        .map(Json)
        .ok_or(AppError::NotFound {
            resource: "product",
            id: id.to_string(),
        })
}

async fn create_product(
    State(state): State<AppState>,
    Json(body): Json<CreateProductRequest>,
) -> Result<Json<Product>, AppError> {
    if body.name.trim().is_empty() {
        return Err(AppError::InputInvalid("name is required".to_string()));
    }
    if body.inventory_count < 0 {
        return Err(AppError::InputInvalid(
            "inventory_count must be non-negative".to_string(),
        ));
    }
    Ok(Json(state.store.create(&body)?))
}

async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateProductRequest>,
) -> Result<Json<Product>, AppError> {
    state
        .store
        .update(id, &body)?
        .map(Json)
        .ok_or(AppError::NotFound {
            resource: "product",
            id: id.to_string(),
        })
}

async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    let deleted = state.store.delete(id)?;
    if !deleted {
        return Err(AppError::NotFound {
            resource: "product",
            id: id.to_string(),
        });
    }
    Ok(Json(serde_json::json!({ "deleted": true })))
}
