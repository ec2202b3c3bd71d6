//! Wire-level request/response DTOs for the internal `/rpc/*` surface between
//! services. Plain serde structs; the transport is authenticated HTTP+JSON
//! (see `retry`/`breaker` for the client side).

use serde::{Deserialize, Serialize};

use crate::money::Money;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateUserRequest {
    pub account_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateUserResponse {
    pub account_id: i64,
    pub username: String,
    pub is_active: bool,
}

/// One call per product id, per the IDL: `GetProductInfo(product_id) ->
/// (found, id, name, description, price, inventory_count, is_active, ...)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetProductInfoRequest {
    pub product_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductInfo {
    pub product_id: i64,
    pub name: String,
    pub unit_price: Money,
    pub inventory_count: i32,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetProductInfoResponse {
    pub found: bool,
    pub product: Option<ProductInfo>,
}

/// One call per line, per the IDL: `CheckAvailability(product_id, quantity)
/// -> (available, current_inventory, ...)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckAvailabilityRequest {
    pub product_id: i64,
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckAvailabilityResponse {
    pub available: bool,
    pub current_inventory: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecrementInventoryLine {
    pub product_id: i64,
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecrementInventoryRequest {
    /// Idempotency key, usually the order id, so retried RPCs don't double-decrement.
    pub order_id: i64,
    pub lines: Vec<DecrementInventoryLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecrementInventoryResponse {
    pub applied: bool,
}
