use chrono::{DateTime, Utc};
use common::Money;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// The state machine of the order lifecycle: every non-terminal status
    /// can move forward one step or be cancelled; delivered/cancelled are
    /// terminal.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        if self == Delivered || self == Cancelled {
            return false;
        }
        if next == Cancelled {
            return true;
        }
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Confirmed, Processing)
                | (Processing, Shipped)
                | (Shipped, Delivered)
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderLine {
    pub product_id: i64,
    pub quantity: i32,
    pub price_at_purchase: Money,
}

#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: i64,
    pub owner_account_id: i64,
    pub total_amount: Money,
    pub status: OrderStatus,
    pub lines: Vec<OrderLine>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderLineRequest {
    pub product_id: i64,
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub items: Vec<CreateOrderLineRequest>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub page: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct OrderListResponse {
    pub orders: Vec<Order>,
    pub page: u32,
    pub page_size: u32,
}

pub const PAGE_SIZE: u32 = 20;
