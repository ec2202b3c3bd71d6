//! Order creation: validate input, confirm the caller and every product with
//! their owning services, check availability, total the order, then persist
//! everything in a single local transaction. Nothing is written until every
//! upstream dependency has agreed the order can proceed.

use std::collections::HashMap;
use std::sync::Arc;

use common::{AppError, Money};

use crate::crypto::FieldCipher;
use crate::models::{CreateOrderRequest, Order};
use crate::rpc_client::{CatalogClient, IdpClient, RpcError};
use crate::store::{NewOrderLine, OrderStore};

impl From<RpcError> for AppError {
    fn from(e: RpcError) -> Self {
        AppError::DependencyUnavailable(e.to_string())
    }
}

pub struct OrderService {
    store: Arc<OrderStore>,
    cipher: Arc<FieldCipher>,
    idp: Arc<IdpClient>,
    catalog: Arc<CatalogClient>,
}

impl OrderService {
    pub fn new(
        store: Arc<OrderStore>,
        cipher: Arc<FieldCipher>,
        idp: Arc<IdpClient>,
        catalog: Arc<CatalogClient>,
    ) -> Self {
        OrderService {
            store,
            cipher,
            idp,
            catalog,
        }
    }

    pub async fn create_order(
        &self,
        owner_account_id: i64,
        request: CreateOrderRequest,
    ) -> Result<Order, AppError> {
        if request.items.is_empty() {
            return Err(AppError::InputInvalid("an order must contain at least one item".into()));
        }
        for item in &request.items {
            if item.quantity <= 0 {
                return Err(AppError::InputInvalid(format!(
                    "quantity for product {} must be positive",
                    item.product_id
                )));
            }
        }

        // Merge duplicate product ids by summing quantities so a client that
        // lists the same product twice gets one line, not two.
        let mut merged: HashMap<i64, i32> = HashMap::new();
        let mut order_seen = Vec::new();
        for item in &request.items {
            let entry = merged.entry(item.product_id).or_insert_with(|| {
                order_seen.push(item.product_id);
                0
            });
            *entry = entry.checked_add(item.quantity).ok_or_else(|| {
                AppError::InputInvalid(format!(
                    "quantity for product {} overflowed",
                    item.product_id
                ))
            })?;
        }

        let caller = self
            .idp
            .validate_user(owner_account_id)
            .await
            .map_err(AppError::from)?;
        if !caller.is_active {
            return Err(AppError::AuthInvalid);
        }

        // One GetProductInfo/CheckAvailability RPC per distinct line, issued
        // concurrently, so each product's call is independently retried and
        // counted by its own circuit breaker rather than failing the whole
        // order as one unit.
        let product_info_results = futures_util::future::join_all(
            order_seen.iter().map(|id| self.catalog.get_product_info(*id)),
        )
        .await;

        let mut by_id = HashMap::new();
        for (id, result) in order_seen.iter().zip(product_info_results) {
            let resp = result.map_err(AppError::from)?;
            match resp.product {
                Some(product) if resp.found => {
                    by_id.insert(*id, product);
                }
                _ => {
                    return Err(AppError::NotFound {
                        resource: "product",
                        id: id.to_string(),
                    });
                }
            }
        }

        let availability_results = futures_util::future::join_all(
            order_seen
                .iter()
                .map(|id| self.catalog.check_availability(*id, merged[id])),
        )
        .await;

        for (id, result) in order_seen.iter().zip(availability_results) {
            let resp = result.map_err(AppError::from)?;
            if !resp.available {
                return Err(AppError::InsufficientInventory {
                    product_id: *id,
                    available: resp.current_inventory,
                });
            }
        }

        let mut lines = Vec::with_capacity(order_seen.len());
        let mut line_totals = Vec::with_capacity(order_seen.len());
        for id in &order_seen {
            let info = &by_id[id];
            let quantity = merged[id];
            let line_total = info
                .unit_price
                .checked_mul_qty(quantity as i64)
                .ok_or_else(|| AppError::Internal("order total overflowed".into()))?;
            line_totals.push(line_total);
            lines.push(NewOrderLine {
                product_id: *id,
                quantity,
                price_at_purchase: info.unit_price,
            });
        }

        let total = Money::sum(line_totals.iter().copied())
            .ok_or_else(|| AppError::Internal("order total overflowed".into()))?;

        let order = self
            .store
            .create_order(&self.cipher, owner_account_id, total, &lines)
            .map_err(AppError::from)?;

        Ok(order)
    }

    pub fn get_order(&self, id: i64) -> Result<Option<Order>, AppError> {
        self.store.get_by_id(&self.cipher, id).map_err(AppError::from)
    }

    pub fn list_for_owner(&self, owner_account_id: i64, page: u32) -> Result<Vec<Order>, AppError> {
        self.store
            .list_by_owner(&self.cipher, owner_account_id, page.max(1))
            .map_err(AppError::from)
    }

    pub fn list_all(&self, page: u32) -> Result<Vec<Order>, AppError> {
        self.store.list_all(&self.cipher, page.max(1)).map_err(AppError::from)
    }
}
