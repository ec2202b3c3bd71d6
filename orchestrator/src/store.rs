//! SQLite persistence for orders and lines. Order creation happens in one
//! local transaction so a partial line set never becomes visible.

use anyhow::{Context, Result};
use chrono::Utc;
use common::Money;
use rusqlite::{params, Connection, OptionalExtension};

use crate::crypto::FieldCipher;
use crate::models::{Order, OrderLine, OrderStatus};

pub struct OrderStore {
    db_path: String,
}

pub struct NewOrderLine {
    pub product_id: i64,
    pub quantity: i32,
    pub price_at_purchase: Money,
}

impl OrderStore {
    pub fn new(db_path: &str) -> Result<Self> {
        let store = OrderStore {
            db_path: db_path.to_string(),
        };
        store.init_db()?;
        Ok(store)
    }

    fn conn(&self) -> Result<Connection> {
        Connection::open(&self.db_path).context("failed to open order store")
    }

    fn init_db(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS orders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_encrypted BLOB NOT NULL,
                total_cents INTEGER NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS order_lines (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                order_id INTEGER NOT NULL,
                product_id INTEGER NOT NULL,
                quantity INTEGER NOT NULL,
                price_cents INTEGER NOT NULL,
                FOREIGN KEY (order_id) REFERENCES orders(id)
            )",
            [],
        )?;
        Ok(())
    }

    /// Creates an order and its lines atomically. `owner_account_id` is
    /// encrypted with `cipher` before it ever reaches the database.
    pub fn create_order(
        &self,
        cipher: &FieldCipher,
        owner_account_id: i64,
        total: Money,
        lines: &[NewOrderLine],
    ) -> Result<Order> {
        anyhow::ensure!(!lines.is_empty(), "an order must have at least one line");

        let owner_encrypted = cipher.encode(&owner_account_id.to_string())?;
        let now = Utc::now();

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO orders (owner_encrypted, total_cents, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![owner_encrypted, total.cents(), status_str(OrderStatus::Pending), now.to_rfc3339()],
        )?;
        let order_id = tx.last_insert_rowid();

        for line in lines {
            tx.execute(
                "INSERT INTO order_lines (order_id, product_id, quantity, price_cents)
                 VALUES (?1, ?2, ?3, ?4)",
                params![order_id, line.product_id, line.quantity, line.price_at_purchase.cents()],
            )?;
        }

        tx.commit()?;

        Ok(Order {
            id: order_id,
            owner_account_id,
            total_amount: total,
            status: OrderStatus::Pending,
            lines: lines
                .iter()
                .map(|l| OrderLine {
                    product_id: l.product_id,
                    quantity: l.quantity,
                    price_at_purchase: l.price_at_purchase,
                })
                .collect(),
            created_at: now,
            updated_at: now,
        })
    }

    fn load_lines(conn: &Connection, order_id: i64) -> Result<Vec<OrderLine>> {
        let mut stmt = conn.prepare(
            "SELECT product_id, quantity, price_cents FROM order_lines WHERE order_id = ?1",
        )?;
        let lines = stmt
            .query_map(params![order_id], |row| {
                let price_cents: i64 = row.get(2)?;
                Ok(OrderLine {
                    product_id: row.get(0)?,
                    quantity: row.get(1)?,
                    price_at_purchase: Money::from_cents(price_cents),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(lines)
    }

    fn row_to_order(cipher: &FieldCipher, conn: &Connection, row: &rusqlite::Row) -> Result<Order> {
        let id: i64 = row.get(0)?;
        let owner_encrypted: Vec<u8> = row.get(1)?;
        let total_cents: i64 = row.get(2)?;
        let status: String = row.get(3)?;
        let created_at: String = row.get(4)?;
        let updated_at: String = row.get(5)?;

        let owner_account_id: i64 = cipher
            .decode(&owner_encrypted)?
            .parse()
            .context("owner field did not decrypt to a valid account id")?;

        Ok(Order {
            id,
            owner_account_id,
            total_amount: Money::from_cents(total_cents),
            status: status_from_str(&status),
            lines: Self::load_lines(conn, id)?,
            created_at: parse_ts(&created_at),
            updated_at: parse_ts(&updated_at),
        })
    }

    pub fn get_by_id(&self, cipher: &FieldCipher, id: i64) -> Result<Option<Order>> {
        let conn = self.conn()?;
        let result = conn
            .query_row(
                "SELECT id, owner_encrypted, total_cents, status, created_at, updated_at
                 FROM orders WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, Vec<u8>>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()?;

        match result {
            None => Ok(None),
            Some((id, owner_encrypted, total_cents, status, created_at, updated_at)) => {
                let owner_account_id: i64 = cipher
                    .decode(&owner_encrypted)?
                    .parse()
                    .context("owner field did not decrypt to a valid account id")?;
                Ok(Some(Order {
                    id,
                    owner_account_id,
                    total_amount: Money::from_cents(total_cents),
                    status: status_from_str(&status),
                    lines: Self::load_lines(&conn, id)?,
                    created_at: parse_ts(&created_at),
                    updated_at: parse_ts(&updated_at),
                }))
            }
        }
    }

    pub fn list_by_owner(&self, cipher: &FieldCipher, owner_account_id: i64, page: u32) -> Result<Vec<Order>> {
        // Owner is encrypted at rest with a random nonce per row, so it cannot
        // be searched with SQL; filter after decrypting each candidate row.
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, owner_encrypted, total_cents, status, created_at, updated_at
             FROM orders ORDER BY id DESC",
        )?;
        let mut matching = Vec::new();
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let id: i64 = row.get(0)?;
            let owner_encrypted: Vec<u8> = row.get(1)?;
            let owner: i64 = match cipher.decode(&owner_encrypted).ok().and_then(|s| s.parse().ok()) {
                Some(v) => v,
                None => continue,
            };
            if owner != owner_account_id {
                continue;
            }
            let total_cents: i64 = row.get(2)?;
            let status: String = row.get(3)?;
            let created_at: String = row.get(4)?;
            let updated_at: String = row.get(5)?;
            matching.push(Order {
                id,
                owner_account_id: owner,
                total_amount: Money::from_cents(total_cents),
                status: status_from_str(&status),
                lines: Self::load_lines(&conn, id)?,
                created_at: parse_ts(&created_at),
                updated_at: parse_ts(&updated_at),
            });
        }

        let start = (page.saturating_sub(1) as usize) * crate::models::PAGE_SIZE as usize;
        Ok(matching
            .into_iter()
            .skip(start)
            .take(crate::models::PAGE_SIZE as usize)
            .collect())
    }

    pub fn list_all(&self, cipher: &FieldCipher, page: u32) -> Result<Vec<Order>> {
        let conn = self.conn()?;
        let offset = (page.saturating_sub(1) as i64) * crate::models::PAGE_SIZE as i64;
        let mut stmt = conn.prepare(
            "SELECT id, owner_encrypted, total_cents, status, created_at, updated_at
             FROM orders ORDER BY id DESC LIMIT ?1 OFFSET ?2",
        )?;
        let mut orders = Vec::new();
        let mut rows = stmt.query(params![crate::models::PAGE_SIZE as i64, offset])?;
        while let Some(row) = rows.next()? {
            orders.push(Self::row_to_order(cipher, &conn, row)?);
        }
        Ok(orders)
    }

    pub fn transition_status(&self, id: i64, next: OrderStatus) -> Result<bool> {
        let conn = self.conn()?;
        let current: Option<String> = conn
            .query_row("SELECT status FROM orders WHERE id = ?1", params![id], |r| r.get(0))
            .optional()?;
        let current = match current {
            Some(c) => status_from_str(&c),
            None => return Ok(false),
        };
        if !current.can_transition_to(next) {
            anyhow::bail!("invalid status transition: {:?} -> {:?}", current, next);
        }
        conn.execute(
            "UPDATE orders SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, status_str(next), Utc::now().to_rfc3339()],
        )?;
        Ok(true)
    }
}

fn status_str(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "pending",
        OrderStatus::Confirmed => "confirmed",
        OrderStatus::Processing => "processing",
        OrderStatus::Shipped => "shipped",
        OrderStatus::Delivered => "delivered",
        OrderStatus::Cancelled => "cancelled",
    }
}

fn status_from_str(s: &str) -> OrderStatus {
    match s {
        "confirmed" => OrderStatus::Confirmed,
        "processing" => OrderStatus::Processing,
        "shipped" => OrderStatus::Shipped,
        "delivered" => OrderStatus::Delivered,
        "cancelled" => OrderStatus::Cancelled,
        _ => OrderStatus::Pending,
    }
}

fn parse_ts(s: &str) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn test_store() -> (OrderStore, FieldCipher, NamedTempFile) {
        let temp = NamedTempFile::new().unwrap();
        let store = OrderStore::new(temp.path().to_str().unwrap()).unwrap();
        let cipher = FieldCipher::new(&[9u8; 32]);
        (store, cipher, temp)
    }

    #[test]
    fn creates_order_with_lines_and_correct_total() {
        let (store, cipher, _t) = test_store();
        let lines = vec![
            NewOrderLine {
                product_id: 1,
                quantity: 2,
                price_at_purchase: "10.00".parse().unwrap(),
            },
            NewOrderLine {
                product_id: 2,
                quantity: 1,
                price_at_purchase: "7.50".parse().unwrap(),
            },
        ];
        let total = "27.50".parse().unwrap();
        let order = store.create_order(&cipher, 42, total, &lines).unwrap();

        assert_eq!(order.owner_account_id, 42);
        assert_eq!(order.total_amount.to_string(), "27.50");
        assert_eq!(order.lines.len(), 2);
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[test]
    fn owner_decrypts_back_to_the_original_account_id() {
        let (store, cipher, _t) = test_store();
        let lines = vec![NewOrderLine {
            product_id: 1,
            quantity: 1,
            price_at_purchase: "10.00".parse().unwrap(),
        }];
        let created = store
            .create_order(&cipher, 7, "10.00".parse().unwrap(), &lines)
            .unwrap();
        let fetched = store.get_by_id(&cipher, created.id).unwrap().unwrap();
        assert_eq!(fetched.owner_account_id, 7);
    }

    #[test]
    fn list_by_owner_filters_to_that_owner() {
        let (store, cipher, _t) = test_store();
        let lines = vec![NewOrderLine {
            product_id: 1,
            quantity: 1,
            price_at_purchase: "10.00".parse().unwrap(),
        }];
        store.create_order(&cipher, 1, "10.00".parse().unwrap(), &lines).unwrap();
        store.create_order(&cipher, 2, "10.00".parse().unwrap(), &lines).unwrap();

        let owner_1_orders = store.list_by_owner(&cipher, 1, 1).unwrap();
        assert_eq!(owner_1_orders.len(), 1);
        assert_eq!(owner_1_orders[0].owner_account_id, 1);
    }

    #[test]
    fn rejects_invalid_status_transition() {
        let (store, cipher, _t) = test_store();
        let lines = vec![NewOrderLine {
            product_id: 1,
            quantity: 1,
            price_at_purchase: "10.00".parse().unwrap(),
        }];
        let order = store.create_order(&cipher, 1, "10.00".parse().unwrap(), &lines).unwrap();
        assert!(store.transition_status(order.id, OrderStatus::Shipped).is_err());
        assert!(store.transition_status(order.id, OrderStatus::Confirmed).unwrap());
    }
}
