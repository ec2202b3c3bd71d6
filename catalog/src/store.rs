//! SQLite persistence for products. One `Connection::open` per call,
//! matching the IdP store's statelessness at this scale.

use anyhow::{Context, Result};
use chrono::Utc;
use common::Money;
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{CreateProductRequest, Product, UpdateProductRequest, PAGE_SIZE};

pub struct ProductStore {
    db_path: String,
}

impl ProductStore {
    pub fn new(db_path: &str) -> Result<Self> {
        let store = ProductStore {
            db_path: db_path.to_string(),
        };
        store.init_db()?;
        Ok(store)
    }

    fn conn(&self) -> Result<Connection> {
        Connection::open(&self.db_path).context("failed to open product store")
    }

    fn init_db(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS products (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                description TEXT NOT NULL,
                price_cents INTEGER NOT NULL,
                inventory_count INTEGER NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    const SELECT_COLUMNS: &'static str =
        "id, name, description, price_cents, inventory_count, is_active, created_at, updated_at";

    fn row_to_product(row: &rusqlite::Row) -> rusqlite::Result<Product> {
        let price_cents: i64 = row.get(3)?;
        let created_at: String = row.get(6)?;
        let updated_at: String = row.get(7)?;
        Ok(Product {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            price: Money::from_cents(price_cents),
            inventory_count: row.get(4)?,
            is_active: row.get::<_, i64>(5)? != 0,
            created_at: parse_ts(&created_at),
            updated_at: parse_ts(&updated_at),
        })
    }

    pub fn create(&self, req: &CreateProductRequest) -> Result<Product> {
        if req.inventory_count < 0 {
            anyhow::bail!("inventory_count must be non-negative");
        }
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO products (name, description, price_cents, inventory_count, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5)",
            params![req.name, req.description, req.price.cents(), req.inventory_count, now],
        )?;
        let id = conn.last_insert_rowid();
        self.get_by_id(id)?.context("just-inserted product vanished")
    }

    pub fn get_by_id(&self, id: i64) -> Result<Option<Product>> {
        let conn = self.conn()?;
        let query = format!("SELECT {} FROM products WHERE id = ?1", Self::SELECT_COLUMNS);
        conn.query_row(&query, params![id], Self::row_to_product)
            .optional()
            .context("failed to query product by id")
    }

    pub fn list(&self, search: Option<&str>, page: u32) -> Result<Vec<Product>> {
        let conn = self.conn()?;
        let offset = page.saturating_sub(1) as i64 * PAGE_SIZE as i64;

        let query = format!(
            "SELECT {} FROM products WHERE is_active = 1 AND (name LIKE ?1 OR description LIKE ?1)
             ORDER BY id LIMIT ?2 OFFSET ?3",
            Self::SELECT_COLUMNS
        );
        let pattern = format!("%{}%", search.unwrap_or(""));

        let mut stmt = conn.prepare(&query)?;
        let rows = stmt
            .query_map(params![pattern, PAGE_SIZE as i64, offset], Self::row_to_product)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn update(&self, id: i64, req: &UpdateProductRequest) -> Result<Option<Product>> {
        let existing = match self.get_by_id(id)? {
            Some(p) => p,
            None => return Ok(None),
        };

        if let Some(inv) = req.inventory_count {
            if inv < 0 {
                anyhow::bail!("inventory_count must be non-negative");
            }
        }

        let name = req.name.clone().unwrap_or(existing.name);
        let description = req.description.clone().unwrap_or(existing.description);
        let price = req.price.unwrap_or(existing.price);
        let inventory_count = req.inventory_count.unwrap_or(existing.inventory_count);
        let is_active = req.is_active.unwrap_or(existing.is_active);

        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE products SET name = ?1, description = ?2, price_cents = ?3,
             inventory_count = ?4, is_active = ?5, updated_at = ?6 WHERE id = ?7",
            params![name, description, price.cents(), inventory_count, is_active as i64, now, id],
        )?;

        self.get_by_id(id)
    }

    pub fn delete(&self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let affected = conn.execute(
            "UPDATE products SET is_active = 0, updated_at = ?2 WHERE id = ?1",
            params![id, Utc::now().to_rfc3339()],
        )?;
        Ok(affected > 0)
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

    fn test_store() -> (ProductStore, NamedTempFile) {
        let temp = NamedTempFile::new().unwrap();
        let store = ProductStore::new(temp.path().to_str().unwrap()).unwrap();
        (store, temp)
    }

    fn sample_request() -> CreateProductRequest {
        CreateProductRequest {
            name: "Widget".to_string(),
            description: "A fine widget".to_string(),
            price: "10.00".parse().unwrap(),
            inventory_count: 5,
        }
    }

    #[test]
    fn creates_and_fetches_product() {
        let (store, _t) = test_store();
        let created = store.create(&sample_request()).unwrap();
        assert_eq!(created.price.to_string(), "10.00");

        let fetched = store.get_by_id(created.id).unwrap().unwrap();
        assert_eq!(fetched.name, "Widget");
    }

    #[test]
    fn search_matches_name_and_description() {
        let (store, _t) = test_store();
        store.create(&sample_request()).unwrap();

        let results = store.list(Some("widget"), 1).unwrap();
        assert_eq!(results.len(), 1);

        let results = store.list(Some("nomatch"), 1).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn delete_is_soft_and_excludes_from_list() {
        let (store, _t) = test_store();
        let created = store.create(&sample_request()).unwrap();
        assert!(store.delete(created.id).unwrap());

        assert!(store.list(None, 1).unwrap().is_empty());
        assert!(!store.get_by_id(created.id).unwrap().unwrap().is_active);
    }

    #[test]
    fn update_merges_provided_fields() {
        let (store, _t) = test_store();
        let created = store.create(&sample_request()).unwrap();

        let update = UpdateProductRequest {
            name: None,
            description: None,
            price: Some("12.00".parse().unwrap()),
            inventory_count: None,
            is_active: None,
        };
        let updated = store.update(created.id, &update).unwrap().unwrap();
        assert_eq!(updated.price.to_string(), "12.00");
        assert_eq!(updated.name, "Widget");
    }
}
