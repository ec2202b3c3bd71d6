//! SQLite persistence for accounts, second factors and recovery codes.
//! One `Connection::open` per call, matching the store's statelessness —
//! acceptable at this scale, not hidden behind a pool abstraction.

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{Account, RecoveryCode, SecondFactor};

pub struct AccountStore {
    db_path: String,
}

impl AccountStore {
    pub fn new(db_path: &str) -> Result<Self> {
        let store = AccountStore {
            db_path: db_path.to_string(),
        };
        store.init_db()?;
        Ok(store)
    }

    fn conn(&self) -> Result<Connection> {
        Connection::open(&self.db_path).context("failed to open account store")
    }

    fn init_db(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT UNIQUE NOT NULL,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                is_admin INTEGER NOT NULL DEFAULT 0,
                token_version INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS second_factors (
                account_id INTEGER PRIMARY KEY,
                totp_secret TEXT NOT NULL,
                confirmed INTEGER NOT NULL DEFAULT 0,
                last_verified_step INTEGER,
                FOREIGN KEY (account_id) REFERENCES accounts(id)
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS recovery_codes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id INTEGER NOT NULL,
                code_hash TEXT NOT NULL,
                used INTEGER NOT NULL DEFAULT 0,
                FOREIGN KEY (account_id) REFERENCES accounts(id)
            )",
            [],
        )?;
        Ok(())
    }

    pub fn create_account(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<Account> {
        let conn = self.conn()?;
        let created_at = Utc::now();
        conn.execute(
            "INSERT INTO accounts (username, email, password_hash, is_active, is_admin, token_version, created_at)
             VALUES (?1, ?2, ?3, 1, 0, 1, ?4)",
            params![username, email, password_hash, created_at.to_rfc3339()],
        )
        .context("failed to insert account (username or email already taken?)")?;
        let id = conn.last_insert_rowid();

        Ok(Account {
            id,
            username: username.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            is_active: true,
            is_admin: false,
            token_version: 1,
            created_at,
        })
    }

    fn row_to_account(row: &rusqlite::Row) -> rusqlite::Result<Account> {
        let created_at: String = row.get(7)?;
        Ok(Account {
            id: row.get(0)?,
            username: row.get(1)?,
            email: row.get(2)?,
            password_hash: row.get(3)?,
            is_active: row.get::<_, i64>(4)? != 0,
            is_admin: row.get::<_, i64>(5)? != 0,
            token_version: row.get(6)?,
            created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    }

    const SELECT_COLUMNS: &'static str =
        "id, username, email, password_hash, is_active, is_admin, token_version, created_at";

    pub fn get_by_username(&self, username: &str) -> Result<Option<Account>> {
        let conn = self.conn()?;
        let query = format!("SELECT {} FROM accounts WHERE username = ?1", Self::SELECT_COLUMNS);
        conn.query_row(&query, params![username], Self::row_to_account)
            .optional()
            .context("failed to query account by username")
    }

    pub fn get_by_id(&self, id: i64) -> Result<Option<Account>> {
        let conn = self.conn()?;
        let query = format!("SELECT {} FROM accounts WHERE id = ?1", Self::SELECT_COLUMNS);
        conn.query_row(&query, params![id], Self::row_to_account)
            .optional()
            .context("failed to query account by id")
    }

    pub fn username_or_email_taken(&self, username: &str, email: &str) -> Result<bool> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM accounts WHERE username = ?1 OR email = ?2",
            params![username, email],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Bumps the token-version counter, invalidating every previously issued
    /// token for this account.
    pub fn bump_token_version(&self, account_id: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE accounts SET token_version = token_version + 1 WHERE id = ?1",
            params![account_id],
        )?;
        Ok(())
    }

    pub fn get_second_factor(&self, account_id: i64) -> Result<Option<SecondFactor>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT account_id, totp_secret, confirmed, last_verified_step
             FROM second_factors WHERE account_id = ?1",
            params![account_id],
            |row| {
                Ok(SecondFactor {
                    account_id: row.get(0)?,
                    totp_secret: row.get(1)?,
                    confirmed: row.get::<_, i64>(2)? != 0,
                    last_verified_step: row.get(3)?,
                })
            },
        )
        .optional()
        .context("failed to query second factor")
    }

    pub fn upsert_second_factor(&self, account_id: i64, totp_secret: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO second_factors (account_id, totp_secret, confirmed, last_verified_step)
             VALUES (?1, ?2, 0, NULL)
             ON CONFLICT(account_id) DO UPDATE SET totp_secret = excluded.totp_secret, confirmed = 0, last_verified_step = NULL",
            params![account_id, totp_secret],
        )?;
        Ok(())
    }

    pub fn confirm_second_factor(&self, account_id: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE second_factors SET confirmed = 1 WHERE account_id = ?1",
            params![account_id],
        )?;
        Ok(())
    }

    /// Advances `last_verified_step` only if `step` is newer than whatever is
    /// currently recorded, so two concurrent requests presenting the same
    /// code within one step can't both win.
    pub fn record_verified_step(&self, account_id: i64, step: i64) -> Result<bool> {
        let conn = self.conn()?;
        let affected = conn.execute(
            "UPDATE second_factors SET last_verified_step = ?2
             WHERE account_id = ?1 AND (last_verified_step IS NULL OR last_verified_step < ?2)",
            params![account_id, step],
        )?;
        Ok(affected > 0)
    }

    pub fn delete_second_factor(&self, account_id: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM second_factors WHERE account_id = ?1",
            params![account_id],
        )?;
        conn.execute(
            "DELETE FROM recovery_codes WHERE account_id = ?1",
            params![account_id],
        )?;
        Ok(())
    }

    /// Atomically replaces the recovery-code batch for an account.
    pub fn replace_recovery_codes(&self, account_id: i64, hashed_codes: &[String]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM recovery_codes WHERE account_id = ?1",
            params![account_id],
        )?;
        for hash in hashed_codes {
            tx.execute(
                "INSERT INTO recovery_codes (account_id, code_hash, used) VALUES (?1, ?2, 0)",
                params![account_id, hash],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn list_recovery_codes(&self, account_id: i64) -> Result<Vec<RecoveryCode>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT account_id, code_hash, used FROM recovery_codes WHERE account_id = ?1",
        )?;
        let rows = stmt
            .query_map(params![account_id], |row| {
                Ok(RecoveryCode {
                    account_id: row.get(0)?,
                    code_hash: row.get(1)?,
                    used: row.get::<_, i64>(2)? != 0,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Marks a recovery code used, returning `true` iff a not-yet-used
    /// matching row existed. Done as a single conditional UPDATE so the
    /// check-and-set is atomic under concurrent logins.
    pub fn mark_recovery_code_used(&self, account_id: i64, code_hash: &str) -> Result<bool> {
        let conn = self.conn()?;
        let affected = conn.execute(
            "UPDATE recovery_codes SET used = 1
             WHERE account_id = ?1 AND code_hash = ?2 AND used = 0",
            params![account_id, code_hash],
        )?;
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn test_store() -> (AccountStore, NamedTempFile) {
        let temp = NamedTempFile::new().unwrap();
        let store = AccountStore::new(temp.path().to_str().unwrap()).unwrap();
        (store, temp)
    }

    #[test]
    fn creates_and_fetches_account() {
        let (store, _t) = test_store();
        let account = store.create_account("alice", "a@x", "hash").unwrap();
        assert_eq!(account.token_version, 1);

        let fetched = store.get_by_username("alice").unwrap().unwrap();
        assert_eq!(fetched.id, account.id);
        assert_eq!(fetched.email, "a@x");
    }

    #[test]
    fn rejects_duplicate_username() {
        let (store, _t) = test_store();
        store.create_account("alice", "a@x", "hash").unwrap();
        assert!(store.username_or_email_taken("alice", "other@x").unwrap());
        assert!(store.create_account("alice", "other@x", "hash").is_err());
    }

    #[test]
    fn token_version_bump_invalidates_prior_tokens() {
        let (store, _t) = test_store();
        let account = store.create_account("alice", "a@x", "hash").unwrap();
        store.bump_token_version(account.id).unwrap();
        let reloaded = store.get_by_id(account.id).unwrap().unwrap();
        assert_eq!(reloaded.token_version, 2);
    }

    #[test]
    fn recovery_code_single_use() {
        let (store, _t) = test_store();
        let account = store.create_account("alice", "a@x", "hash").unwrap();
        store
            .replace_recovery_codes(account.id, &["hash1".to_string(), "hash2".to_string()])
            .unwrap();

        assert!(store.mark_recovery_code_used(account.id, "hash1").unwrap());
        assert!(!store.mark_recovery_code_used(account.id, "hash1").unwrap());
    }

    #[test]
    fn second_factor_round_trip() {
        let (store, _t) = test_store();
        let account = store.create_account("alice", "a@x", "hash").unwrap();
        assert!(store.get_second_factor(account.id).unwrap().is_none());

        store.upsert_second_factor(account.id, "SECRET").unwrap();
        let sf = store.get_second_factor(account.id).unwrap().unwrap();
        assert!(!sf.confirmed);

        store.confirm_second_factor(account.id).unwrap();
        let sf = store.get_second_factor(account.id).unwrap().unwrap();
        assert!(sf.confirmed);
    }

    #[test]
    fn record_verified_step_rejects_replay_at_the_same_or_earlier_step() {
        let (store, _t) = test_store();
        let account = store.create_account("alice", "a@x", "hash").unwrap();
        store.upsert_second_factor(account.id, "SECRET").unwrap();

        assert!(store.record_verified_step(account.id, 100).unwrap());
        // A second request racing on the same step loses the compare-and-swap.
        assert!(!store.record_verified_step(account.id, 100).unwrap());
        assert!(!store.record_verified_step(account.id, 99).unwrap());
        assert!(store.record_verified_step(account.id, 101).unwrap());
    }
}
