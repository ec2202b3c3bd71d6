//! Process-wide configuration, built once at startup from the environment.
//! Mission: no ambient global state — every component that needs a setting
//! gets it handed in explicitly.

use std::env;

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub database_url: String,
    pub key_dir: String,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
    pub internal_rpc_secret: String,
    pub bcrypt_cost: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            http_port: env_or("HTTP_PORT", "8081")?,
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "idp.sqlite3".to_string()),
            key_dir: env::var("KEY_DIR").unwrap_or_else(|_| "./keys/idp".to_string()),
            access_token_ttl_secs: env_or("ACCESS_TOKEN_TTL", "900")?,
            refresh_token_ttl_secs: env_or("REFRESH_TOKEN_TTL", "86400")?,
            internal_rpc_secret: env::var("INTERNAL_RPC_SECRET")
                .context("INTERNAL_RPC_SECRET must be set")?,
            bcrypt_cost: env_or("BCRYPT_COST", "12")?,
        })
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    raw.parse::<T>()
        .map_err(|e| anyhow::anyhow!("invalid value for {key}: {e}"))
}

/// Loads a `.env` file if present, mirroring the teacher's `load_env()`.
pub fn load_env() {
    if dotenv::dotenv().is_err() {
        tracing::debug!("no .env file found, continuing with process environment");
    }
}

pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
