use std::env;

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub database_url: String,
    pub idp_public_key_url: String,
    pub key_cache_path: String,
    pub internal_rpc_secret: String,
    pub key_refresh_interval_secs: u64,
    pub key_fetch_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            http_port: env_or("HTTP_PORT", "8082")?,
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "catalog.sqlite3".to_string()),
            idp_public_key_url: env::var("IDP_PUBLIC_KEY_URL")
                .context("IDP_PUBLIC_KEY_URL must be set")?,
            key_cache_path: env::var("KEY_DIR")
                .unwrap_or_else(|_| "./keys/idp/jwt_public.pem".to_string()),
            internal_rpc_secret: env::var("INTERNAL_RPC_SECRET")
                .context("INTERNAL_RPC_SECRET must be set")?,
            key_refresh_interval_secs: env_or("KEY_REFRESH_INTERVAL_SECONDS", "86400")?,
            key_fetch_timeout_secs: env_or("KEY_FETCH_TIMEOUT_SECONDS", "30")?,
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
