use std::env;

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub database_url: String,
    pub idp_base_url: String,
    pub catalog_base_url: String,
    pub idp_public_key_url: String,
    pub key_cache_path: String,
    pub key_fetch_timeout_secs: u64,
    pub internal_rpc_secret: String,
    pub field_encryption_key: [u8; 32],
    pub circuit_fail_threshold: u32,
    pub circuit_reset_seconds: u64,
    pub retry_max_attempts: u32,
    pub retry_base_seconds: u64,
    pub retry_cap_seconds: u64,
    pub rpc_deadline_seconds: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let key_hex = env::var("FIELD_ENCRYPTION_KEY")
            .context("FIELD_ENCRYPTION_KEY must be set (32 bytes, hex-encoded)")?;
        let key_bytes = hex::decode(&key_hex).context("FIELD_ENCRYPTION_KEY must be hex")?;
        let field_encryption_key: [u8; 32] = key_bytes
            .try_into()
            .map_err(|_| anyhow::anyhow!("FIELD_ENCRYPTION_KEY must decode to exactly 32 bytes"))?;

        Ok(Config {
            http_port: env_or("HTTP_PORT", "8083")?,
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "orchestrator.sqlite3".to_string()),
            idp_base_url: env::var("IDP_BASE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8081".to_string()),
            catalog_base_url: env::var("CATALOG_BASE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8082".to_string()),
            idp_public_key_url: env::var("IDP_PUBLIC_KEY_URL")
                .context("IDP_PUBLIC_KEY_URL must be set")?,
            key_cache_path: env::var("KEY_DIR")
                .unwrap_or_else(|_| "./keys/idp/jwt_public.pem".to_string()),
            key_fetch_timeout_secs: env_or("KEY_FETCH_TIMEOUT_SECONDS", "30")?,
            internal_rpc_secret: env::var("INTERNAL_RPC_SECRET")
                .context("INTERNAL_RPC_SECRET must be set")?,
            field_encryption_key,
            circuit_fail_threshold: env_or("CIRCUIT_FAIL_THRESHOLD", "5")?,
            circuit_reset_seconds: env_or("CIRCUIT_RESET_SECONDS", "30")?,
            retry_max_attempts: env_or("RETRY_MAX_ATTEMPTS", "3")?,
            retry_base_seconds: env_or("RETRY_BASE_SECONDS", "1")?,
            retry_cap_seconds: env_or("RETRY_CAP_SECONDS", "10")?,
            rpc_deadline_seconds: env_or("RPC_DEADLINE_SECONDS", "5")?,
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
