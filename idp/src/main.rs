mod api;
mod config;
mod jwt;
mod keys;
mod models;
mod password;
mod recovery;
mod rpc;
mod store;
mod totp;

use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use api::AppState;
use config::Config;
use jwt::TokenIssuer;
use password::PasswordHasher;
use store::AccountStore;

#[tokio::main]
async fn main() -> Result<()> {
    config::load_env();
    config::init_tracing();

    let cfg = Config::from_env()?;
    tracing::info!(port = cfg.http_port, "starting identity provider");

    let signing_key = keys::load_or_generate(&cfg.key_dir)?;
    tracing::info!(kid = %signing_key.kid, "signing key ready");

    let store = AccountStore::new(&cfg.database_url)?;
    let hasher = PasswordHasher::new(cfg.bcrypt_cost);
    let issuer = TokenIssuer::new(&signing_key, cfg.access_token_ttl_secs, cfg.refresh_token_ttl_secs)?;

    let state = AppState {
        store: Arc::new(store),
        hasher: Arc::new(hasher),
        issuer: Arc::new(issuer),
        signing_key: Arc::new(signing_key),
        config: Arc::new(cfg.clone()),
    };

    let app = api::public_router(state.clone())
        .merge(api::protected_router(state.clone()))
        .merge(rpc::rpc_router(state))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", cfg.http_port)).await?;
    tracing::info!(addr = %listener.local_addr()?, "identity provider listening");
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
