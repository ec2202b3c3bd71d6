mod api;
mod config;
mod models;
mod rpc;
mod store;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use common::verify::TokenVerifier;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use api::AppState;
use config::Config;
use store::ProductStore;

#[tokio::main]
async fn main() -> Result<()> {
    config::load_env();
    config::init_tracing();

    let cfg = Config::from_env()?;
    tracing::info!(port = cfg.http_port, "starting catalog");

    let verifier = Arc::new(TokenVerifier::new(cfg.idp_public_key_url.clone()));
    verifier
        .bootstrap(
            Some(&cfg.key_cache_path),
            Duration::from_secs(cfg.key_fetch_timeout_secs),
        )
        .await
        .context("failed to obtain IdP verifying key within the startup timeout")?;
    tracing::info!("verifying key acquired");

    let store = Arc::new(ProductStore::new(&cfg.database_url)?);

    let state = AppState { store, verifier };

    let app = api::router(state.clone())
        .merge(rpc::rpc_router(state, cfg.internal_rpc_secret.clone()))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", cfg.http_port)).await?;
    tracing::info!(addr = %listener.local_addr()?, "catalog listening");
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
