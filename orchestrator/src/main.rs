mod api;
mod config;
mod crypto;
mod models;
mod order_service;
mod rpc_client;
mod store;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use common::verify::TokenVerifier;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use api::AppState;
use config::Config;
use crypto::FieldCipher;
use order_service::OrderService;
use rpc_client::{CatalogClient, IdpClient};
use store::OrderStore;

#[tokio::main]
async fn main() -> Result<()> {
    config::load_env();
    config::init_tracing();

    let cfg = Config::from_env()?;
    tracing::info!(port = cfg.http_port, "starting orchestrator");

    let verifier = Arc::new(TokenVerifier::new(cfg.idp_public_key_url.clone()));
    verifier
        .bootstrap(
            Some(&cfg.key_cache_path),
            Duration::from_secs(cfg.key_fetch_timeout_secs),
        )
        .await
        .context("failed to obtain IdP verifying key within the startup timeout")?;
    tracing::info!("verifying key acquired");

    let store = Arc::new(OrderStore::new(&cfg.database_url)?);
    let cipher = Arc::new(FieldCipher::new(&cfg.field_encryption_key));
    let idp = Arc::new(IdpClient::new(&cfg));
    let catalog = Arc::new(CatalogClient::new(&cfg));

    let orders = Arc::new(OrderService::new(store, cipher, idp, catalog));
    let state = AppState { orders, verifier };

    let app = api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", cfg.http_port)).await?;
    tracing::info!(addr = %listener.local_addr()?, "orchestrator listening");
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
