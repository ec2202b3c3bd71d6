//! Authenticated HTTP+JSON clients for the IdP and Catalog internal RPC
//! surfaces. Each call is wrapped in retry-with-backoff, and the whole
//! retried call is in turn wrapped by a circuit breaker, so a breaker trip
//! corresponds to one logical RPC giving up, not one raw HTTP attempt.

use std::time::Duration;

use common::breaker::{BreakerError, CircuitBreaker};
use common::retry::{with_retry, RetryPolicy};
use common::rpc_types::{
    CheckAvailabilityRequest, CheckAvailabilityResponse, GetProductInfoRequest,
    GetProductInfoResponse, ValidateUserRequest, ValidateUserResponse,
};
use thiserror::Error;

use crate::config::Config;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("dependency call timed out")]
    Timeout,
    #[error("dependency returned an error status: {0}")]
    Status(reqwest::StatusCode),
    #[error("dependency call failed: {0}")]
    Transport(String),
    #[error("circuit breaker open for this dependency")]
    BreakerOpen,
}

impl RpcError {
    /// Only transient failures are worth retrying; a 4xx from a dependency
    /// means the request itself is wrong and retrying won't help.
    fn is_transient(&self) -> bool {
        matches!(self, RpcError::Timeout | RpcError::Transport(_))
            || matches!(self, RpcError::Status(s) if s.is_server_error())
    }
}

impl From<reqwest::Error> for RpcError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RpcError::Timeout
        } else {
            RpcError::Transport(e.to_string())
        }
    }
}

struct Dependency {
    http: reqwest::Client,
    base_url: String,
    rpc_secret: String,
    retry_policy: RetryPolicy,
    breaker: CircuitBreaker,
    deadline: Duration,
}

impl Dependency {
    fn new(cfg: &Config, base_url: String) -> Self {
        Dependency {
            http: reqwest::Client::new(),
            base_url,
            rpc_secret: cfg.internal_rpc_secret.clone(),
            retry_policy: RetryPolicy {
                max_attempts: cfg.retry_max_attempts,
                base_delay: Duration::from_secs(cfg.retry_base_seconds),
                max_delay: Duration::from_secs(cfg.retry_cap_seconds),
            },
            breaker: CircuitBreaker::new(
                cfg.circuit_fail_threshold,
                Duration::from_secs(cfg.circuit_reset_seconds),
            ),
            deadline: Duration::from_secs(cfg.rpc_deadline_seconds),
        }
    }

    async fn post_json<Req: serde::Serialize, Resp: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Resp, RpcError> {
        let url = format!("{}{}", self.base_url, path);
        let attempt = || async {
            let result = tokio::time::timeout(
                self.deadline,
                self.http
                    .post(&url)
                    .bearer_auth(&self.rpc_secret)
                    .json(body)
                    .send(),
            )
            .await;

            let response = match result {
                Ok(r) => r?,
                Err(_) => return Err(RpcError::Timeout),
            };

            if !response.status().is_success() {
                return Err(RpcError::Status(response.status()));
            }
            response.json::<Resp>().await.map_err(RpcError::from)
        };

        let retried = with_retry(self.retry_policy, |e: &RpcError| e.is_transient(), attempt);

        match self.breaker.call(retried).await {
            Ok(v) => Ok(v),
            Err(BreakerError::Open) => Err(RpcError::BreakerOpen),
            Err(BreakerError::Inner(e)) => Err(e),
        }
    }
}

pub struct IdpClient {
    dep: Dependency,
}

impl IdpClient {
    pub fn new(cfg: &Config) -> Self {
        IdpClient {
            dep: Dependency::new(cfg, cfg.idp_base_url.clone()),
        }
    }

    pub async fn validate_user(&self, account_id: i64) -> Result<ValidateUserResponse, RpcError> {
        self.dep
            .post_json("/rpc/validate-user", &ValidateUserRequest { account_id })
            .await
    }
}

pub struct CatalogClient {
    dep: Dependency,
}

impl CatalogClient {
    pub fn new(cfg: &Config) -> Self {
        CatalogClient {
            dep: Dependency::new(cfg, cfg.catalog_base_url.clone()),
        }
    }

    pub async fn get_product_info(
        &self,
        product_id: i64,
    ) -> Result<GetProductInfoResponse, RpcError> {
        self.dep
            .post_json("/rpc/product-info", &GetProductInfoRequest { product_id })
            .await
    }

    pub async fn check_availability(
        &self,
        product_id: i64,
        quantity: i32,
    ) -> Result<CheckAvailabilityResponse, RpcError> {
        self.dep
            .post_json(
                "/rpc/check-availability",
                &CheckAvailabilityRequest { product_id, quantity },
            )
            .await
    }
}
