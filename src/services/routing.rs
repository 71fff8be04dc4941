use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tokio::{sync::Mutex, time::Instant};

use super::data_source::{DataSource, DataSourceError};
use super::mock::MockDataSource;
use super::remote::RemoteDataSource;
use crate::models::{
    token::{TokenDeleteAck, TokenUpdateAck},
    CardProfile, MerchantApp, MerchantAppId, ProvisioningRequest, TokenDetails, TokenRecord,
    TokenStatus, Transaction, TransactionPage,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendRoute {
    Remote,
    Mock,
}

#[derive(Debug, Clone, Copy)]
struct RouteDecision {
    route: BackendRoute,
    probe_latency: Option<Duration>,
    decided_at: Instant,
}

/// Snapshot of the current routing decision, for health reporting
#[derive(Debug, Clone, Serialize)]
pub struct RouteStatus {
    pub route: BackendRoute,
    pub probe_latency_ms: Option<u128>,
    pub decided_secs_ago: u64,
}

/// Sends every call to the remote backend while its liveness probe passes,
/// and to the in-process mock otherwise.
///
/// The probe runs once and its decision is reused for `ttl`, so a healthy
/// backend costs one extra round trip per TTL window rather than per call.
/// Errors from the remote side after routing are returned as-is; they are not
/// retried against the mock.
pub struct RoutedDataSource {
    remote: RemoteDataSource,
    mock: MockDataSource,
    probe_timeout: Duration,
    ttl: Duration,
    decision: Mutex<Option<RouteDecision>>,
}

impl RoutedDataSource {
    pub fn new(
        remote: RemoteDataSource,
        mock: MockDataSource,
        probe_timeout: Duration,
        ttl: Duration,
    ) -> Self {
        Self {
            remote,
            mock,
            probe_timeout,
            ttl,
            decision: Mutex::new(None),
        }
    }

    pub fn api_base(&self) -> &str {
        self.remote.api_base()
    }

    /// Current route, probing the backend if the cached decision has expired
    pub async fn route(&self) -> BackendRoute {
        self.decide().await.route
    }

    pub async fn status(&self) -> RouteStatus {
        let decision = self.decide().await;

        RouteStatus {
            route: decision.route,
            probe_latency_ms: decision.probe_latency.map(|d| d.as_millis()),
            decided_secs_ago: decision.decided_at.elapsed().as_secs(),
        }
    }

    /// Forgets the cached decision so the next call probes again
    pub async fn invalidate(&self) {
        *self.decision.lock().await = None;
    }

    async fn decide(&self) -> RouteDecision {
        // Held across the probe so concurrent callers share a single probe
        let mut cached = self.decision.lock().await;

        if let Some(decision) = *cached {
            if decision.decided_at.elapsed() < self.ttl {
                return decision;
            }
        }

        let decision = match self.remote.probe(self.probe_timeout).await {
            Ok(latency) => {
                tracing::info!(
                    api_base = %self.remote.api_base(),
                    probe_ms = latency.as_millis(),
                    "Backend reachable, routing to remote"
                );
                RouteDecision {
                    route: BackendRoute::Remote,
                    probe_latency: Some(latency),
                    decided_at: Instant::now(),
                }
            }
            Err(e) => {
                tracing::warn!(
                    api_base = %self.remote.api_base(),
                    error = %e,
                    "Backend probe failed, routing to mock"
                );
                RouteDecision {
                    route: BackendRoute::Mock,
                    probe_latency: None,
                    decided_at: Instant::now(),
                }
            }
        };

        *cached = Some(decision);
        decision
    }

    async fn backend(&self) -> &dyn DataSource {
        match self.route().await {
            BackendRoute::Remote => &self.remote,
            BackendRoute::Mock => &self.mock,
        }
    }
}

#[async_trait]
impl DataSource for RoutedDataSource {
    async fn get_card_details(&self) -> Result<CardProfile, DataSourceError> {
        self.backend().await.get_card_details().await
    }

    async fn get_transaction_history(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<TransactionPage, DataSourceError> {
        self.backend()
            .await
            .get_transaction_history(limit, offset)
            .await
    }

    async fn get_transaction(&self, transaction_id: &str) -> Result<Transaction, DataSourceError> {
        self.backend().await.get_transaction(transaction_id).await
    }

    async fn create_push_provisioning_request(
        &self,
        app_ids: &[MerchantAppId],
    ) -> Result<ProvisioningRequest, DataSourceError> {
        self.backend()
            .await
            .create_push_provisioning_request(app_ids)
            .await
    }

    async fn get_push_provisioning_status(
        &self,
        request_id: &str,
    ) -> Result<ProvisioningRequest, DataSourceError> {
        self.backend()
            .await
            .get_push_provisioning_status(request_id)
            .await
    }

    async fn get_available_merchants(&self) -> Result<Vec<MerchantApp>, DataSourceError> {
        self.backend().await.get_available_merchants().await
    }

    async fn list_user_tokens(
        &self,
        card_identifier: &str,
    ) -> Result<Vec<TokenRecord>, DataSourceError> {
        self.backend().await.list_user_tokens(card_identifier).await
    }

    async fn get_token_details(
        &self,
        token_reference_id: &str,
    ) -> Result<TokenDetails, DataSourceError> {
        self.backend()
            .await
            .get_token_details(token_reference_id)
            .await
    }

    async fn update_token_status(
        &self,
        token_reference_id: &str,
        status: TokenStatus,
    ) -> Result<TokenUpdateAck, DataSourceError> {
        self.backend()
            .await
            .update_token_status(token_reference_id, status)
            .await
    }

    async fn delete_token(
        &self,
        token_reference_id: &str,
    ) -> Result<TokenDeleteAck, DataSourceError> {
        self.backend().await.delete_token(token_reference_id).await
    }
}
