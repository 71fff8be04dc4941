use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use std::time::{Duration, Instant};

use super::data_source::{DataSource, DataSourceError};
use crate::models::{
    merchant::MerchantCatalog,
    provisioning::PushProvisioningBody,
    token::{TokenDeleteAck, TokenList, TokenUpdateAck, TokenUpdateBody},
    CardProfile, MerchantApp, MerchantAppId, ProvisioningRequest, TokenDetails, TokenRecord,
    TokenStatus, Transaction, TransactionPage,
};

/// `GET /cards/transactions` as sent by either backend
#[derive(Debug, Deserialize)]
struct TransactionPageWire {
    transactions: Vec<Transaction>,
    #[serde(alias = "total_count")]
    total: usize,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    offset: Option<usize>,
}

/// Applied to every call except the liveness probe
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// REST client for the card tokenization backend (JSON over HTTP under `/api`)
#[derive(Debug, Clone)]
pub struct RemoteDataSource {
    client: Client,
    api_base: String,
    card_identifier: String,
    request_timeout: Duration,
}

impl RemoteDataSource {
    pub fn new(backend_url: &str, card_identifier: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_base: format!("{}/api", backend_url.trim_end_matches('/')),
            card_identifier: card_identifier.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Checks that the backend answers on `GET /api/` within `timeout`.
    ///
    /// Any response below 500 counts as alive; returns the round-trip time.
    #[tracing::instrument(skip(self), fields(api_base = %self.api_base))]
    pub async fn probe(&self, timeout: Duration) -> Result<Duration, DataSourceError> {
        let start = Instant::now();

        let response = self
            .client
            .get(format!("{}/", self.api_base))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| DataSourceError::NetworkUnavailable(e.to_string()))?;

        if response.status().is_server_error() {
            return Err(DataSourceError::NetworkUnavailable(format!(
                "Backend unavailable: HTTP {}",
                response.status()
            )));
        }

        Ok(start.elapsed())
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<T, DataSourceError> {
        let response = request
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    tracing::error!(
                        operation,
                        timeout_ms = self.request_timeout.as_millis() as u64,
                        "Backend request timed out"
                    );
                }
                DataSourceError::request_failed(operation, e.to_string())
            })?;

        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            let error_text = response.text().await.unwrap_or_default();
            return Err(DataSourceError::NotFound(format!(
                "{}: {}",
                operation, error_text
            )));
        }

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::error!(
                operation,
                status = %status,
                error = %error_text,
                "Backend request failed"
            );
            return Err(DataSourceError::request_failed(
                operation,
                format!("Status {}: {}", status, error_text),
            ));
        }

        response.json::<T>().await.map_err(|e| {
            DataSourceError::request_failed(operation, format!("Failed to parse response: {}", e))
        })
    }
}

#[async_trait]
impl DataSource for RemoteDataSource {
    #[tracing::instrument(skip(self))]
    async fn get_card_details(&self) -> Result<CardProfile, DataSourceError> {
        let url = format!("{}/cards/details", self.api_base);
        self.send_json("get_card_details", self.client.get(url)).await
    }

    #[tracing::instrument(skip(self))]
    async fn get_transaction_history(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<TransactionPage, DataSourceError> {
        let url = format!("{}/cards/transactions", self.api_base);
        let request = self
            .client
            .get(url)
            .query(&[("limit", limit), ("offset", offset)]);

        let wire: TransactionPageWire = self.send_json("get_transaction_history", request).await?;

        Ok(TransactionPage {
            transactions: wire.transactions,
            total: wire.total,
            limit: wire.limit.unwrap_or(limit),
            offset: wire.offset.unwrap_or(offset),
        })
    }

    #[tracing::instrument(skip(self))]
    async fn get_transaction(&self, transaction_id: &str) -> Result<Transaction, DataSourceError> {
        let url = format!("{}/cards/transactions/{}", self.api_base, transaction_id);
        self.send_json("get_transaction", self.client.get(url)).await
    }

    #[tracing::instrument(skip(self))]
    async fn create_push_provisioning_request(
        &self,
        app_ids: &[MerchantAppId],
    ) -> Result<ProvisioningRequest, DataSourceError> {
        let url = format!("{}/push-provisioning", self.api_base);
        let body = PushProvisioningBody {
            merchant_app_ids: app_ids,
            card_identifier: &self.card_identifier,
        };

        let request: ProvisioningRequest = self
            .send_json("create_push_provisioning_request", self.client.post(url).json(&body))
            .await?;

        tracing::info!(
            request_id = %request.request_id,
            results = request.results.len(),
            "Push provisioning request created"
        );

        Ok(request)
    }

    #[tracing::instrument(skip(self))]
    async fn get_push_provisioning_status(
        &self,
        request_id: &str,
    ) -> Result<ProvisioningRequest, DataSourceError> {
        let url = format!("{}/push-provisioning/status/{}", self.api_base, request_id);
        self.send_json("get_push_provisioning_status", self.client.get(url))
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn get_available_merchants(&self) -> Result<Vec<MerchantApp>, DataSourceError> {
        let url = format!("{}/push-provisioning/merchants", self.api_base);
        let catalog: MerchantCatalog = self
            .send_json("get_available_merchants", self.client.get(url))
            .await?;
        Ok(catalog.merchants)
    }

    #[tracing::instrument(skip(self))]
    async fn list_user_tokens(
        &self,
        card_identifier: &str,
    ) -> Result<Vec<TokenRecord>, DataSourceError> {
        let url = format!("{}/tokens", self.api_base);
        let request = self
            .client
            .get(url)
            .query(&[("card_identifier", card_identifier)]);

        let list: TokenList = self.send_json("list_user_tokens", request).await?;
        Ok(list.tokens)
    }

    #[tracing::instrument(skip(self))]
    async fn get_token_details(
        &self,
        token_reference_id: &str,
    ) -> Result<TokenDetails, DataSourceError> {
        let url = format!("{}/tokens/{}", self.api_base, token_reference_id);
        self.send_json("get_token_details", self.client.get(url)).await
    }

    #[tracing::instrument(skip(self))]
    async fn update_token_status(
        &self,
        token_reference_id: &str,
        status: TokenStatus,
    ) -> Result<TokenUpdateAck, DataSourceError> {
        let url = format!("{}/tokens/{}", self.api_base, token_reference_id);
        let body = TokenUpdateBody {
            token_status: status,
        };
        self.send_json("update_token_status", self.client.put(url).json(&body))
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn delete_token(
        &self,
        token_reference_id: &str,
    ) -> Result<TokenDeleteAck, DataSourceError> {
        let url = format!("{}/tokens/{}", self.api_base, token_reference_id);
        self.send_json("delete_token", self.client.delete(url)).await
    }
}
