use async_trait::async_trait;

use crate::models::{
    token::{TokenDeleteAck, TokenUpdateAck},
    CardProfile, MerchantApp, MerchantAppId, ProvisioningRequest, TokenDetails, TokenRecord,
    TokenStatus, Transaction, TransactionPage,
};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DataSourceError {
    /// Liveness probe failed. The routed source answers this by switching to
    /// the mock, so callers of the routed source never see it.
    #[error("Backend unreachable: {0}")]
    NetworkUnavailable(String),

    #[error("{operation} failed: {message}")]
    RequestFailed {
        operation: &'static str,
        message: String,
    },

    #[error("Not found: {0}")]
    NotFound(String),
}

impl DataSourceError {
    pub fn request_failed(operation: &'static str, message: impl Into<String>) -> Self {
        DataSourceError::RequestFailed {
            operation,
            message: message.into(),
        }
    }

    /// Whether a plain retry by the user can succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, DataSourceError::NotFound(_))
    }
}

/// Card, merchant, provisioning and token operations.
///
/// Implemented by the REST client ([`super::remote::RemoteDataSource`]), the
/// in-process mock ([`super::mock::MockDataSource`]) and the probe-driven
/// router that picks between them ([`super::routing::RoutedDataSource`]).
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn get_card_details(&self) -> Result<CardProfile, DataSourceError>;

    async fn get_transaction_history(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<TransactionPage, DataSourceError>;

    async fn get_transaction(&self, transaction_id: &str) -> Result<Transaction, DataSourceError>;

    /// Starts a push for the given apps; the returned request is `Pending`.
    async fn create_push_provisioning_request(
        &self,
        app_ids: &[MerchantAppId],
    ) -> Result<ProvisioningRequest, DataSourceError>;

    async fn get_push_provisioning_status(
        &self,
        request_id: &str,
    ) -> Result<ProvisioningRequest, DataSourceError>;

    async fn get_available_merchants(&self) -> Result<Vec<MerchantApp>, DataSourceError>;

    async fn list_user_tokens(
        &self,
        card_identifier: &str,
    ) -> Result<Vec<TokenRecord>, DataSourceError>;

    async fn get_token_details(
        &self,
        token_reference_id: &str,
    ) -> Result<TokenDetails, DataSourceError>;

    async fn update_token_status(
        &self,
        token_reference_id: &str,
        status: TokenStatus,
    ) -> Result<TokenUpdateAck, DataSourceError>;

    async fn delete_token(&self, token_reference_id: &str)
        -> Result<TokenDeleteAck, DataSourceError>;
}
