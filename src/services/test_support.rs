use async_trait::async_trait;
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Mutex,
};

use super::data_source::{DataSource, DataSourceError};
use super::mock::MockDataSource;
use crate::models::{
    token::{TokenDeleteAck, TokenUpdateAck},
    CardProfile, MerchantApp, MerchantAppId, ProvisioningRequest, TokenDetails, TokenRecord,
    TokenStatus, Transaction, TransactionPage,
};

/// Latency-free mock with call counters and switchable failures.
pub struct ScriptedSource {
    inner: MockDataSource,
    pub create_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    pub fail_create: AtomicBool,
    pub fail_updates: AtomicBool,
    status_script: Mutex<Option<ProvisioningRequest>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self {
            inner: MockDataSource::without_latency(),
            create_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            update_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            fail_create: AtomicBool::new(false),
            fail_updates: AtomicBool::new(false),
            status_script: Mutex::new(None),
        }
    }

    /// Every status poll answers with `request` instead of the mock's state
    pub fn script_status(&self, request: ProvisioningRequest) {
        *self.status_script.lock().unwrap() = Some(request);
    }

    fn scripted_failure(operation: &'static str) -> DataSourceError {
        DataSourceError::request_failed(operation, "Status 500 Internal Server Error")
    }
}

#[async_trait]
impl DataSource for ScriptedSource {
    async fn get_card_details(&self) -> Result<CardProfile, DataSourceError> {
        self.inner.get_card_details().await
    }

    async fn get_transaction_history(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<TransactionPage, DataSourceError> {
        self.inner.get_transaction_history(limit, offset).await
    }

    async fn get_transaction(&self, transaction_id: &str) -> Result<Transaction, DataSourceError> {
        self.inner.get_transaction(transaction_id).await
    }

    async fn create_push_provisioning_request(
        &self,
        app_ids: &[MerchantAppId],
    ) -> Result<ProvisioningRequest, DataSourceError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(Self::scripted_failure("create_push_provisioning_request"));
        }
        self.inner.create_push_provisioning_request(app_ids).await
    }

    async fn get_push_provisioning_status(
        &self,
        request_id: &str,
    ) -> Result<ProvisioningRequest, DataSourceError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.status_script.lock().unwrap().clone();
        match scripted {
            Some(request) => Ok(request),
            None => self.inner.get_push_provisioning_status(request_id).await,
        }
    }

    async fn get_available_merchants(&self) -> Result<Vec<MerchantApp>, DataSourceError> {
        self.inner.get_available_merchants().await
    }

    async fn list_user_tokens(
        &self,
        card_identifier: &str,
    ) -> Result<Vec<TokenRecord>, DataSourceError> {
        self.inner.list_user_tokens(card_identifier).await
    }

    async fn get_token_details(
        &self,
        token_reference_id: &str,
    ) -> Result<TokenDetails, DataSourceError> {
        self.inner.get_token_details(token_reference_id).await
    }

    async fn update_token_status(
        &self,
        token_reference_id: &str,
        status: TokenStatus,
    ) -> Result<TokenUpdateAck, DataSourceError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(Self::scripted_failure("update_token_status"));
        }
        self.inner
            .update_token_status(token_reference_id, status)
            .await
    }

    async fn delete_token(
        &self,
        token_reference_id: &str,
    ) -> Result<TokenDeleteAck, DataSourceError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(Self::scripted_failure("delete_token"));
        }
        self.inner.delete_token(token_reference_id).await
    }
}
