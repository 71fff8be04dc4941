use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use secrecy::Secret;
use std::{collections::HashMap, time::Duration};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::data_source::{DataSource, DataSourceError};
use crate::models::{
    token::{TokenDeleteAck, TokenUpdateAck},
    CardProfile, MerchantApp, MerchantAppId, ProvisioningRequest, ProvisioningResult,
    ProvisioningStatus, ResultStatus, TokenDetails, TokenRecord, TokenStatus, Transaction,
    TransactionPage,
};

// Artificial latency per operation, in milliseconds
const CARD_DELAY_MS: u64 = 500;
const TRANSACTIONS_DELAY_MS: u64 = 300;
const PUSH_DELAY_MS: u64 = 1000;
const STATUS_DELAY_MS: u64 = 500;
const MERCHANTS_DELAY_MS: u64 = 300;
const LIST_TOKENS_DELAY_MS: u64 = 400;
const TOKEN_DETAILS_DELAY_MS: u64 = 300;
const UPDATE_TOKEN_DELAY_MS: u64 = 500;
const DELETE_TOKEN_DELAY_MS: u64 = 400;

/// Number of catalog apps that start with a token on file
const SEEDED_TOKEN_APPS: usize = 5;

struct StoredRequest {
    app_ids: Vec<MerchantAppId>,
    status: ProvisioningStatus,
    results: Vec<ProvisioningResult>,
}

struct MockState {
    transactions: Vec<Transaction>,
    merchants: Vec<MerchantApp>,
    tokens: Vec<TokenRecord>,
    requests: HashMap<String, StoredRequest>,
}

/// In-memory stand-in for the backend, used when the liveness probe fails.
///
/// Push requests stay `pending` until their first status poll, at which point
/// one `ACTIVE` token per requested app is issued.
pub struct MockDataSource {
    latency: bool,
    state: Mutex<MockState>,
}

impl MockDataSource {
    pub fn new(latency: bool) -> Self {
        let mut merchants = merchant_catalog();
        let tokens = seed_tokens(&mut merchants);

        Self {
            latency,
            state: Mutex::new(MockState {
                transactions: transaction_history(),
                merchants,
                tokens,
                requests: HashMap::new(),
            }),
        }
    }

    pub fn without_latency() -> Self {
        Self::new(false)
    }

    async fn simulate_latency(&self, millis: u64) {
        if self.latency {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
    }
}

impl Default for MockDataSource {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl DataSource for MockDataSource {
    async fn get_card_details(&self) -> Result<CardProfile, DataSourceError> {
        self.simulate_latency(CARD_DELAY_MS).await;
        Ok(card_profile())
    }

    async fn get_transaction_history(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<TransactionPage, DataSourceError> {
        self.simulate_latency(TRANSACTIONS_DELAY_MS).await;
        let state = self.state.lock().await;

        let transactions = state
            .transactions
            .iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();

        Ok(TransactionPage {
            transactions,
            total: state.transactions.len(),
            limit,
            offset,
        })
    }

    async fn get_transaction(&self, transaction_id: &str) -> Result<Transaction, DataSourceError> {
        self.simulate_latency(TRANSACTIONS_DELAY_MS).await;
        let state = self.state.lock().await;

        state
            .transactions
            .iter()
            .find(|txn| txn.id == transaction_id)
            .cloned()
            .ok_or_else(|| DataSourceError::NotFound(format!("transaction {}", transaction_id)))
    }

    async fn create_push_provisioning_request(
        &self,
        app_ids: &[MerchantAppId],
    ) -> Result<ProvisioningRequest, DataSourceError> {
        self.simulate_latency(PUSH_DELAY_MS).await;
        let mut state = self.state.lock().await;

        let invalid: Vec<String> = app_ids
            .iter()
            .filter(|id| !state.merchants.iter().any(|app| app.id == **id))
            .map(|id| id.to_string())
            .collect();

        if !invalid.is_empty() {
            return Err(DataSourceError::request_failed(
                "create_push_provisioning_request",
                format!("Invalid merchant app IDs: [{}]", invalid.join(", ")),
            ));
        }

        let request_id = format!("REQ_{}", short_id());
        state.requests.insert(
            request_id.clone(),
            StoredRequest {
                app_ids: app_ids.to_vec(),
                status: ProvisioningStatus::Pending,
                results: Vec::new(),
            },
        );

        tracing::debug!(request_id = %request_id, apps = app_ids.len(), "Mock push request accepted");

        Ok(ProvisioningRequest {
            request_id,
            status: ProvisioningStatus::Pending,
            results: Vec::new(),
        })
    }

    async fn get_push_provisioning_status(
        &self,
        request_id: &str,
    ) -> Result<ProvisioningRequest, DataSourceError> {
        self.simulate_latency(STATUS_DELAY_MS).await;
        let mut state = self.state.lock().await;
        let MockState {
            merchants,
            tokens,
            requests,
            ..
        } = &mut *state;

        let stored = requests
            .get_mut(request_id)
            .ok_or_else(|| DataSourceError::NotFound(format!("request {}", request_id)))?;

        if stored.status == ProvisioningStatus::Pending {
            let now = Utc::now();

            for app_id in &stored.app_ids {
                let Some(app) = merchants.iter_mut().find(|app| app.id == *app_id) else {
                    continue;
                };

                let token_reference_id = format!("TKN_{}", short_id());
                tokens.retain(|token| token.merchant_app_id != Some(*app_id));
                tokens.push(TokenRecord {
                    token_reference_id: token_reference_id.clone(),
                    merchant_app_id: Some(app.id),
                    merchant_id: app.merchant_id.clone(),
                    merchant_name: Some(app.name.clone()),
                    token_status: TokenStatus::Active,
                    created_timestamp: Some(now),
                    last_used_timestamp: None,
                    token_expiry_date: Some((now + ChronoDuration::days(1095)).format("%Y%m").to_string()),
                });
                app.has_token = true;

                stored.results.push(ProvisioningResult {
                    merchant_app_id: Some(app.id),
                    merchant_id: app.merchant_id.clone(),
                    merchant_name: Some(app.name.clone()),
                    status: ResultStatus::Success,
                    token_reference_id: Some(token_reference_id),
                });
            }

            stored.status = ProvisioningStatus::Completed;
            tracing::debug!(request_id, tokens = stored.results.len(), "Mock push request completed");
        }

        Ok(ProvisioningRequest {
            request_id: request_id.to_string(),
            status: stored.status,
            results: stored.results.clone(),
        })
    }

    async fn get_available_merchants(&self) -> Result<Vec<MerchantApp>, DataSourceError> {
        self.simulate_latency(MERCHANTS_DELAY_MS).await;
        Ok(self.state.lock().await.merchants.clone())
    }

    async fn list_user_tokens(
        &self,
        _card_identifier: &str,
    ) -> Result<Vec<TokenRecord>, DataSourceError> {
        self.simulate_latency(LIST_TOKENS_DELAY_MS).await;
        Ok(self.state.lock().await.tokens.clone())
    }

    async fn get_token_details(
        &self,
        token_reference_id: &str,
    ) -> Result<TokenDetails, DataSourceError> {
        self.simulate_latency(TOKEN_DETAILS_DELAY_MS).await;
        let state = self.state.lock().await;

        let record = state
            .tokens
            .iter()
            .find(|token| token.token_reference_id == token_reference_id)
            .cloned()
            .ok_or_else(|| DataSourceError::NotFound(format!("token {}", token_reference_id)))?;

        let usage_count = state
            .transactions
            .iter()
            .filter(|txn| txn.token_reference_id.as_deref() == Some(token_reference_id))
            .count() as u32;

        Ok(TokenDetails {
            record,
            usage_count,
        })
    }

    async fn update_token_status(
        &self,
        token_reference_id: &str,
        status: TokenStatus,
    ) -> Result<TokenUpdateAck, DataSourceError> {
        self.simulate_latency(UPDATE_TOKEN_DELAY_MS).await;
        let mut state = self.state.lock().await;

        let token = state
            .tokens
            .iter_mut()
            .find(|token| token.token_reference_id == token_reference_id)
            .ok_or_else(|| DataSourceError::NotFound(format!("token {}", token_reference_id)))?;

        token.token_status = status;

        Ok(TokenUpdateAck {
            token_reference_id: token_reference_id.to_string(),
            token_status: Some(status),
        })
    }

    async fn delete_token(
        &self,
        token_reference_id: &str,
    ) -> Result<TokenDeleteAck, DataSourceError> {
        self.simulate_latency(DELETE_TOKEN_DELAY_MS).await;
        let mut state = self.state.lock().await;

        let position = state
            .tokens
            .iter()
            .position(|token| token.token_reference_id == token_reference_id)
            .ok_or_else(|| DataSourceError::NotFound(format!("token {}", token_reference_id)))?;
        let removed = state.tokens.remove(position);

        if let Some(app_id) = removed.merchant_app_id {
            let still_has_token = state
                .tokens
                .iter()
                .any(|token| token.merchant_app_id == Some(app_id));
            if let Some(app) = state.merchants.iter_mut().find(|app| app.id == app_id) {
                app.has_token = still_has_token;
            }
        }

        Ok(TokenDeleteAck {
            token_reference_id: token_reference_id.to_string(),
        })
    }
}

fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_uppercase()
}

fn card_profile() -> CardProfile {
    CardProfile {
        card_number: "4532123456789012".to_string(),
        card_holder_name: "RAKESH VERMA".to_string(),
        expiry_date: "12/28".to_string(),
        cvv: Secret::new("123".to_string()),
        card_type: Some("visa".to_string()),
        available_limit: 65000,
        total_outstanding: 0,
        unspent_amount: 0,
        next_statement_date: "2024-02-25".to_string(),
    }
}

fn transaction(
    id: &str,
    merchant: &str,
    amount: u64,
    (year, month, day): (i32, u32, u32),
    category: &str,
    token_reference_id: Option<&str>,
) -> Transaction {
    Transaction {
        id: id.to_string(),
        merchant: merchant.to_string(),
        amount,
        date: NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default(),
        category: category.to_string(),
        status: "completed".to_string(),
        token_used: token_reference_id.is_some(),
        token_reference_id: token_reference_id.map(str::to_string),
    }
}

fn transaction_history() -> Vec<Transaction> {
    vec![
        transaction("TXN_001", "Uber", 100, (2024, 1, 15), "ride", Some("TKN_UBER_001")),
        transaction("TXN_002", "Amazon", 250, (2024, 1, 14), "shopping", None),
        transaction("TXN_003", "Airtel Payment on PayZapp", 450, (2024, 1, 13), "recharge", None),
        transaction("TXN_004", "Zepto", 300, (2024, 1, 12), "grocery", Some("TKN_ZEPTO_001")),
    ]
}

/// The seven merchant apps offered for push provisioning
pub fn merchant_catalog() -> Vec<MerchantApp> {
    [
        (1, "Myntra", "Fashion", "Fashion & Lifestyle", "👗"),
        (2, "Uber", "Transportation", "Ride & Delivery", "🚗"),
        (3, "Zepto", "Grocery", "10-minute grocery delivery", "🛒"),
        (4, "Playo", "Sports", "Sports & Fitness", "🏸"),
        (5, "Bigbasket", "Grocery", "Online grocery shopping", "🥬"),
        (6, "Flipkart", "E-commerce", "Online shopping", "🛍️"),
        (7, "Swiggy", "Food", "Food delivery", "🍕"),
    ]
    .into_iter()
    .map(|(id, name, category, description, icon)| MerchantApp {
        id: MerchantAppId(id),
        name: name.to_string(),
        merchant_id: Some(format!("VISA_MERCHANT_{:03}", id)),
        category: category.to_string(),
        description: description.to_string(),
        icon: icon.to_string(),
        has_token: false,
    })
    .collect()
}

/// Tokens for the first few apps, alternating active/inactive.
///
/// Token ids follow the `TKN_<NAME>_001` scheme the transaction history
/// refers to.
fn seed_tokens(merchants: &mut [MerchantApp]) -> Vec<TokenRecord> {
    let now = Utc::now();

    merchants
        .iter_mut()
        .take(SEEDED_TOKEN_APPS)
        .enumerate()
        .map(|(i, app)| {
            app.has_token = true;
            let active = i % 2 == 0;

            TokenRecord {
                token_reference_id: format!("TKN_{}_001", app.name.to_uppercase()),
                merchant_app_id: Some(app.id),
                merchant_id: app.merchant_id.clone(),
                merchant_name: Some(app.name.clone()),
                token_status: if active {
                    TokenStatus::Active
                } else {
                    TokenStatus::Inactive
                },
                created_timestamp: Some(now - ChronoDuration::days(i as i64 * 10)),
                last_used_timestamp: active.then(|| now - ChronoDuration::days(i as i64)),
                token_expiry_date: Some((now + ChronoDuration::days(1095)).format("%Y%m").to_string()),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_transaction_history_pagination() {
        let mock = MockDataSource::without_latency();

        let page = mock.get_transaction_history(2, 0).await.unwrap();
        assert_eq!(page.total, 4);
        assert_eq!(page.limit, 2);
        assert_eq!(page.offset, 0);
        let ids: Vec<_> = page.transactions.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["TXN_001", "TXN_002"]);
        assert!(page.has_more());

        let tail = mock.get_transaction_history(10, 3).await.unwrap();
        assert_eq!(tail.transactions.len(), 1);
        assert!(!tail.has_more());

        let past_end = mock.get_transaction_history(10, 9).await.unwrap();
        assert!(past_end.transactions.is_empty());
        assert_eq!(past_end.total, 4);
    }

    #[tokio::test]
    async fn test_seeded_tokens_are_deterministic() {
        let mock = MockDataSource::without_latency();
        let tokens = mock.list_user_tokens("default_card").await.unwrap();

        assert_eq!(tokens.len(), SEEDED_TOKEN_APPS);
        let statuses: Vec<_> = tokens.iter().map(|t| t.token_status).collect();
        assert_eq!(
            statuses,
            vec![
                TokenStatus::Active,
                TokenStatus::Inactive,
                TokenStatus::Active,
                TokenStatus::Inactive,
                TokenStatus::Active,
            ]
        );
        assert!(tokens[1].last_used_timestamp.is_none());
        assert_eq!(tokens[1].token_reference_id, "TKN_UBER_001");
    }

    #[tokio::test]
    async fn test_push_completes_on_first_poll() {
        let mock = MockDataSource::without_latency();
        let ids = [MerchantAppId(6), MerchantAppId(7)];

        let created = mock.create_push_provisioning_request(&ids).await.unwrap();
        assert_eq!(created.status, ProvisioningStatus::Pending);
        assert!(created.results.is_empty());

        let status = mock
            .get_push_provisioning_status(&created.request_id)
            .await
            .unwrap();
        assert_eq!(status.status, ProvisioningStatus::Completed);
        assert_eq!(status.results.len(), 2);
        assert!(status
            .results
            .iter()
            .all(|r| r.status == ResultStatus::Success && r.token_reference_id.is_some()));

        // Polling again does not issue a second batch of tokens
        let again = mock
            .get_push_provisioning_status(&created.request_id)
            .await
            .unwrap();
        assert_eq!(again.results, status.results);

        let tokens = mock.list_user_tokens("default_card").await.unwrap();
        assert_eq!(tokens.len(), SEEDED_TOKEN_APPS + 2);

        let merchants = mock.get_available_merchants().await.unwrap();
        assert!(merchants.iter().filter(|app| app.id.0 >= 6).all(|app| app.has_token));
    }

    #[tokio::test]
    async fn test_push_rejects_unknown_apps() {
        let mock = MockDataSource::without_latency();
        let err = mock
            .create_push_provisioning_request(&[MerchantAppId(1), MerchantAppId(42)])
            .await
            .unwrap_err();

        match err {
            DataSourceError::RequestFailed { message, .. } => assert!(message.contains("42")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_token_details_count_usage() {
        let mock = MockDataSource::without_latency();
        let details = mock.get_token_details("TKN_ZEPTO_001").await.unwrap();

        assert_eq!(details.usage_count, 1);
        assert_eq!(details.record.merchant_app_id, Some(MerchantAppId(3)));
    }

    #[tokio::test]
    async fn test_update_and_delete_token() {
        let mock = MockDataSource::without_latency();

        let ack = mock
            .update_token_status("TKN_MYNTRA_001", TokenStatus::Inactive)
            .await
            .unwrap();
        assert_eq!(ack.token_status, Some(TokenStatus::Inactive));

        mock.delete_token("TKN_MYNTRA_001").await.unwrap();
        let tokens = mock.list_user_tokens("default_card").await.unwrap();
        assert!(tokens.iter().all(|t| t.token_reference_id != "TKN_MYNTRA_001"));

        let merchants = mock.get_available_merchants().await.unwrap();
        assert!(!merchants[0].has_token);

        let err = mock.delete_token("TKN_MYNTRA_001").await.unwrap_err();
        assert!(matches!(err, DataSourceError::NotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_is_simulated() {
        let mock = MockDataSource::new(true);
        let start = tokio::time::Instant::now();

        mock.get_card_details().await.unwrap();

        assert!(start.elapsed() >= Duration::from_millis(CARD_DELAY_MS));
    }
}
