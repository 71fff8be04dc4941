use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::merchant::{resolve_app, MerchantApp, MerchantAppId};
use super::serde_helpers::optional_timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenStatus {
    #[serde(rename = "ACTIVE", alias = "active")]
    Active,
    #[serde(rename = "INACTIVE", alias = "inactive")]
    Inactive,
    #[serde(rename = "SUSPENDED", alias = "suspended")]
    Suspended,
    #[serde(rename = "DELETED", alias = "deleted")]
    Deleted,
}

impl TokenStatus {
    pub fn is_active(self) -> bool {
        matches!(self, TokenStatus::Active)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TokenStatus::Active => "ACTIVE",
            TokenStatus::Inactive => "INACTIVE",
            TokenStatus::Suspended => "SUSPENDED",
            TokenStatus::Deleted => "DELETED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub token_reference_id: String,
    #[serde(default)]
    pub merchant_app_id: Option<MerchantAppId>,
    #[serde(default)]
    pub merchant_id: Option<String>,
    #[serde(default)]
    pub merchant_name: Option<String>,
    pub token_status: TokenStatus,
    #[serde(default, alias = "created_date", deserialize_with = "optional_timestamp")]
    pub created_timestamp: Option<DateTime<Utc>>,
    #[serde(default, alias = "last_used", deserialize_with = "optional_timestamp")]
    pub last_used_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub token_expiry_date: Option<String>,
}

impl TokenRecord {
    pub fn resolve_app(&self, apps: &[MerchantApp]) -> Option<MerchantAppId> {
        resolve_app(
            apps,
            self.merchant_app_id,
            self.merchant_id.as_deref(),
            self.merchant_name.as_deref(),
        )
        .map(|app| app.id)
    }
}

/// Response body of `GET /tokens`
#[derive(Debug, Deserialize)]
pub struct TokenList {
    pub tokens: Vec<TokenRecord>,
    #[serde(default)]
    pub total_count: Option<usize>,
}

/// Response body of `GET /tokens/{tokenReferenceId}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDetails {
    #[serde(flatten)]
    pub record: TokenRecord,
    #[serde(default)]
    pub usage_count: u32,
}

#[derive(Debug, Serialize)]
pub struct TokenUpdateBody {
    pub token_status: TokenStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenUpdateAck {
    pub token_reference_id: String,
    #[serde(default, alias = "new_token_status")]
    pub token_status: Option<TokenStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenDeleteAck {
    pub token_reference_id: String,
}
