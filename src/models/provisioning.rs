use serde::{Deserialize, Serialize};

use super::merchant::{resolve_app, MerchantApp, MerchantAppId};

/// Lifecycle of a push request; only ever moves away from `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProvisioningStatus {
    #[serde(
        rename = "pending",
        alias = "PENDING",
        alias = "ACCEPTED",
        alias = "accepted"
    )]
    Pending,
    #[serde(rename = "completed", alias = "COMPLETED")]
    Completed,
    #[serde(rename = "failed", alias = "FAILED")]
    Failed,
}

impl ProvisioningStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ProvisioningStatus::Pending)
    }
}

/// Per-app result status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultStatus {
    #[serde(rename = "success", alias = "SUCCESS")]
    Success,
    #[serde(rename = "failed", alias = "FAILED")]
    Failed,
    #[serde(rename = "pending", alias = "PENDING")]
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningResult {
    #[serde(default)]
    pub merchant_app_id: Option<MerchantAppId>,
    #[serde(default)]
    pub merchant_id: Option<String>,
    #[serde(default)]
    pub merchant_name: Option<String>,
    #[serde(alias = "provisioning_result")]
    pub status: ResultStatus,
    #[serde(default)]
    pub token_reference_id: Option<String>,
}

impl ProvisioningResult {
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

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningRequest {
    pub request_id: String,
    pub status: ProvisioningStatus,
    #[serde(default, alias = "push_provisioning_results")]
    pub results: Vec<ProvisioningResult>,
}

/// Body of `POST /push-provisioning`
#[derive(Debug, Serialize)]
pub struct PushProvisioningBody<'a> {
    pub merchant_app_ids: &'a [MerchantAppId],
    pub card_identifier: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_accepted_response_is_pending() {
        let request: ProvisioningRequest = serde_json::from_value(serde_json::json!({
            "request_id": "b7f8c6d2",
            "status": "ACCEPTED",
            "timestamp": "2024-01-15T10:30:00",
            "push_provisioning_results": [{
                "merchant_id": "VISA_MERCHANT_001",
                "merchant_name": "Myntra",
                "token_reference_id": "TKN_ABCD1234",
                "token_status": "ACTIVE",
                "provisioning_result": "SUCCESS",
                "token_expiry_date": "202701"
            }]
        }))
        .unwrap();

        assert_eq!(request.status, ProvisioningStatus::Pending);
        assert!(!request.status.is_terminal());
        assert_eq!(request.results.len(), 1);
        assert_eq!(request.results[0].status, ResultStatus::Success);
    }

    #[test]
    fn test_status_response_without_results() {
        let request: ProvisioningRequest = serde_json::from_value(serde_json::json!({
            "request_id": "b7f8c6d2",
            "status": "COMPLETED",
            "message": "Push provisioning completed successfully"
        }))
        .unwrap();

        assert!(request.status.is_terminal());
        assert!(request.results.is_empty());
    }

    #[test]
    fn test_push_body_shape() {
        let ids = [MerchantAppId(1), MerchantAppId(3)];
        let body = serde_json::to_value(PushProvisioningBody {
            merchant_app_ids: &ids,
            card_identifier: "default_card",
        })
        .unwrap();

        assert_eq!(
            body,
            serde_json::json!({"merchant_app_ids": [1, 3], "card_identifier": "default_card"})
        );
    }
}
