use chrono::NaiveDate;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};

use super::serde_helpers::{calendar_date, string_or_number};

/// Display-safe card metadata.
///
/// The CVV stays wrapped in a [`Secret`] so it never leaks through `Debug`
/// output or tracing fields; views must call [`CardProfile::reveal_cvv`].
#[derive(Debug, Deserialize)]
pub struct CardProfile {
    #[serde(alias = "cardNumber")]
    pub card_number: String,
    #[serde(alias = "cardHolderName")]
    pub card_holder_name: String,
    #[serde(alias = "expiryDate")]
    pub expiry_date: String,
    pub cvv: Secret<String>,
    #[serde(default, alias = "cardType")]
    pub card_type: Option<String>,
    #[serde(alias = "availableLimit")]
    pub available_limit: u64,
    #[serde(default, alias = "totalOutstanding")]
    pub total_outstanding: u64,
    #[serde(default, alias = "unspentAmount")]
    pub unspent_amount: u64,
    #[serde(alias = "nextStatementDate")]
    pub next_statement_date: String,
}

impl CardProfile {
    /// Card number with any grouping whitespace removed
    pub fn digits(&self) -> String {
        self.card_number.chars().filter(|c| !c.is_whitespace()).collect()
    }

    /// Every digit except the last four replaced with `*`
    pub fn masked_number(&self) -> String {
        let digits = self.digits();
        let visible_from = digits.len().saturating_sub(4);

        digits
            .chars()
            .enumerate()
            .map(|(i, c)| if i < visible_from { '*' } else { c })
            .collect()
    }

    /// Number split into 4-digit blocks: `4532 1234 5678 9012`
    pub fn grouped_number(&self) -> String {
        self.digits()
            .chars()
            .collect::<Vec<_>>()
            .chunks(4)
            .map(|block| block.iter().collect::<String>())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn reveal_cvv(&self) -> &str {
        self.cvv.expose_secret()
    }

    /// 16 digits and a 3 digit CVV
    pub fn is_well_formed(&self) -> bool {
        let digits = self.digits();
        let cvv = self.reveal_cvv();

        digits.len() == 16
            && digits.chars().all(|c| c.is_ascii_digit())
            && cvv.len() == 3
            && cvv.chars().all(|c| c.is_ascii_digit())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(alias = "transaction_id", deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(alias = "merchant_name")]
    pub merchant: String,
    pub amount: u64,
    #[serde(alias = "transaction_date", deserialize_with = "calendar_date")]
    pub date: NaiveDate,
    #[serde(rename = "type", alias = "transaction_type", alias = "category")]
    pub category: String,
    pub status: String,
    #[serde(default, alias = "tokenUsed")]
    pub token_used: bool,
    #[serde(default, alias = "tokenReferenceId")]
    pub token_reference_id: Option<String>,
}

/// One page of transaction history
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionPage {
    pub transactions: Vec<Transaction>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

impl TransactionPage {
    pub fn has_more(&self) -> bool {
        self.offset + self.transactions.len() < self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_card(number: &str, cvv: &str) -> CardProfile {
        CardProfile {
            card_number: number.to_string(),
            card_holder_name: "RAKESH VERMA".to_string(),
            expiry_date: "12/28".to_string(),
            cvv: Secret::new(cvv.to_string()),
            card_type: Some("visa".to_string()),
            available_limit: 65000,
            total_outstanding: 0,
            unspent_amount: 0,
            next_statement_date: "2024-02-25".to_string(),
        }
    }

    #[test]
    fn test_card_number_formatting() {
        let card = sample_card("4532 1234 5678 9012", "123");

        assert_eq!(card.digits(), "4532123456789012");
        assert_eq!(card.masked_number(), "************9012");
        assert_eq!(card.grouped_number(), "4532 1234 5678 9012");
        assert!(card.is_well_formed());
    }

    #[test]
    fn test_malformed_card_detected() {
        assert!(!sample_card("4532 1234 5678", "123").is_well_formed());
        assert!(!sample_card("4532123456789012", "12a").is_well_formed());
    }

    #[test]
    fn test_cvv_is_redacted_in_debug_output() {
        let card = sample_card("4532123456789012", "987");
        let debug = format!("{:?}", card);

        assert!(!debug.contains("987"));
        assert_eq!(card.reveal_cvv(), "987");
    }

    #[test]
    fn test_card_profile_accepts_backend_payload() {
        let card: CardProfile = serde_json::from_value(serde_json::json!({
            "card_number": "4532123456789012",
            "card_holder_name": "RAKESH VERMA",
            "expiry_date": "12/28",
            "cvv": "123",
            "card_type": "visa",
            "available_limit": 65000,
            "total_outstanding": 0,
            "next_statement_date": "2024-02-25",
            "unspent_amount": 0
        }))
        .unwrap();

        assert_eq!(card.available_limit, 65000);
        assert_eq!(card.masked_number(), "************9012");
    }

    #[test]
    fn test_transaction_accepts_both_dialects() {
        let backend: Transaction = serde_json::from_value(serde_json::json!({
            "id": "TXN_001",
            "merchant": "Uber",
            "amount": 100,
            "date": "2024-01-15",
            "type": "ride",
            "status": "completed",
            "token_used": true,
            "token_reference_id": "TKN_UBER_001"
        }))
        .unwrap();
        assert_eq!(backend.category, "ride");
        assert!(backend.token_used);

        let legacy: Transaction = serde_json::from_value(serde_json::json!({
            "transaction_id": 2,
            "merchant_name": "Amazon",
            "amount": 250,
            "transaction_date": "2024-01-14",
            "transaction_type": "shopping",
            "status": "completed"
        }))
        .unwrap();
        assert_eq!(legacy.id, "2");
        assert_eq!(legacy.merchant, "Amazon");
        assert_eq!(legacy.date, NaiveDate::from_ymd_opt(2024, 1, 14).unwrap());
        assert_eq!(legacy.token_reference_id, None);
    }
}
