use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable merchant app identifier, the join key between selection,
/// provisioning results and token records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MerchantAppId(pub u32);

impl fmt::Display for MerchantAppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerchantApp {
    pub id: MerchantAppId,
    pub name: String,
    /// Network-side merchant identifier (e.g. `VISA_MERCHANT_001`)
    #[serde(default)]
    pub merchant_id: Option<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default, alias = "hasToken")]
    pub has_token: bool,
}

/// Response body of `GET /push-provisioning/merchants`
#[derive(Debug, Deserialize)]
pub struct MerchantCatalog {
    pub merchants: Vec<MerchantApp>,
    #[serde(default)]
    pub total_count: Option<usize>,
}

/// Resolves a wire record to a known app.
///
/// Matches on app id first, then network merchant id, then display name
/// (case-insensitive), because the backends disagree on which of these they send.
pub fn resolve_app<'a>(
    apps: &'a [MerchantApp],
    merchant_app_id: Option<MerchantAppId>,
    merchant_id: Option<&str>,
    merchant_name: Option<&str>,
) -> Option<&'a MerchantApp> {
    if let Some(id) = merchant_app_id {
        if let Some(app) = apps.iter().find(|app| app.id == id) {
            return Some(app);
        }
    }

    if let Some(merchant_id) = merchant_id {
        if let Some(app) = apps
            .iter()
            .find(|app| app.merchant_id.as_deref() == Some(merchant_id))
        {
            return Some(app);
        }
    }

    merchant_name.and_then(|name| {
        apps.iter()
            .find(|app| app.name.eq_ignore_ascii_case(name.trim()))
    })
}
