use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::data_source::{DataSource, DataSourceError};
use crate::models::{MerchantApp, MerchantAppId, TokenRecord, TokenStatus};

#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    #[error("Unknown merchant app {0}")]
    UnknownApp(MerchantAppId),

    #[error("Merchant app {0} has no token on file")]
    NoToken(MerchantAppId),

    #[error("No disable confirmation pending for merchant app {0}")]
    NotPending(MerchantAppId),

    #[error(transparent)]
    DataSource(#[from] DataSourceError),
}

/// Result of asking to flip a token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Enabled,
    /// Disabling waits for [`TokenRegistry::confirm_disable`]
    ConfirmationRequired,
}

/// Token state of one merchant app as shown on the management view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEntry {
    pub app_id: MerchantAppId,
    pub app_name: String,
    pub icon: String,
    pub category: String,
    pub token_reference_id: Option<String>,
    pub status: Option<TokenStatus>,
    pub active: bool,
    pub last_used: Option<DateTime<Utc>>,
    /// Set for apps provisioned in the run that led to this view
    pub is_new: bool,
}

impl TokenEntry {
    pub fn last_used_label(&self) -> String {
        match self.last_used {
            Some(at) => at.format("%d %b %Y").to_string(),
            None => "Never".to_string(),
        }
    }

    pub fn has_token(&self) -> bool {
        self.token_reference_id.is_some()
    }
}

/// One entry per known merchant app plus a single pending-disable slot.
///
/// Activation changes go to the data source first and are applied locally
/// only once it acknowledges them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRegistry {
    entries: Vec<TokenEntry>,
    pending_disable: Option<MerchantAppId>,
}

impl TokenRegistry {
    pub fn initialize(
        known_apps: &[MerchantApp],
        just_provisioned: &[MerchantAppId],
        tokens: &[TokenRecord],
    ) -> Self {
        let entries = known_apps
            .iter()
            .map(|app| {
                let record = preferred_record(app.id, known_apps, tokens);
                let is_new = just_provisioned.contains(&app.id);

                TokenEntry {
                    app_id: app.id,
                    app_name: app.name.clone(),
                    icon: app.icon.clone(),
                    category: app.category.clone(),
                    token_reference_id: record.map(|r| r.token_reference_id.clone()),
                    status: record.map(|r| r.token_status),
                    active: is_new || record.is_some_and(|r| r.token_status.is_active()),
                    last_used: record.and_then(|r| r.last_used_timestamp),
                    is_new,
                }
            })
            .collect();

        Self {
            entries,
            pending_disable: None,
        }
    }

    /// Builds the registry from the data source's catalog and token list
    pub async fn load(
        data_source: &dyn DataSource,
        card_identifier: &str,
        just_provisioned: &[MerchantAppId],
    ) -> Result<Self, DataSourceError> {
        let (apps, tokens) = tokio::try_join!(
            data_source.get_available_merchants(),
            data_source.list_user_tokens(card_identifier),
        )?;

        tracing::debug!(
            apps = apps.len(),
            tokens = tokens.len(),
            just_provisioned = just_provisioned.len(),
            "Token registry loaded"
        );

        Ok(Self::initialize(&apps, just_provisioned, &tokens))
    }

    pub fn entries(&self) -> &[TokenEntry] {
        &self.entries
    }

    pub fn entry(&self, app_id: MerchantAppId) -> Option<&TokenEntry> {
        self.entries.iter().find(|entry| entry.app_id == app_id)
    }

    pub fn pending_disable(&self) -> Option<&TokenEntry> {
        self.pending_disable.and_then(|app_id| self.entry(app_id))
    }

    pub fn active_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.active).count()
    }

    pub fn total(&self) -> usize {
        self.entries.len()
    }

    /// Enables an inactive token right away; an active one only gets a
    /// pending confirmation, replacing any earlier one.
    pub async fn request_toggle(
        &mut self,
        app_id: MerchantAppId,
        data_source: &dyn DataSource,
    ) -> Result<ToggleOutcome, RegistryError> {
        let entry = self.entry(app_id).ok_or(RegistryError::UnknownApp(app_id))?;

        if entry.active {
            self.pending_disable = Some(app_id);
            return Ok(ToggleOutcome::ConfirmationRequired);
        }

        let token_reference_id = entry
            .token_reference_id
            .clone()
            .ok_or(RegistryError::NoToken(app_id))?;

        self.commit_status(app_id, &token_reference_id, TokenStatus::Active, data_source)
            .await?;
        Ok(ToggleOutcome::Enabled)
    }

    /// Disables the token awaiting confirmation. The confirmation is consumed
    /// whether or not the data source accepts the change.
    pub async fn confirm_disable(
        &mut self,
        app_id: MerchantAppId,
        data_source: &dyn DataSource,
    ) -> Result<(), RegistryError> {
        if self.pending_disable != Some(app_id) {
            return Err(RegistryError::NotPending(app_id));
        }
        self.pending_disable = None;

        let token_reference_id = self
            .entry(app_id)
            .ok_or(RegistryError::UnknownApp(app_id))?
            .token_reference_id
            .clone()
            .ok_or(RegistryError::NoToken(app_id))?;

        self.commit_status(app_id, &token_reference_id, TokenStatus::Inactive, data_source)
            .await
    }

    pub fn cancel_disable(&mut self) -> Option<MerchantAppId> {
        self.pending_disable.take()
    }

    /// Permanently removes the app's token
    pub async fn delete_token(
        &mut self,
        app_id: MerchantAppId,
        data_source: &dyn DataSource,
    ) -> Result<(), RegistryError> {
        let token_reference_id = self
            .entry(app_id)
            .ok_or(RegistryError::UnknownApp(app_id))?
            .token_reference_id
            .clone()
            .ok_or(RegistryError::NoToken(app_id))?;

        if let Err(e) = data_source.delete_token(&token_reference_id).await {
            tracing::warn!(app_id = %app_id, error = %e, "Token delete rejected, keeping local state");
            return Err(e.into());
        }

        if self.pending_disable == Some(app_id) {
            self.pending_disable = None;
        }
        if let Some(entry) = self.entry_mut(app_id) {
            entry.token_reference_id = None;
            entry.status = None;
            entry.active = false;
            entry.last_used = None;
            entry.is_new = false;
        }

        tracing::info!(app_id = %app_id, token = %token_reference_id, "Token deleted");
        Ok(())
    }

    async fn commit_status(
        &mut self,
        app_id: MerchantAppId,
        token_reference_id: &str,
        status: TokenStatus,
        data_source: &dyn DataSource,
    ) -> Result<(), RegistryError> {
        let ack = match data_source
            .update_token_status(token_reference_id, status)
            .await
        {
            Ok(ack) => ack,
            Err(e) => {
                tracing::warn!(
                    app_id = %app_id,
                    status = status.as_str(),
                    error = %e,
                    "Token status change rejected, keeping local state"
                );
                return Err(e.into());
            }
        };

        let status = ack.token_status.unwrap_or(status);
        if let Some(entry) = self.entry_mut(app_id) {
            entry.status = Some(status);
            entry.active = status.is_active();
        }

        tracing::info!(
            app_id = %app_id,
            token = %token_reference_id,
            status = status.as_str(),
            "Token status changed"
        );
        Ok(())
    }

    fn entry_mut(&mut self, app_id: MerchantAppId) -> Option<&mut TokenEntry> {
        self.entries.iter_mut().find(|entry| entry.app_id == app_id)
    }
}

/// An app can carry several records; the active one wins, then the newest.
fn preferred_record<'a>(
    app_id: MerchantAppId,
    known_apps: &[MerchantApp],
    tokens: &'a [TokenRecord],
) -> Option<&'a TokenRecord> {
    tokens
        .iter()
        .filter(|record| record.token_status != TokenStatus::Deleted)
        .filter(|record| record.resolve_app(known_apps) == Some(app_id))
        .max_by_key(|record| (record.token_status.is_active(), record.created_timestamp))
}
