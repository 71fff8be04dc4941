use askama::Template;
use axum::{
    extract::{Path, State},
    response::Redirect,
    routing::{get, post},
    Router,
};
use tower_sessions::Session;

use crate::api::middleware::session::{
    enter_view, AppState, View, SESSION_KEY_JUST_PROVISIONED, SESSION_KEY_TOKEN_REGISTRY,
};
use crate::error::{AppError, Result};
use crate::models::MerchantAppId;
use crate::services::{token_registry::TokenEntry, TokenRegistry, ToggleOutcome};

#[derive(Template)]
#[template(path = "tokens/manage.html")]
struct ManageTokensTemplate {
    entries: Vec<TokenEntry>,
    active_count: usize,
    total: usize,
    pending: Option<TokenEntry>,
}

/// Registry mounted by the management view, if any
async fn mounted(session: &Session) -> Result<Option<TokenRegistry>> {
    Ok(session
        .get::<TokenRegistry>(SESSION_KEY_TOKEN_REGISTRY)
        .await?)
}

async fn store(session: &Session, registry: &TokenRegistry) -> Result<()> {
    session
        .insert(SESSION_KEY_TOKEN_REGISTRY, registry)
        .await?;
    Ok(())
}

/// Token management view. Mounting reads the data source; apps from the
/// last provisioning run are flagged as new.
async fn manage_tokens(
    State(state): State<AppState>,
    session: Session,
) -> Result<ManageTokensTemplate> {
    enter_view(&state, &session, View::ManageTokens).await?;

    let registry = match mounted(&session).await? {
        Some(registry) => registry,
        None => {
            let just_provisioned = session
                .get::<Vec<MerchantAppId>>(SESSION_KEY_JUST_PROVISIONED)
                .await?
                .unwrap_or_default();

            let registry = TokenRegistry::load(
                &*state.data_source,
                &state.config.card_identifier,
                &just_provisioned,
            )
            .await
            .map_err(|e| AppError::retry(e, "/manage-tokens"))?;

            // The "new" markers are shown once
            session
                .remove::<Vec<MerchantAppId>>(SESSION_KEY_JUST_PROVISIONED)
                .await?;
            store(&session, &registry).await?;
            registry
        }
    };

    Ok(ManageTokensTemplate {
        active_count: registry.active_count(),
        total: registry.total(),
        pending: registry.pending_disable().cloned(),
        entries: registry.entries().to_vec(),
    })
}

async fn toggle_token(
    State(state): State<AppState>,
    Path(app_id): Path<u32>,
    session: Session,
) -> Result<Redirect> {
    let Some(mut registry) = mounted(&session).await? else {
        return Ok(Redirect::to("/manage-tokens"));
    };

    let outcome = registry
        .request_toggle(MerchantAppId(app_id), &*state.data_source)
        .await;
    store(&session, &registry).await?;

    if outcome? == ToggleOutcome::ConfirmationRequired {
        tracing::debug!(app_id, "Disable awaiting confirmation");
    }
    Ok(Redirect::to("/manage-tokens"))
}

async fn confirm_disable(State(state): State<AppState>, session: Session) -> Result<Redirect> {
    let Some(mut registry) = mounted(&session).await? else {
        return Ok(Redirect::to("/manage-tokens"));
    };
    let Some(app_id) = registry.pending_disable().map(|entry| entry.app_id) else {
        return Ok(Redirect::to("/manage-tokens"));
    };

    let result = registry
        .confirm_disable(app_id, &*state.data_source)
        .await;
    store(&session, &registry).await?;

    result?;
    Ok(Redirect::to("/manage-tokens"))
}

async fn cancel_disable(session: Session) -> Result<Redirect> {
    if let Some(mut registry) = mounted(&session).await? {
        registry.cancel_disable();
        store(&session, &registry).await?;
    }
    Ok(Redirect::to("/manage-tokens"))
}

async fn delete_token(
    State(state): State<AppState>,
    Path(app_id): Path<u32>,
    session: Session,
) -> Result<Redirect> {
    let Some(mut registry) = mounted(&session).await? else {
        return Ok(Redirect::to("/manage-tokens"));
    };

    let result = registry
        .delete_token(MerchantAppId(app_id), &*state.data_source)
        .await;
    store(&session, &registry).await?;

    result?;
    Ok(Redirect::to("/manage-tokens"))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/manage-tokens", get(manage_tokens))
        .route("/manage-tokens/:id/toggle", post(toggle_token))
        .route("/manage-tokens/confirm", post(confirm_disable))
        .route("/manage-tokens/cancel", post(cancel_disable))
        .route("/manage-tokens/:id/delete", post(delete_token))
}
