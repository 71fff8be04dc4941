use askama::Template;
use axum::{
    extract::{Path, State},
    response::Redirect,
    routing::{get, post},
    Router,
};
use tower_sessions::Session;

use crate::api::middleware::session::{enter_view, AppState, View, SESSION_KEY_SELECTION};
use crate::error::{AppError, Result};
use crate::models::{MerchantApp, MerchantAppId};
use crate::services::{DataSource, SelectionSet};

struct AppRow {
    app: MerchantApp,
    selected: bool,
}

#[derive(Template)]
#[template(path = "merchants/select.html")]
struct SelectAppsTemplate {
    apps: Vec<AppRow>,
    selected_count: usize,
    all_selected: bool,
}

async fn current_selection(session: &Session) -> Result<SelectionSet> {
    Ok(session
        .get::<SelectionSet>(SESSION_KEY_SELECTION)
        .await?
        .unwrap_or_default())
}

async fn catalog(state: &AppState) -> Result<Vec<MerchantApp>> {
    state
        .data_source
        .get_available_merchants()
        .await
        .map_err(|e| AppError::retry(e, "/merchant-apps"))
}

/// App catalog with the session's selection
async fn select_apps(
    State(state): State<AppState>,
    session: Session,
) -> Result<SelectAppsTemplate> {
    enter_view(&state, &session, View::MerchantApps).await?;

    let apps = catalog(&state).await?;
    let selection = current_selection(&session).await?;
    session.insert(SESSION_KEY_SELECTION, &selection).await?;

    let rows: Vec<AppRow> = apps
        .into_iter()
        .map(|app| AppRow {
            selected: selection.contains(app.id),
            app,
        })
        .collect();

    Ok(SelectAppsTemplate {
        all_selected: !rows.is_empty() && rows.iter().all(|row| row.selected),
        selected_count: selection.count(),
        apps: rows,
    })
}

/// Flips one app in the selection; ids outside the catalog are rejected
async fn toggle_app(
    State(state): State<AppState>,
    Path(app_id): Path<u32>,
    session: Session,
) -> Result<Redirect> {
    let app_id_known = catalog(&state)
        .await?
        .iter()
        .any(|app| app.id == MerchantAppId(app_id));
    if !app_id_known {
        tracing::warn!(app_id, "Toggle for an app outside the catalog");
        return Err(AppError::NotFound(format!("merchant app {}", app_id)));
    }

    let mut selection = current_selection(&session).await?;
    let selected = selection.toggle(MerchantAppId(app_id));
    session.insert(SESSION_KEY_SELECTION, &selection).await?;

    tracing::debug!(app_id, selected, count = selection.count(), "Selection toggled");
    Ok(Redirect::to("/merchant-apps"))
}

async fn select_all(State(state): State<AppState>, session: Session) -> Result<Redirect> {
    let known: Vec<MerchantAppId> = catalog(&state).await?.iter().map(|app| app.id).collect();

    let mut selection = current_selection(&session).await?;
    selection.select_all(&known);
    session.insert(SESSION_KEY_SELECTION, &selection).await?;

    tracing::debug!(count = selection.count(), "Select all toggled");
    Ok(Redirect::to("/merchant-apps"))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/merchant-apps", get(select_apps))
        .route("/merchant-apps/toggle/:id", post(toggle_app))
        .route("/merchant-apps/select-all", post(select_all))
}
