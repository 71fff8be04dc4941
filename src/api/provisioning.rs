use askama::Template;
use axum::{
    extract::State,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Router,
};
use tower_sessions::Session;
use uuid::Uuid;

use crate::api::middleware::session::{
    enter_view, viewer_id, AppState, View, SESSION_KEY_JUST_PROVISIONED, SESSION_KEY_OUTCOMES,
    SESSION_KEY_SELECTION,
};
use crate::error::{AppError, Result};
use crate::models::MerchantAppId;
use crate::services::{
    sequencer::{AppOutcome, RunStatus, PHASES},
    DataSource, SelectionSet,
};

/// Seconds between refreshes of the loading view
const REFRESH_SECS: u64 = 1;

struct PhaseRow {
    title: &'static str,
    state: &'static str,
}

#[derive(Template)]
#[template(path = "provisioning/loading.html")]
struct LoadingTemplate {
    phases: Vec<PhaseRow>,
    progress: u8,
    resolved: usize,
    refresh_secs: u64,
}

struct OutcomeRow {
    name: String,
    icon: String,
    succeeded: bool,
    token_reference_id: Option<String>,
}

#[derive(Template)]
#[template(path = "provisioning/success.html")]
struct SuccessTemplate {
    outcomes: Vec<OutcomeRow>,
    provisioned_count: usize,
}

async fn start_run(state: &AppState, viewer: Uuid, selection: &SelectionSet) -> Result<()> {
    if state.runs.is_running(viewer).await {
        return Err(AppError::AlreadyRunning);
    }
    if selection.is_empty() {
        return Err(AppError::EmptySelection);
    }

    let catalog = state
        .data_source
        .get_available_merchants()
        .await
        .map_err(|e| AppError::retry(e, "/merchant-apps"))?;

    let handle = state.sequencer.start(selection.clone(), catalog)?;
    state.runs.insert(viewer, selection.clone(), handle).await?;
    Ok(())
}

/// Consumes the selection and starts a provisioning run for this viewer.
/// The selection goes back into the session when no run was started.
async fn push(State(state): State<AppState>, session: Session) -> Result<Redirect> {
    let viewer = viewer_id(&session).await?;

    let selection = session
        .remove::<SelectionSet>(SESSION_KEY_SELECTION)
        .await?
        .unwrap_or_default();

    if let Err(e) = start_run(&state, viewer, &selection).await {
        if !selection.is_empty() {
            session.insert(SESSION_KEY_SELECTION, &selection).await?;
        }
        return Err(e);
    }

    session
        .remove::<Vec<AppOutcome>>(SESSION_KEY_OUTCOMES)
        .await?;
    session
        .remove::<Vec<MerchantAppId>>(SESSION_KEY_JUST_PROVISIONED)
        .await?;

    Ok(Redirect::to("/loading-transition"))
}

/// Progress of the viewer's run; hands off to the success view once done
async fn loading(State(state): State<AppState>, session: Session) -> Result<Response> {
    let viewer = enter_view(&state, &session, View::Loading).await?;

    if let Some((selection, snapshot)) = state.runs.take_finished(viewer).await {
        return match snapshot.status {
            RunStatus::Completed(completion) => {
                session
                    .insert(SESSION_KEY_JUST_PROVISIONED, completion.provisioned_ids())
                    .await?;
                session
                    .insert(SESSION_KEY_OUTCOMES, &completion.outcomes)
                    .await?;
                Ok(Redirect::to("/success-state").into_response())
            }
            RunStatus::Failed(e) => {
                // Put the selection back so the retry is one click away
                session.insert(SESSION_KEY_SELECTION, &selection).await?;
                Err(AppError::retry(e, "/merchant-apps"))
            }
            RunStatus::Running => Ok(Redirect::to("/loading-transition").into_response()),
        };
    }

    let Some(snapshot) = state.runs.snapshot(viewer).await else {
        let finished = session
            .get::<Vec<AppOutcome>>(SESSION_KEY_OUTCOMES)
            .await?
            .is_some();
        let to = if finished { "/success-state" } else { "/merchant-apps" };
        return Ok(Redirect::to(to).into_response());
    };

    let current = snapshot.phase.index();
    let phases = PHASES
        .iter()
        .map(|phase| PhaseRow {
            title: phase.title(),
            state: match phase.index() {
                i if i < current => "done",
                i if i == current => "active",
                _ => "pending",
            },
        })
        .collect();

    Ok(LoadingTemplate {
        phases,
        progress: snapshot.progress,
        resolved: snapshot.resolved.len(),
        refresh_secs: REFRESH_SECS,
    }
    .into_response())
}

async fn success(State(state): State<AppState>, session: Session) -> Result<Response> {
    enter_view(&state, &session, View::Success).await?;

    let Some(outcomes) = session
        .get::<Vec<AppOutcome>>(SESSION_KEY_OUTCOMES)
        .await?
    else {
        return Ok(Redirect::to("/merchant-apps").into_response());
    };

    let catalog = state
        .data_source
        .get_available_merchants()
        .await
        .map_err(|e| AppError::retry(e, "/success-state"))?;

    let rows: Vec<OutcomeRow> = outcomes
        .into_iter()
        .map(|outcome| {
            let app = catalog.iter().find(|app| app.id == outcome.app_id);
            OutcomeRow {
                name: app
                    .map(|app| app.name.clone())
                    .unwrap_or_else(|| format!("App {}", outcome.app_id)),
                icon: app.map(|app| app.icon.clone()).unwrap_or_default(),
                succeeded: outcome.succeeded,
                token_reference_id: outcome.token_reference_id,
            }
        })
        .collect();

    Ok(SuccessTemplate {
        provisioned_count: rows.iter().filter(|row| row.succeeded).count(),
        outcomes: rows,
    }
    .into_response())
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/merchant-apps/push", post(push))
        .route("/loading-transition", get(loading))
        .route("/success-state", get(success))
}
