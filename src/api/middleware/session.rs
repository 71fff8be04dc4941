use std::{collections::HashMap, sync::Arc};
use tokio::{sync::Mutex, time::Instant};
use tower_sessions::{Expiry, MemoryStore, Session, SessionManagerLayer};
use uuid::Uuid;

use crate::config::Config;
use crate::services::{
    mock::MockDataSource,
    remote::RemoteDataSource,
    sequencer::RunSnapshot,
    ProvisioningSequencer, RoutedDataSource, SelectionSet, SequencerError, SequencerHandle,
};

/// Finished runs nobody came back for are dropped after this long
const STALE_RUN_AFTER: std::time::Duration = std::time::Duration::from_secs(10 * 60);

/// Session keys used in the application
pub const SESSION_KEY_VIEWER_ID: &str = "viewer_id";
pub const SESSION_KEY_SELECTION: &str = "selection";
pub const SESSION_KEY_OUTCOMES: &str = "provisioning_outcomes";
pub const SESSION_KEY_JUST_PROVISIONED: &str = "just_provisioned";
pub const SESSION_KEY_TOKEN_REGISTRY: &str = "token_registry";

/// Creates a session layer for Axum
pub fn create_session_layer(secure: bool) -> SessionManagerLayer<MemoryStore> {
    SessionManagerLayer::new(MemoryStore::default())
        .with_secure(secure)
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::hours(24)))
}

/// Application state shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub data_source: Arc<RoutedDataSource>,
    pub sequencer: ProvisioningSequencer,
    pub runs: ProvisioningRuns,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let data_source = RoutedDataSource::new(
            RemoteDataSource::new(&config.backend_url, config.card_identifier.clone())
                .with_request_timeout(config.request_timeout()),
            MockDataSource::new(config.mock_latency),
            config.probe_timeout(),
            config.route_ttl(),
        );

        Self::with_data_source(config, Arc::new(data_source))
    }

    pub fn with_data_source(config: Config, data_source: Arc<RoutedDataSource>) -> Self {
        let sequencer = ProvisioningSequencer::new(data_source.clone(), config.sequencer());

        Self {
            config,
            data_source,
            sequencer,
            runs: ProvisioningRuns::default(),
        }
    }
}

/// The views of the flow, used to decide what entering one tears down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    CardDetails,
    MerchantApps,
    Loading,
    Success,
    ManageTokens,
}

/// Stable id for the browser session, created on first use
pub async fn viewer_id(session: &Session) -> Result<Uuid, tower_sessions::session::Error> {
    if let Some(id) = session.get::<Uuid>(SESSION_KEY_VIEWER_ID).await? {
        return Ok(id);
    }

    let id = Uuid::new_v4();
    session.insert(SESSION_KEY_VIEWER_ID, id).await?;
    Ok(id)
}

/// Tears down whatever the previous view left running.
///
/// Any view but the loading screen cancels an in-flight provisioning run, and
/// any view but token management unmounts the token registry.
pub async fn enter_view(
    state: &AppState,
    session: &Session,
    view: View,
) -> Result<Uuid, tower_sessions::session::Error> {
    let viewer = viewer_id(session).await?;

    if view != View::Loading && state.runs.cancel(viewer).await {
        tracing::info!(viewer = %viewer, ?view, "Left loading view, provisioning run cancelled");
    }
    if view != View::ManageTokens {
        session
            .remove::<serde_json::Value>(SESSION_KEY_TOKEN_REGISTRY)
            .await?;
    }

    Ok(viewer)
}

struct ActiveRun {
    selection: SelectionSet,
    handle: SequencerHandle,
    started_at: Instant,
}

impl ActiveRun {
    fn is_stale(&self, now: Instant) -> bool {
        self.handle.snapshot().is_terminal()
            && now.duration_since(self.started_at) >= STALE_RUN_AFTER
    }
}

/// In-flight provisioning runs keyed by viewer id. At most one per viewer.
#[derive(Clone, Default)]
pub struct ProvisioningRuns {
    inner: Arc<Mutex<HashMap<Uuid, ActiveRun>>>,
}

impl ProvisioningRuns {
    pub async fn is_running(&self, viewer: Uuid) -> bool {
        self.inner
            .lock()
            .await
            .get(&viewer)
            .is_some_and(|run| !run.handle.snapshot().is_terminal())
    }

    /// Registers a started run. A second run for the same viewer is refused
    /// and dropped, which cancels it. Stale finished runs of any viewer are
    /// pruned on the way.
    pub async fn insert(
        &self,
        viewer: Uuid,
        selection: SelectionSet,
        handle: SequencerHandle,
    ) -> Result<(), SequencerError> {
        let mut runs = self.inner.lock().await;

        let now = Instant::now();
        let before = runs.len();
        runs.retain(|_, run| !run.is_stale(now));
        if runs.len() < before {
            tracing::debug!(pruned = before - runs.len(), "Dropped unclaimed finished runs");
        }

        if runs
            .get(&viewer)
            .is_some_and(|run| !run.handle.snapshot().is_terminal())
        {
            tracing::warn!(viewer = %viewer, "Provisioning already in flight, new run dropped");
            return Err(SequencerError::AlreadyRunning);
        }

        runs.insert(
            viewer,
            ActiveRun {
                selection,
                handle,
                started_at: now,
            },
        );
        Ok(())
    }

    pub async fn snapshot(&self, viewer: Uuid) -> Option<RunSnapshot> {
        self.inner
            .lock()
            .await
            .get(&viewer)
            .map(|run| run.handle.snapshot())
    }

    /// Removes and returns a run that reached a terminal state
    pub async fn take_finished(&self, viewer: Uuid) -> Option<(SelectionSet, RunSnapshot)> {
        let mut runs = self.inner.lock().await;

        let snapshot = runs.get(&viewer)?.handle.snapshot();
        if !snapshot.is_terminal() {
            return None;
        }

        runs.remove(&viewer).map(|run| (run.selection, snapshot))
    }

    pub async fn count(&self) -> usize {
        self.inner.lock().await.len()
    }

    /// Drops the viewer's run, aborting it if still in flight
    pub async fn cancel(&self, viewer: Uuid) -> bool {
        match self.inner.lock().await.remove(&viewer) {
            Some(run) => {
                run.handle.cancel();
                true
            }
            None => false,
        }
    }
}
