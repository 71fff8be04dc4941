use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::MissedTickBehavior,
};

use super::data_source::{DataSource, DataSourceError};
use super::selection::SelectionSet;
use crate::models::{
    MerchantApp, MerchantAppId, ProvisioningRequest, ProvisioningStatus, ResultStatus,
};

pub const PHASES: [Phase; 4] = [
    Phase::Initializing,
    Phase::GeneratingTokens,
    Phase::Provisioning,
    Phase::Finalizing,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Initializing,
    GeneratingTokens,
    Provisioning,
    Finalizing,
}

impl Phase {
    pub fn index(self) -> usize {
        match self {
            Phase::Initializing => 0,
            Phase::GeneratingTokens => 1,
            Phase::Provisioning => 2,
            Phase::Finalizing => 3,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Phase::Initializing => "Initializing secure connection",
            Phase::GeneratingTokens => "Generating secure tokens",
            Phase::Provisioning => "Provisioning to selected apps",
            Phase::Finalizing => "Finalizing setup",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SequencerConfig {
    /// Split evenly across the four phases
    pub total_duration: Duration,
    pub poll_interval: Duration,
    /// Status polls before still-pending apps are reported as failed
    pub max_polls: u32,
}

impl SequencerConfig {
    pub fn step_duration(&self) -> Duration {
        (self.total_duration / PHASES.len() as u32).max(Duration::from_millis(1))
    }
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            total_duration: Duration::from_millis(6000),
            poll_interval: Duration::from_millis(500),
            max_polls: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppOutcome {
    pub app_id: MerchantAppId,
    pub succeeded: bool,
    pub token_reference_id: Option<String>,
}

/// Emitted exactly once per successful run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub request_id: String,
    pub selection: SelectionSet,
    pub outcomes: Vec<AppOutcome>,
}

impl Completion {
    pub fn provisioned_ids(&self) -> Vec<MerchantAppId> {
        self.outcomes
            .iter()
            .filter(|o| o.succeeded)
            .map(|o| o.app_id)
            .collect()
    }

    pub fn failed_ids(&self) -> Vec<MerchantAppId> {
        self.outcomes
            .iter()
            .filter(|o| !o.succeeded)
            .map(|o| o.app_id)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequencerEvent {
    PhaseEntered(Phase),
    AppResolved(AppOutcome),
    Completed(Completion),
    Failed(DataSourceError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed(Completion),
    Failed(DataSourceError),
}

/// Latest view of a run, for rendering
#[derive(Debug, Clone)]
pub struct RunSnapshot {
    pub phase: Phase,
    pub progress: u8,
    pub resolved: Vec<AppOutcome>,
    pub status: RunStatus,
}

impl RunSnapshot {
    fn starting() -> Self {
        Self {
            phase: Phase::Initializing,
            progress: 0,
            resolved: Vec::new(),
            status: RunStatus::Running,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self.status, RunStatus::Running)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SequencerError {
    #[error("No merchant apps selected")]
    EmptySelection,

    #[error("A provisioning run is already in flight for this session")]
    AlreadyRunning,
}

/// Drives a push through four fixed-length phases.
///
/// The push request is created while generating tokens and its status is
/// polled during provisioning until every selected app resolves. Each phase
/// still occupies at least its share of the total budget.
#[derive(Clone)]
pub struct ProvisioningSequencer {
    data_source: Arc<dyn DataSource>,
    config: SequencerConfig,
}

impl ProvisioningSequencer {
    pub fn new(data_source: Arc<dyn DataSource>, config: SequencerConfig) -> Self {
        Self {
            data_source,
            config,
        }
    }

    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    /// Spawns a run for `selection`. An empty selection never starts.
    ///
    /// `catalog` is used to match provisioning results back to app ids.
    pub fn start(
        &self,
        selection: SelectionSet,
        catalog: Vec<MerchantApp>,
    ) -> Result<SequencerHandle, SequencerError> {
        if selection.is_empty() {
            tracing::warn!("Provisioning requested with empty selection");
            return Err(SequencerError::EmptySelection);
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(RunSnapshot::starting());

        tracing::info!(apps = selection.count(), "Starting provisioning run");

        let run = Run {
            data_source: self.data_source.clone(),
            config: self.config.clone(),
            selection,
            catalog,
            events: events_tx,
            snapshot: snapshot_tx,
        };

        Ok(SequencerHandle {
            events: events_rx,
            snapshot: snapshot_rx,
            task: tokio::spawn(run.drive()),
        })
    }
}

/// Owner of a running sequence. Dropping it cancels the run, so no phase
/// transition fires after the owner is gone.
pub struct SequencerHandle {
    events: mpsc::UnboundedReceiver<SequencerEvent>,
    snapshot: watch::Receiver<RunSnapshot>,
    task: JoinHandle<()>,
}

impl SequencerHandle {
    pub async fn next_event(&mut self) -> Option<SequencerEvent> {
        self.events.recv().await
    }

    pub fn snapshot(&self) -> RunSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the terminal event
    pub async fn wait(mut self) -> Result<Completion, DataSourceError> {
        while let Some(event) = self.next_event().await {
            match event {
                SequencerEvent::Completed(completion) => return Ok(completion),
                SequencerEvent::Failed(e) => return Err(e),
                SequencerEvent::PhaseEntered(_) | SequencerEvent::AppResolved(_) => {}
            }
        }

        Err(DataSourceError::request_failed(
            "provisioning",
            "run stopped before completing",
        ))
    }

    pub fn cancel(self) {
        tracing::debug!("Provisioning run cancelled");
    }
}

impl Drop for SequencerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct Run {
    data_source: Arc<dyn DataSource>,
    config: SequencerConfig,
    selection: SelectionSet,
    catalog: Vec<MerchantApp>,
    events: mpsc::UnboundedSender<SequencerEvent>,
    snapshot: watch::Sender<RunSnapshot>,
}

impl Run {
    async fn drive(self) {
        let mut ticker = tokio::time::interval(self.config.step_duration());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut created: Option<ProvisioningRequest> = None;

        for phase in PHASES {
            ticker.tick().await;
            self.enter(phase);

            let step = match phase {
                Phase::GeneratingTokens => self
                    .data_source
                    .create_push_provisioning_request(&self.selection.to_vec())
                    .await
                    .map(|request| created = Some(request)),
                Phase::Provisioning => match created.as_ref() {
                    Some(request) => self.await_results(request).await,
                    None => Ok(()),
                },
                Phase::Initializing | Phase::Finalizing => Ok(()),
            };

            if let Err(e) = step {
                self.fail(e);
                return;
            }
        }

        // Finalizing gets its full slot before the hand-off
        ticker.tick().await;

        let request_id = created.map(|request| request.request_id).unwrap_or_default();
        self.complete(request_id);
    }

    async fn await_results(&self, created: &ProvisioningRequest) -> Result<(), DataSourceError> {
        let mut latest = created.clone();
        let mut polls = 0;

        while !latest.status.is_terminal() && polls < self.config.max_polls {
            if polls > 0 {
                tokio::time::sleep(self.config.poll_interval).await;
            }
            latest = self
                .data_source
                .get_push_provisioning_status(&created.request_id)
                .await?;
            polls += 1;
        }

        if !latest.status.is_terminal() {
            tracing::warn!(
                request_id = %created.request_id,
                polls,
                "Provisioning still pending, unresolved apps reported as failed"
            );
        }

        // The backend only reports per-app results when the push is created
        let results = if latest.results.is_empty() {
            &created.results
        } else {
            &latest.results
        };

        for app_id in self.selection.iter() {
            let result = results.iter().find(|result| {
                result.merchant_app_id == Some(app_id)
                    || result.resolve_app(&self.catalog) == Some(app_id)
            });

            let succeeded = latest.status == ProvisioningStatus::Completed
                && result.is_some_and(|result| result.status == ResultStatus::Success);

            self.resolve(AppOutcome {
                app_id,
                succeeded,
                token_reference_id: result.and_then(|result| result.token_reference_id.clone()),
            });
        }

        Ok(())
    }

    fn enter(&self, phase: Phase) {
        let progress = (phase.index() * 100 / PHASES.len()) as u8;
        tracing::debug!(?phase, progress, "Provisioning phase entered");

        self.snapshot.send_modify(|snapshot| {
            snapshot.phase = phase;
            snapshot.progress = progress;
        });
        let _ = self.events.send(SequencerEvent::PhaseEntered(phase));
    }

    fn resolve(&self, outcome: AppOutcome) {
        tracing::info!(
            app_id = %outcome.app_id,
            succeeded = outcome.succeeded,
            "Merchant app resolved"
        );

        self.snapshot
            .send_modify(|snapshot| snapshot.resolved.push(outcome.clone()));
        let _ = self.events.send(SequencerEvent::AppResolved(outcome));
    }

    fn complete(self, request_id: String) {
        let outcomes = self.snapshot.borrow().resolved.clone();
        let completion = Completion {
            request_id,
            selection: self.selection.clone(),
            outcomes,
        };

        tracing::info!(
            request_id = %completion.request_id,
            provisioned = completion.provisioned_ids().len(),
            failed = completion.failed_ids().len(),
            "Provisioning run completed"
        );

        self.snapshot.send_modify(|snapshot| {
            snapshot.progress = 100;
            snapshot.status = RunStatus::Completed(completion.clone());
        });
        let _ = self.events.send(SequencerEvent::Completed(completion));
    }

    fn fail(self, error: DataSourceError) {
        tracing::error!(error = %error, "Provisioning run failed");

        self.snapshot
            .send_modify(|snapshot| snapshot.status = RunStatus::Failed(error.clone()));
        let _ = self.events.send(SequencerEvent::Failed(error));
    }
}
