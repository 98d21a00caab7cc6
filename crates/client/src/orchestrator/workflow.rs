use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::Instrument;

use rebuttal_common::api::report::{
    is_known_export_format, DownloadedReport, UploadReportResponse, KNOWN_EXPORT_FORMATS,
};
use rebuttal_common::config::{ClientConfig, RebuttalDefaults};
use rebuttal_common::types::{AnalysisResult, AnalysisSummary, Stage};
use rebuttal_common::{ClaimId, ReportId, Result, SessionId, WorkflowError};

use super::auto_advance::StageAutoAdvancer;
use super::state_machine::{StageView, WorkflowStateMachine};
use crate::config::{MAX_CLAIMS_RANGE, TOP_K_RANGE};
use crate::gateway::{ApiGateway, GatewayError, ReportFile};
use crate::progress::{ProgressEstimator, ProgressTicker};
use crate::store::ResultStore;

/// Outcome of an operation that reached the service.
#[derive(Clone, Debug, PartialEq)]
pub enum Completion<T> {
    /// The result was written to the store.
    Applied(T),
    /// The stage was invalidated while the call was in flight; the result
    /// was discarded.
    Stale,
}

impl<T> Completion<T> {
    pub fn applied(self) -> Option<T> {
        match self {
            Self::Applied(value) => Some(value),
            Self::Stale => None,
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Self::Stale)
    }
}

/// Consistent copy of the whole workflow, for rendering.
#[derive(Clone, Debug)]
pub struct WorkflowSnapshot {
    pub session_id: SessionId,
    pub current: Stage,
    pub stages: Vec<StageView>,
    pub store: ResultStore,
    pub last_error: Option<WorkflowError>,
    pub can_advance: bool,
    pub can_go_back: bool,
}

impl WorkflowSnapshot {
    pub fn stage(&self, stage: Stage) -> &StageView {
        &self.stages[stage.index()]
    }
}

#[derive(Debug)]
struct WorkflowState {
    session_id: SessionId,
    machine: WorkflowStateMachine,
    store: ResultStore,
    last_error: Option<WorkflowError>,
}

struct Estimators {
    extract: ProgressEstimator,
    verify: ProgressEstimator,
    rebuttal: ProgressEstimator,
}

impl Estimators {
    fn for_stage(&self, stage: Stage) -> Option<&ProgressEstimator> {
        match stage {
            Stage::Extract => Some(&self.extract),
            Stage::Verify => Some(&self.verify),
            Stage::Rebuttal => Some(&self.rebuttal),
            Stage::Upload | Stage::Export => None,
        }
    }
}

struct Shared {
    gateway: ApiGateway,
    estimators: Estimators,
    allowed_extensions: Vec<String>,
    rebuttal_defaults: RebuttalDefaults,
    state: Mutex<WorkflowState>,
    /// Bumped after every state change.
    changes: watch::Sender<u64>,
}

/// An operation that has claimed its stage. Carries what is needed to tell
/// whether its result is still wanted when it completes.
struct Ticket {
    stage: Stage,
    epoch: u64,
    session_id: SessionId,
    progress: Option<ProgressTicker>,
}

impl Ticket {
    fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "operation",
            session_id = %self.session_id,
            stage = self.stage.as_str(),
            epoch = self.epoch
        )
    }
}

/// The workflow controller: owns the state machine and the result store
/// behind one lock, issues remote operations through the gateway, and runs
/// the auto-advance rule after every change.
///
/// Cloning is cheap; clones drive the same session. Operations must be
/// called from within a tokio runtime.
#[derive(Clone)]
pub struct Workflow {
    shared: Arc<Shared>,
}

impl Workflow {
    pub fn new(gateway: ApiGateway, config: &ClientConfig) -> Self {
        let session_id = SessionId::new();
        tracing::info!(session_id = %session_id, "Workflow session started");

        let (changes, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                gateway,
                estimators: Estimators {
                    extract: ProgressEstimator::new(config.progress.extract),
                    verify: ProgressEstimator::new(config.progress.verify),
                    rebuttal: ProgressEstimator::new(config.progress.rebuttal),
                },
                allowed_extensions: config
                    .upload
                    .allowed_extensions
                    .iter()
                    .map(|ext| ext.to_ascii_lowercase())
                    .collect(),
                rebuttal_defaults: config.rebuttal.clone(),
                state: Mutex::new(WorkflowState {
                    session_id,
                    machine: WorkflowStateMachine::new(),
                    store: ResultStore::new(),
                    last_error: None,
                }),
                changes,
            }),
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.lock().session_id
    }

    pub fn current_stage(&self) -> Stage {
        self.lock().machine.current()
    }

    pub fn last_error(&self) -> Option<WorkflowError> {
        self.lock().last_error.clone()
    }

    pub fn rebuttal_defaults(&self) -> &RebuttalDefaults {
        &self.shared.rebuttal_defaults
    }

    pub fn snapshot(&self) -> WorkflowSnapshot {
        let state = self.lock();
        WorkflowSnapshot {
            session_id: state.session_id,
            current: state.machine.current(),
            stages: Stage::ALL
                .iter()
                .map(|stage| state.machine.view(*stage, &state.store))
                .collect(),
            store: state.store.clone(),
            last_error: state.last_error.clone(),
            can_advance: state.machine.can_advance(&state.store),
            can_go_back: state.machine.can_go_back(&state.store),
        }
    }

    /// Receiver that is notified after every state change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.shared.changes.subscribe()
    }

    // --- Navigation ---

    /// Tab selection. Always allowed.
    pub fn select_stage(&self, stage: Stage) {
        self.lock().machine.select_stage(stage);
        self.notify();
        self.auto_advance();
    }

    /// Step forward. Fails without touching the error slot when the current
    /// stage has not completed.
    pub fn next(&self) -> Result<Stage> {
        let target = {
            let mut state = self.lock();
            let WorkflowState { machine, store, .. } = &mut *state;
            machine.next(store)?
        };
        self.notify();
        self.auto_advance();
        Ok(target)
    }

    /// Step back. Fails without touching the error slot when the previous
    /// stage's prerequisites no longer hold.
    pub fn previous(&self) -> Result<Stage> {
        let target = {
            let mut state = self.lock();
            let WorkflowState { machine, store, .. } = &mut *state;
            machine.previous(store)?
        };
        self.notify();
        self.auto_advance();
        Ok(target)
    }

    /// Start the current stage's operation in the background if its
    /// precondition holds. Returns the stage that was started.
    ///
    /// Runs automatically after every navigation and every completion;
    /// calling it again while the operation runs never starts a duplicate.
    pub fn auto_advance(&self) -> Option<Stage> {
        let (stage, ticket, report_id, claim_ids) = {
            let mut state = self.lock();
            let stage = StageAutoAdvancer::evaluate(&state.machine, &state.store)?;
            state.machine.disarm(stage);
            let (ticket, (report_id, claim_ids)) =
                match self.begin_locked(&mut state, stage, report_and_claims) {
                    Ok(started) => started,
                    Err(err) => {
                        tracing::warn!(stage = stage.as_str(), error = %err, "Auto-advance could not start");
                        return None;
                    }
                };
            (stage, ticket, report_id, claim_ids)
        };
        self.notify();

        tracing::info!(
            session_id = %ticket.session_id,
            stage = stage.as_str(),
            "Auto-advance started operation"
        );
        metrics::counter!("workflow.auto_advance", "stage" => stage.as_str()).increment(1);

        let workflow = self.clone();
        let span = ticket.span();
        tokio::spawn(
            async move {
                // Failures land in the error slot.
                let _ = if stage == Stage::Extract {
                    workflow.run_extract(ticket, report_id).await.map(|_| ())
                } else {
                    workflow
                        .run_verify(ticket, report_id, claim_ids)
                        .await
                        .map(|_| ())
                };
            }
            .instrument(span),
        );
        Some(stage)
    }

    /// Wait until `stage` has no operation in flight.
    pub async fn wait_idle(&self, stage: Stage) {
        let mut changes = self.subscribe();
        loop {
            if !self.lock().machine.is_busy(stage) {
                return;
            }
            if changes.changed().await.is_err() {
                return;
            }
        }
    }

    /// Discard all results and return to the upload stage. In-flight
    /// operations become stale.
    pub fn new_session(&self) -> SessionId {
        let session_id = {
            let mut state = self.lock();
            state.machine.reset();
            state.store.clear();
            state.last_error = None;
            state.session_id = SessionId::new();
            state.session_id
        };
        tracing::info!(session_id = %session_id, "New workflow session");
        self.notify();
        session_id
    }

    // --- Operations ---

    /// Upload a report. The extension is checked against the allow-list
    /// before anything is sent. Replaces any previous report and everything
    /// derived from it.
    pub async fn upload_report(&self, file: ReportFile) -> Result<Completion<ReportId>> {
        let allowed = file
            .extension()
            .is_some_and(|ext| self.shared.allowed_extensions.contains(&ext));
        if !allowed {
            return Err(self.fail_fast(WorkflowError::UnsupportedFileType {
                file_name: file.file_name.clone(),
                allowed: self.shared.allowed_extensions.join(", "),
            }));
        }

        let (ticket, ()) = self.begin(Stage::Upload, |_| Some(()))?;
        let span = ticket.span();
        async {
            tracing::info!(file_name = %file.file_name, bytes = file.bytes.len(), "Uploading report");
            let result = self.shared.gateway.upload_report(&file).await;
            self.finish(ticket, result, apply_upload)
        }
        .instrument(span)
        .await
    }

    /// Extract claims from the uploaded report. Returns the claim count.
    pub async fn extract_claims(&self) -> Result<Completion<usize>> {
        let (ticket, report_id) = self.begin(Stage::Extract, |store| store.report_id().cloned())?;
        let span = ticket.span();
        self.run_extract(ticket, report_id).instrument(span).await
    }

    pub async fn verify_evidence(&self) -> Result<Completion<()>> {
        let (ticket, (report_id, claim_ids)) = self.begin(Stage::Verify, report_and_claims)?;
        let span = ticket.span();
        self.run_verify(ticket, report_id, claim_ids)
            .instrument(span)
            .await
    }

    /// Generate the rebuttal analysis. `top_k` must lie in 3..=20 and
    /// `max_claims` in 5..=50; out-of-range values are rejected locally.
    pub async fn generate_rebuttal(
        &self,
        top_k: u32,
        max_claims: u32,
    ) -> Result<Completion<AnalysisSummary>> {
        if !TOP_K_RANGE.contains(&top_k) {
            return Err(self.fail_fast(WorkflowError::InvalidParameter {
                stage: Stage::Rebuttal,
                detail: format!(
                    "top_k must be between {} and {}, got {}",
                    TOP_K_RANGE.start(),
                    TOP_K_RANGE.end(),
                    top_k
                ),
            }));
        }
        if !MAX_CLAIMS_RANGE.contains(&max_claims) {
            return Err(self.fail_fast(WorkflowError::InvalidParameter {
                stage: Stage::Rebuttal,
                detail: format!(
                    "max_claims must be between {} and {}, got {}",
                    MAX_CLAIMS_RANGE.start(),
                    MAX_CLAIMS_RANGE.end(),
                    max_claims
                ),
            }));
        }

        let (ticket, report_id) = self.begin(Stage::Rebuttal, |store| store.report_id().cloned())?;
        let span = ticket.span();
        async {
            tracing::info!(report_id = %report_id, top_k, max_claims, "Generating rebuttal");
            let result = self
                .shared
                .gateway
                .generate_rebuttal(&report_id, top_k, max_claims)
                .await;
            self.finish(ticket, result, apply_analysis)
        }
        .instrument(span)
        .await
    }

    /// [`Workflow::generate_rebuttal`] with the configured defaults.
    pub async fn generate_rebuttal_with_defaults(&self) -> Result<Completion<AnalysisSummary>> {
        let RebuttalDefaults { top_k, max_claims } = self.shared.rebuttal_defaults.clone();
        self.generate_rebuttal(top_k, max_claims).await
    }

    /// Download the analysis rendered as `format`. Unknown formats are
    /// passed through and left for the service to reject.
    pub async fn export(&self, format: &str) -> Result<Completion<DownloadedReport>> {
        if !is_known_export_format(format) {
            tracing::warn!(
                format,
                known = ?KNOWN_EXPORT_FORMATS,
                "Unknown export format, leaving it to the service"
            );
        }
        let (ticket, report_id) = self.begin(Stage::Export, |store| store.report_id().cloned())?;
        let span = ticket.span();
        async {
            tracing::info!(report_id = %report_id, format, "Downloading report");
            let result = self.shared.gateway.download_report(&report_id, format).await;
            self.finish(ticket, result, |_, report| Ok(report))
        }
        .instrument(span)
        .await
    }

    async fn run_extract(&self, ticket: Ticket, report_id: ReportId) -> Result<Completion<usize>> {
        tracing::info!(report_id = %report_id, "Extracting claims");
        let result = self.shared.gateway.extract_claims(&report_id).await;
        self.finish(ticket, result, |state, claims| {
            if claims.is_empty() {
                return Err(WorkflowError::Unsuccessful {
                    stage: Stage::Extract,
                    detail: "No claims were extracted from the report".into(),
                });
            }
            let count = claims.len();
            state.store.replace_claims(claims);
            state.machine.invalidate_downstream(Stage::Extract);
            tracing::info!(count, "Claims extracted");
            Ok(count)
        })
    }

    async fn run_verify(
        &self,
        ticket: Ticket,
        report_id: ReportId,
        claim_ids: Vec<ClaimId>,
    ) -> Result<Completion<()>> {
        tracing::info!(report_id = %report_id, claims = claim_ids.len(), "Verifying evidence");
        let result = self
            .shared
            .gateway
            .verify_evidence(&report_id, &claim_ids)
            .await;
        self.finish(ticket, result, |state, response| {
            if !response.verified {
                return Err(WorkflowError::Unsuccessful {
                    stage: Stage::Verify,
                    detail: response
                        .message
                        .unwrap_or_else(|| "Evidence could not be verified".into()),
                });
            }
            state.store.set_evidence_verified(true);
            state.machine.invalidate_downstream(Stage::Verify);
            Ok(())
        })
    }

    // --- Bookkeeping ---

    fn begin<I>(
        &self,
        stage: Stage,
        inputs: impl FnOnce(&ResultStore) -> Option<I>,
    ) -> Result<(Ticket, I)> {
        let started = {
            let mut state = self.lock();
            let started = self.begin_locked(&mut state, stage, inputs);
            if let Err(err) = &started {
                record_failure(&mut state, err);
            }
            started
        };
        self.notify();
        started
    }

    /// Check the stage's guard, claim its busy flag and capture the
    /// operation's inputs, all under the caller's lock.
    fn begin_locked<I>(
        &self,
        state: &mut WorkflowState,
        stage: Stage,
        inputs: impl FnOnce(&ResultStore) -> Option<I>,
    ) -> Result<(Ticket, I)> {
        let locked = WorkflowError::StageLocked {
            stage,
            reason: missing_prerequisite(stage),
        };
        if !state.store.entry_guard(stage) {
            return Err(locked);
        }
        let inputs = inputs(&state.store).ok_or(locked)?;
        let epoch = state.machine.begin_operation(stage)?;

        state.last_error = None;
        let progress = self
            .shared
            .estimators
            .for_stage(stage)
            .map(|estimator| estimator.start(Arc::clone(state.machine.stage(stage).progress())));

        metrics::counter!("workflow.operations.started", "stage" => stage.as_str()).increment(1);
        tracing::debug!(stage = stage.as_str(), epoch, "Operation started");

        Ok((
            Ticket {
                stage,
                epoch,
                session_id: state.session_id,
                progress,
            },
            inputs,
        ))
    }

    /// Apply an operation's result if it is still current, then re-run the
    /// auto-advance rule.
    fn finish<T, U>(
        &self,
        ticket: Ticket,
        result: std::result::Result<T, GatewayError>,
        apply: impl FnOnce(&mut WorkflowState, T) -> Result<U>,
    ) -> Result<Completion<U>> {
        let Ticket {
            stage,
            epoch,
            progress,
            ..
        } = ticket;

        let outcome = {
            let mut state = self.lock();
            if !state.machine.finish_operation(stage, epoch) {
                drop(progress);
                metrics::counter!("workflow.operations.stale", "stage" => stage.as_str())
                    .increment(1);
                tracing::info!(stage = stage.as_str(), epoch, "Discarded stale result");
                return Ok(Completion::Stale);
            }

            let outcome = result
                .map_err(|e| e.into_workflow_error(stage))
                .and_then(|value| apply(&mut *state, value));

            match &outcome {
                Ok(_) => {
                    if let Some(progress) = progress {
                        progress.succeed();
                    }
                    metrics::counter!("workflow.operations.completed", "stage" => stage.as_str())
                        .increment(1);
                    tracing::info!(stage = stage.as_str(), "Operation completed");
                }
                Err(err) => {
                    if let Some(progress) = progress {
                        progress.fail();
                    }
                    record_failure(&mut state, err);
                }
            }
            outcome
        };

        self.notify();
        self.auto_advance();
        outcome.map(Completion::Applied)
    }

    /// Record a failure raised before any remote call.
    fn fail_fast(&self, err: WorkflowError) -> WorkflowError {
        record_failure(&mut self.lock(), &err);
        self.notify();
        err
    }

    fn notify(&self) {
        self.shared.changes.send_modify(|version| *version += 1);
    }

    fn lock(&self) -> MutexGuard<'_, WorkflowState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn record_failure(state: &mut WorkflowState, err: &WorkflowError) {
    let stage = err.stage().map(|s| s.as_str()).unwrap_or("none");
    metrics::counter!("workflow.operations.failed", "stage" => stage).increment(1);
    tracing::warn!(stage, error = %err, validation = err.is_validation(), "Operation failed");
    state.last_error = Some(err.clone());
}

fn report_and_claims(store: &ResultStore) -> Option<(ReportId, Vec<ClaimId>)> {
    Some((store.report_id()?.clone(), store.claim_ids()))
}

fn missing_prerequisite(stage: Stage) -> &'static str {
    match stage {
        Stage::Upload => "uploads are always allowed",
        Stage::Extract => "no report has been uploaded",
        Stage::Verify => "no claims have been extracted",
        Stage::Rebuttal => "evidence has not been verified",
        Stage::Export => "no rebuttal analysis exists",
    }
}

fn apply_upload(state: &mut WorkflowState, response: UploadReportResponse) -> Result<ReportId> {
    let UploadReportResponse {
        report_id, claims, ..
    } = response;

    state.store.set_report(report_id.clone());
    state.machine.invalidate_downstream(Stage::Upload);
    tracing::info!(report_id = %report_id, "Report uploaded");

    if let Some(claims) = claims.filter(|claims| !claims.is_empty()) {
        tracing::info!(count = claims.len(), "Upload returned claims inline");
        state.store.replace_claims(claims);
    }
    Ok(report_id)
}

fn apply_analysis(state: &mut WorkflowState, analysis: AnalysisResult) -> Result<AnalysisSummary> {
    if !analysis.summary_consistent() {
        tracing::warn!("Analysis summary does not match its per-claim coverage");
    }
    let summary = analysis.summary.clone();
    state.store.set_analysis(analysis).map_err(|dangling| {
        WorkflowError::InconsistentAnalysis(
            dangling
                .iter()
                .map(ClaimId::as_str)
                .collect::<Vec<_>>()
                .join(", "),
        )
    })?;
    state.machine.invalidate_downstream(Stage::Rebuttal);
    tracing::info!(
        total_claims = summary.total_claims,
        average_confidence = summary.average_confidence,
        "Rebuttal analysis stored"
    );
    Ok(summary)
}
