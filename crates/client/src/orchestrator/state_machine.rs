use std::sync::Arc;

use rebuttal_common::types::Stage;
use rebuttal_common::WorkflowError;

use crate::progress::SyntheticProgress;
use crate::store::ResultStore;

/// Bookkeeping for one stage.
#[derive(Debug)]
pub struct StageState {
    pub stage: Stage,
    busy: bool,
    /// Bumped whenever an operation starts or the stage is invalidated.
    /// A completion only applies if the epoch it started under is current.
    epoch: u64,
    /// Whether entering this stage may still auto-start its operation.
    /// Cleared when the auto-start fires; set again on stage entry or when
    /// the stage's inputs are invalidated.
    armed: bool,
    progress: Arc<SyntheticProgress>,
}

impl StageState {
    fn new(stage: Stage) -> Self {
        Self {
            stage,
            busy: false,
            epoch: 0,
            armed: true,
            progress: Arc::new(SyntheticProgress::new()),
        }
    }

    pub fn busy(&self) -> bool {
        self.busy
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn progress(&self) -> &Arc<SyntheticProgress> {
        &self.progress
    }
}

/// Render-ready view of one stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageView {
    pub stage: Stage,
    pub busy: bool,
    /// Entry guard holds.
    pub unlocked: bool,
    pub complete: bool,
    /// Synthetic progress, for the stages that have it.
    pub progress: Option<u8>,
}

/// The five-stage state machine: which stage is shown, which stages have an
/// operation in flight, and which moves between stages are allowed.
///
/// Tab selection is free so earlier or later state can always be inspected.
/// Stepping with next/previous is guarded so required work cannot be skipped.
#[derive(Debug)]
pub struct WorkflowStateMachine {
    current: Stage,
    stages: [StageState; 5],
}

impl Default for WorkflowStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowStateMachine {
    pub fn new() -> Self {
        Self {
            current: Stage::Upload,
            stages: Stage::ALL.map(StageState::new),
        }
    }

    pub fn current(&self) -> Stage {
        self.current
    }

    pub fn stage(&self, stage: Stage) -> &StageState {
        &self.stages[stage.index()]
    }

    fn stage_mut(&mut self, stage: Stage) -> &mut StageState {
        &mut self.stages[stage.index()]
    }

    /// Tab selection. Always allowed.
    pub fn select_stage(&mut self, target: Stage) {
        if target != self.current {
            tracing::debug!(from = self.current.as_str(), to = target.as_str(), "Stage selected");
            self.enter(target);
        }
    }

    fn enter(&mut self, target: Stage) {
        self.current = target;
        self.stage_mut(target).armed = true;
    }

    /// Whether the "next" control is enabled.
    pub fn can_advance(&self, store: &ResultStore) -> bool {
        self.current.next().is_some() && store.is_stage_complete(self.current)
    }

    /// Whether the "previous" control is enabled.
    pub fn can_go_back(&self, store: &ResultStore) -> bool {
        self.current
            .previous()
            .is_some_and(|prev| store.entry_guard(prev))
    }

    /// Step forward. Requires the current stage to be complete.
    pub fn next(&mut self, store: &ResultStore) -> Result<Stage, WorkflowError> {
        let Some(target) = self.current.next() else {
            return Err(WorkflowError::StageLocked {
                stage: self.current,
                reason: "this is the last stage",
            });
        };
        if !store.is_stage_complete(self.current) {
            return Err(WorkflowError::StageLocked {
                stage: target,
                reason: "the current stage has not completed",
            });
        }

        tracing::info!(from = self.current.as_str(), to = target.as_str(), "Advanced to next stage");
        self.enter(target);
        Ok(target)
    }

    /// Step back. Requires the previous stage's entry guard to hold.
    pub fn previous(&mut self, store: &ResultStore) -> Result<Stage, WorkflowError> {
        let Some(target) = self.current.previous() else {
            return Err(WorkflowError::StageLocked {
                stage: self.current,
                reason: "this is the first stage",
            });
        };
        if !store.entry_guard(target) {
            return Err(WorkflowError::StageLocked {
                stage: target,
                reason: "its prerequisites are no longer met",
            });
        }

        tracing::info!(from = self.current.as_str(), to = target.as_str(), "Stepped back");
        self.enter(target);
        Ok(target)
    }

    pub fn is_busy(&self, stage: Stage) -> bool {
        self.stage(stage).busy
    }

    /// The only writer of a stage's busy flag.
    fn mark_busy(&mut self, stage: Stage, busy: bool) {
        self.stage_mut(stage).busy = busy;
    }

    pub fn is_armed(&self, stage: Stage) -> bool {
        self.stage(stage).armed
    }

    /// Consume the stage's auto-start until it is entered or invalidated again.
    pub fn disarm(&mut self, stage: Stage) {
        self.stage_mut(stage).armed = false;
    }

    /// Claim `stage` for a new operation: fails if one is in flight,
    /// otherwise marks it busy and returns the operation's epoch.
    pub fn begin_operation(&mut self, stage: Stage) -> Result<u64, WorkflowError> {
        if self.is_busy(stage) {
            return Err(WorkflowError::Busy(stage));
        }
        self.mark_busy(stage, true);
        let state = self.stage_mut(stage);
        state.epoch += 1;
        Ok(state.epoch)
    }

    /// Release `stage` at the end of the operation started under `epoch`.
    /// Returns false, leaving the stage untouched, when that operation has
    /// been superseded; its result must then be discarded.
    pub fn finish_operation(&mut self, stage: Stage, epoch: u64) -> bool {
        if self.stage(stage).epoch != epoch {
            return false;
        }
        self.mark_busy(stage, false);
        true
    }

    /// Invalidate every stage after `from`: in-flight operations become
    /// stale, busy flags clear, progress resets.
    pub fn invalidate_downstream(&mut self, from: Stage) {
        for stage in from.downstream() {
            self.invalidate(stage);
        }
    }

    /// Return to a fresh session on the upload stage.
    pub fn reset(&mut self) {
        for stage in Stage::ALL {
            self.invalidate(stage);
        }
        self.current = Stage::Upload;
    }

    fn invalidate(&mut self, stage: Stage) {
        if self.is_busy(stage) {
            tracing::info!(stage = stage.as_str(), "In-flight operation invalidated");
        }
        self.mark_busy(stage, false);
        let state = self.stage_mut(stage);
        state.epoch += 1;
        state.armed = true;
        state.progress.reset();
    }

    pub fn view(&self, stage: Stage, store: &ResultStore) -> StageView {
        let state = self.stage(stage);
        StageView {
            stage,
            busy: state.busy,
            unlocked: store.entry_guard(stage),
            complete: store.is_stage_complete(stage),
            progress: stage
                .has_synthetic_progress()
                .then(|| state.progress.value()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rebuttal_common::types::{Claim, ClaimType};
    use rebuttal_common::ReportId;

    fn store_with_report() -> ResultStore {
        let mut store = ResultStore::new();
        store.set_report(ReportId::new("r1"));
        store
    }

    #[test]
    fn test_next_requires_completion() {
        let mut machine = WorkflowStateMachine::new();
        let mut store = ResultStore::new();

        assert!(!machine.can_advance(&store));
        assert!(matches!(
            machine.next(&store),
            Err(WorkflowError::StageLocked { stage: Stage::Extract, .. })
        ));
        assert_eq!(machine.current(), Stage::Upload);

        store.set_report(ReportId::new("r1"));
        assert!(machine.can_advance(&store));
        assert_eq!(machine.next(&store).unwrap(), Stage::Extract);

        // Extract has no claims yet.
        assert!(!machine.can_advance(&store));
    }

    #[test]
    fn test_tab_selection_is_unguarded() {
        let mut machine = WorkflowStateMachine::new();
        let store = ResultStore::new();

        machine.select_stage(Stage::Export);
        assert_eq!(machine.current(), Stage::Export);
        assert!(!machine.can_advance(&store));
        // Rebuttal's guard does not hold, so stepping back is disabled.
        assert!(!machine.can_go_back(&store));
        assert!(machine.previous(&store).is_err());
    }

    #[test]
    fn test_previous_checks_target_guard() {
        let mut machine = WorkflowStateMachine::new();
        let mut store = store_with_report();

        machine.select_stage(Stage::Verify);
        assert!(machine.can_go_back(&store));
        assert_eq!(machine.previous(&store).unwrap(), Stage::Extract);

        machine.select_stage(Stage::Rebuttal);
        assert!(!machine.can_go_back(&store), "no claims, cannot step into verify");

        store.replace_claims(vec![Claim::new("C1", "x", ClaimType::Other)]);
        assert!(machine.can_go_back(&store));

        machine.select_stage(Stage::Upload);
        assert!(machine.previous(&store).is_err());
    }

    #[test]
    fn test_last_stage_has_no_next() {
        let mut machine = WorkflowStateMachine::new();
        let store = ResultStore::new();
        machine.select_stage(Stage::Export);
        assert!(machine.next(&store).is_err());
    }

    #[test]
    fn test_busy_flag_blocks_second_operation() {
        let mut machine = WorkflowStateMachine::new();

        let epoch = machine.begin_operation(Stage::Extract).unwrap();
        assert!(machine.is_busy(Stage::Extract));
        assert_eq!(
            machine.begin_operation(Stage::Extract),
            Err(WorkflowError::Busy(Stage::Extract))
        );

        assert!(machine.finish_operation(Stage::Extract, epoch));
        assert!(!machine.is_busy(Stage::Extract));
        assert!(machine.begin_operation(Stage::Extract).is_ok());
    }

    #[test]
    fn test_invalidation_makes_in_flight_stale() {
        let mut machine = WorkflowStateMachine::new();
        let extract = machine.begin_operation(Stage::Extract).unwrap();
        let upload = machine.begin_operation(Stage::Upload).unwrap();

        machine.invalidate_downstream(Stage::Upload);
        assert!(!machine.is_busy(Stage::Extract));
        assert!(!machine.finish_operation(Stage::Extract, extract));

        // Upload itself is untouched.
        assert!(machine.is_busy(Stage::Upload));
        assert!(machine.finish_operation(Stage::Upload, upload));
    }

    #[test]
    fn test_view() {
        let machine = WorkflowStateMachine::new();
        let store = store_with_report();

        let upload = machine.view(Stage::Upload, &store);
        assert!(upload.complete);
        assert_eq!(upload.progress, None);

        let extract = machine.view(Stage::Extract, &store);
        assert!(extract.unlocked);
        assert!(!extract.complete);
        assert_eq!(extract.progress, Some(0));
    }

    #[test]
    fn test_arming() {
        let mut machine = WorkflowStateMachine::new();
        machine.select_stage(Stage::Extract);
        machine.disarm(Stage::Extract);

        // Re-selecting the shown stage is not an entry.
        machine.select_stage(Stage::Extract);
        assert!(!machine.is_armed(Stage::Extract));

        machine.select_stage(Stage::Upload);
        machine.select_stage(Stage::Extract);
        assert!(machine.is_armed(Stage::Extract));

        machine.disarm(Stage::Extract);
        machine.invalidate_downstream(Stage::Upload);
        assert!(machine.is_armed(Stage::Extract));
    }

    #[test]
    fn test_reset_returns_to_upload() {
        let mut machine = WorkflowStateMachine::new();
        machine.select_stage(Stage::Rebuttal);
        let epoch = machine.begin_operation(Stage::Rebuttal).unwrap();

        machine.reset();
        assert_eq!(machine.current(), Stage::Upload);
        assert!(!machine.finish_operation(Stage::Rebuttal, epoch));
    }
}
