use rebuttal_common::types::Stage;

use super::state_machine::WorkflowStateMachine;
use crate::store::ResultStore;

/// Decides whether entering the current stage should start its operation
/// without an explicit user action.
///
/// Extraction starts when a report is present but no claims are; verification
/// starts when claims are present but unverified. Rebuttal generation always
/// waits for the user. A stage that is already busy never triggers, so the
/// caller must claim the busy flag in the same critical section as
/// [`StageAutoAdvancer::evaluate`]. Once fired, a stage stays quiet until it
/// is entered again or its inputs change, so a failed operation is not
/// retried in a loop.
#[derive(Clone, Copy, Debug, Default)]
pub struct StageAutoAdvancer;

impl StageAutoAdvancer {
    pub fn evaluate(machine: &WorkflowStateMachine, store: &ResultStore) -> Option<Stage> {
        let stage = machine.current();
        if machine.is_busy(stage) || !machine.is_armed(stage) {
            return None;
        }

        let due = match stage {
            Stage::Extract => store.report_id().is_some() && store.claims().is_empty(),
            Stage::Verify => !store.claims().is_empty() && !store.evidence_verified(),
            Stage::Upload | Stage::Rebuttal | Stage::Export => false,
        };

        due.then_some(stage)
    }
}
