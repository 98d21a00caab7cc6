mod auto_advance;
mod state_machine;
mod workflow;

pub use auto_advance::StageAutoAdvancer;
pub use state_machine::{StageState, StageView, WorkflowStateMachine};
pub use workflow::{Completion, Workflow, WorkflowSnapshot};
