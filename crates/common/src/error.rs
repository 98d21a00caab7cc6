use thiserror::Error;

use crate::types::Stage;

/// Every failure the workflow can surface to the user.
///
/// Only one is shown at a time; the workflow keeps the most recent one in
/// its error slot until the next operation starts.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum WorkflowError {
    // --- Client-side validation (rejected before any remote call) ---
    #[error("Unsupported file type: {file_name} (allowed: {allowed})")]
    UnsupportedFileType { file_name: String, allowed: String },

    #[error("Invalid parameter: {detail}")]
    InvalidParameter { stage: Stage, detail: String },

    #[error("The {stage} stage is locked: {reason}")]
    StageLocked { stage: Stage, reason: &'static str },

    #[error("The {0} stage is already busy")]
    Busy(Stage),

    // --- Remote failures ---
    #[error("{}", timeout_message(*stage))]
    Timeout { stage: Stage },

    /// Service-reported failure. Displays the service's `detail` verbatim.
    #[error("{detail}")]
    Remote {
        stage: Stage,
        status: u16,
        detail: String,
    },

    #[error("{stage} request failed: {message}")]
    Transport { stage: Stage, message: String },

    /// The call succeeded but produced nothing usable (e.g. no claims).
    #[error("{detail}")]
    Unsuccessful { stage: Stage, detail: String },

    #[error("Analysis references claims that are not in the current claim set: {0}")]
    InconsistentAnalysis(String),
}

impl WorkflowError {
    /// The stage whose operation produced this error, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::UnsupportedFileType { .. } => Some(Stage::Upload),
            Self::StageLocked { stage, .. }
            | Self::Timeout { stage }
            | Self::Remote { stage, .. }
            | Self::Transport { stage, .. }
            | Self::Unsuccessful { stage, .. }
            | Self::InvalidParameter { stage, .. } => Some(*stage),
            Self::Busy(stage) => Some(*stage),
            Self::InconsistentAnalysis(_) => Some(Stage::Rebuttal),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Whether the error was raised locally, before anything was sent.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedFileType { .. }
                | Self::InvalidParameter { .. }
                | Self::StageLocked { .. }
                | Self::Busy(_)
        )
    }
}

fn timeout_message(stage: Stage) -> &'static str {
    match stage {
        Stage::Upload => "Upload timed out. Check the connection and try again.",
        Stage::Extract => "Claim extraction timed out. Try again or upload a shorter report.",
        Stage::Verify => "Evidence verification timed out. Try again.",
        Stage::Rebuttal => {
            "Rebuttal generation timed out. Retry later or reduce the number of claims analyzed."
        }
        Stage::Export => "Report download timed out. Try again.",
    }
}

/// Result type alias for workflow operations.
pub type Result<T> = std::result::Result<T, WorkflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_messages_are_stage_specific() {
        let extract = WorkflowError::Timeout { stage: Stage::Extract }.to_string();
        let rebuttal = WorkflowError::Timeout { stage: Stage::Rebuttal }.to_string();
        assert_ne!(extract, rebuttal);
        assert!(rebuttal.contains("reduce the number of claims"));
    }

    #[test]
    fn test_remote_detail_is_verbatim() {
        let err = WorkflowError::Remote {
            stage: Stage::Export,
            status: 400,
            detail: "Format must be 'md' or 'json'".into(),
        };
        assert_eq!(err.to_string(), "Format must be 'md' or 'json'");
        assert!(!err.is_validation());
        assert_eq!(err.stage(), Some(Stage::Export));
    }

    #[test]
    fn test_busy_message() {
        assert_eq!(
            WorkflowError::Busy(Stage::Verify).to_string(),
            "The verify stage is already busy"
        );
        assert_eq!(
            WorkflowError::Busy(Stage::Extract).to_string(),
            "The extract stage is already busy"
        );
    }

    #[test]
    fn test_invalid_parameter_belongs_to_its_stage() {
        let err = WorkflowError::InvalidParameter {
            stage: Stage::Rebuttal,
            detail: "top_k must be between 3 and 20, got 2".into(),
        };
        assert_eq!(err.stage(), Some(Stage::Rebuttal));
        assert!(err.is_validation());
        assert_eq!(err.to_string(), "Invalid parameter: top_k must be between 3 and 20, got 2");
    }
}
