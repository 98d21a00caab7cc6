use serde::{Deserialize, Serialize};

/// The five workflow stages, in their fixed precedence order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Send the report file to the service.
    Upload,
    /// Extract discrete claims from the uploaded report.
    Extract,
    /// Check the claim set against the internal evidence corpus.
    Verify,
    /// Generate the rebuttal analysis. Never auto-started.
    Rebuttal,
    /// Download the rendered report. Terminal.
    Export,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Upload,
        Stage::Extract,
        Stage::Verify,
        Stage::Rebuttal,
        Stage::Export,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn next(self) -> Option<Stage> {
        Self::ALL.get(self.index() + 1).copied()
    }

    pub fn previous(self) -> Option<Stage> {
        self.index().checked_sub(1).map(|i| Self::ALL[i])
    }

    /// Stages strictly after this one.
    pub fn downstream(self) -> impl Iterator<Item = Stage> {
        Self::ALL.into_iter().skip(self.index() + 1)
    }

    /// Whether the service gives no incremental progress for this stage's operation.
    pub fn has_synthetic_progress(self) -> bool {
        matches!(self, Self::Extract | Self::Verify | Self::Rebuttal)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Extract => "extract",
            Self::Verify => "verify",
            Self::Rebuttal => "rebuttal",
            Self::Export => "export",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
