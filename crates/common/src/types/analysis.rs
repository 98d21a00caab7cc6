use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ClaimId, ReportId};
use crate::types::Claim;

/// How well the internal evidence addresses a claim.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Coverage {
    FullyAddressed,
    PartiallyAddressed,
    NotAddressed,
}

impl Coverage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FullyAddressed => "fully_addressed",
            Self::PartiallyAddressed => "partially_addressed",
            Self::NotAddressed => "not_addressed",
        }
    }
}

/// A retrieved evidence snippet backing a claim analysis.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub doc_id: String,
    pub doc_title: String,
    pub chunk_id: String,
    pub quote: String,
    /// Vector similarity in [0, 1]. Older service builds omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_score: Option<f64>,
}

/// The rebuttal verdict for one claim.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClaimAnalysis {
    pub claim_id: ClaimId,
    pub coverage: Coverage,
    /// 0–100.
    pub confidence: u8,
    pub reasoning: String,
    #[serde(default)]
    pub citations: Vec<Citation>,
    /// Missing evidence types. The service sends `null` when fully addressed.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub gaps: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub recommended_actions: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub total_claims: u32,
    pub fully_addressed: u32,
    pub partially_addressed: u32,
    pub not_addressed: u32,
    #[serde(default)]
    pub average_confidence: f64,
    #[serde(default)]
    pub key_gaps: Vec<String>,
    #[serde(default)]
    pub priority_actions: Vec<String>,
}

/// The full rebuttal report produced by the generate-rebuttal operation.
///
/// Rendered markdown/JSON bodies the service may inline are ignored; the
/// export stage downloads those separately.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub report_id: ReportId,
    #[serde(default = "Utc::now")]
    pub generated_at: DateTime<Utc>,
    pub summary: AnalysisSummary,
    #[serde(default)]
    pub claim_analyses: Vec<ClaimAnalysis>,
}

impl AnalysisResult {
    /// Look up the claim an analysis entry refers to.
    pub fn claim_for<'a>(&self, analysis: &ClaimAnalysis, claims: &'a [Claim]) -> Option<&'a Claim> {
        claims.iter().find(|c| c.claim_id == analysis.claim_id)
    }

    /// Analysis entries whose claim id is not in `claims`.
    pub fn dangling_claim_ids(&self, claims: &[Claim]) -> Vec<ClaimId> {
        let known: HashSet<&ClaimId> = claims.iter().map(|c| &c.claim_id).collect();
        self.claim_analyses
            .iter()
            .filter(|a| !known.contains(&a.claim_id))
            .map(|a| a.claim_id.clone())
            .collect()
    }

    /// Recount coverage verdicts from the per-claim entries.
    pub fn tally(&self) -> (u32, u32, u32) {
        self.claim_analyses
            .iter()
            .fold((0, 0, 0), |(full, partial, none), a| match a.coverage {
                Coverage::FullyAddressed => (full + 1, partial, none),
                Coverage::PartiallyAddressed => (full, partial + 1, none),
                Coverage::NotAddressed => (full, partial, none + 1),
            })
    }

    /// Whether the summary counts agree with the per-claim entries.
    pub fn summary_consistent(&self) -> bool {
        let (full, partial, none) = self.tally();
        self.summary.total_claims as usize == self.claim_analyses.len()
            && self.summary.fully_addressed == full
            && self.summary.partially_addressed == partial
            && self.summary.not_addressed == none
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<Vec<String>>::deserialize(deserializer).map(Option::unwrap_or_default)
}
