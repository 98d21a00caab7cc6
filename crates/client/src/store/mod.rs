use rebuttal_common::types::{AnalysisResult, Claim, Stage};
use rebuttal_common::{ClaimId, ReportId};

/// The workflow's single source of truth for remote results.
///
/// Every write replaces a whole field. Writes that change an upstream
/// entity clear everything derived from it, so the store never holds a
/// verification flag or analysis for a claim set it no longer has.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResultStore {
    report_id: Option<ReportId>,
    claims: Vec<Claim>,
    evidence_verified: bool,
    analysis: Option<AnalysisResult>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report_id(&self) -> Option<&ReportId> {
        self.report_id.as_ref()
    }

    pub fn claims(&self) -> &[Claim] {
        &self.claims
    }

    pub fn claim_ids(&self) -> Vec<ClaimId> {
        self.claims.iter().map(|c| c.claim_id.clone()).collect()
    }

    pub fn evidence_verified(&self) -> bool {
        self.evidence_verified
    }

    pub fn analysis(&self) -> Option<&AnalysisResult> {
        self.analysis.as_ref()
    }

    /// Record a newly uploaded report, dropping everything derived from the
    /// previous one.
    pub fn set_report(&mut self, report_id: ReportId) {
        self.report_id = Some(report_id);
        self.claims.clear();
        self.evidence_verified = false;
        self.analysis = None;
    }

    /// Replace the claim set. Verification and analysis refer to the old set
    /// and are invalidated.
    pub fn replace_claims(&mut self, claims: Vec<Claim>) {
        self.claims = claims;
        self.evidence_verified = false;
        self.analysis = None;
    }

    pub fn set_evidence_verified(&mut self, verified: bool) {
        self.evidence_verified = verified;
    }

    /// Store an analysis result. Rejected, leaving the store untouched, when
    /// any entry refers to a claim outside the current set; the offending
    /// ids are returned.
    pub fn set_analysis(&mut self, analysis: AnalysisResult) -> Result<(), Vec<ClaimId>> {
        let dangling = analysis.dangling_claim_ids(&self.claims);
        if !dangling.is_empty() {
            return Err(dangling);
        }
        self.analysis = Some(analysis);
        Ok(())
    }

    /// Drop everything. Only a new session does this.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// May `stage` be entered (and may "previous" step back into it)?
    pub fn entry_guard(&self, stage: Stage) -> bool {
        match stage {
            Stage::Upload => true,
            Stage::Extract => self.report_id.is_some(),
            Stage::Verify => !self.claims.is_empty(),
            Stage::Rebuttal => self.evidence_verified,
            Stage::Export => self.analysis.is_some(),
        }
    }

    /// Has `stage` produced what the next stage needs? Export is terminal and
    /// never completes.
    pub fn is_stage_complete(&self, stage: Stage) -> bool {
        match stage {
            Stage::Upload => self.report_id.is_some(),
            Stage::Extract => !self.claims.is_empty(),
            Stage::Verify => self.evidence_verified,
            Stage::Rebuttal => self.analysis.is_some(),
            Stage::Export => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rebuttal_common::types::{AnalysisSummary, ClaimAnalysis, ClaimType, Coverage};

    fn claims() -> Vec<Claim> {
        vec![
            Claim::new("C1", "Inflated revenue", ClaimType::Accounting).with_pages([1]),
            Claim::new("C2", "Hidden related party", ClaimType::RelatedParty).with_pages([2, 3]),
        ]
    }

    fn analysis_for(ids: &[&str]) -> AnalysisResult {
        AnalysisResult {
            report_id: ReportId::new("r1"),
            generated_at: Utc::now(),
            summary: AnalysisSummary {
                total_claims: ids.len() as u32,
                not_addressed: ids.len() as u32,
                ..Default::default()
            },
            claim_analyses: ids
                .iter()
                .map(|id| ClaimAnalysis {
                    claim_id: ClaimId::new(*id),
                    coverage: Coverage::NotAddressed,
                    confidence: 20,
                    reasoning: "- none found".into(),
                    citations: vec![],
                    gaps: vec![],
                    recommended_actions: vec![],
                })
                .collect(),
        }
    }

    fn populated() -> ResultStore {
        let mut store = ResultStore::new();
        store.set_report(ReportId::new("r1"));
        store.replace_claims(claims());
        store.set_evidence_verified(true);
        store.set_analysis(analysis_for(&["C1", "C2"])).unwrap();
        store
    }

    #[test]
    fn test_guards_follow_entities() {
        let mut store = ResultStore::new();
        assert!(store.entry_guard(Stage::Upload));
        assert!(!store.entry_guard(Stage::Extract));
        assert!(!store.is_stage_complete(Stage::Upload));

        store.set_report(ReportId::new("r1"));
        assert!(store.is_stage_complete(Stage::Upload));
        assert!(store.entry_guard(Stage::Extract));
        assert!(!store.entry_guard(Stage::Verify));

        store.replace_claims(claims());
        assert!(store.is_stage_complete(Stage::Extract));
        assert!(store.entry_guard(Stage::Verify));
        assert!(!store.entry_guard(Stage::Rebuttal));

        store.set_evidence_verified(true);
        assert!(store.entry_guard(Stage::Rebuttal));
        assert!(!store.entry_guard(Stage::Export));

        store.set_analysis(analysis_for(&["C1"])).unwrap();
        assert!(store.entry_guard(Stage::Export));
        assert!(!store.is_stage_complete(Stage::Export));
    }

    #[test]
    fn test_new_report_cascades() {
        let mut store = populated();
        store.set_report(ReportId::new("r2"));

        assert_eq!(store.report_id().map(|r| r.as_str()), Some("r2"));
        assert!(store.claims().is_empty());
        assert!(!store.evidence_verified());
        assert!(store.analysis().is_none());
        for stage in Stage::Upload.downstream() {
            assert!(!store.is_stage_complete(stage), "{stage} still complete");
        }
    }

    #[test]
    fn test_replacing_claims_invalidates_derived_state() {
        let mut store = populated();
        store.replace_claims(claims());

        assert_eq!(store.claims().len(), 2);
        assert!(!store.evidence_verified());
        assert!(store.analysis().is_none());
    }

    #[test]
    fn test_analysis_with_unknown_claims_rejected() {
        let mut store = populated();
        let before = store.clone();

        let err = store.set_analysis(analysis_for(&["C1", "C7"])).unwrap_err();
        assert_eq!(err, vec![ClaimId::new("C7")]);
        assert_eq!(store, before);
    }
}
