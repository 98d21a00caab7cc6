use serde::{Deserialize, Serialize};

use crate::ids::ClaimId;

/// Category the extraction service assigns to a claim.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimType {
    Accounting,
    BusinessModel,
    Fraud,
    RelatedParty,
    Guidance,
    Metrics,
    /// Anything the service labels outside the known set.
    #[serde(other)]
    Other,
}

/// One atomic factual assertion extracted from a short report.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub claim_id: ClaimId,
    pub claim_text: String,
    pub claim_type: ClaimType,
    /// Pages of the source report the claim originates from.
    #[serde(default)]
    pub page_numbers: Vec<u32>,
}

impl Claim {
    pub fn new(claim_id: impl Into<ClaimId>, claim_text: impl Into<String>, claim_type: ClaimType) -> Self {
        Self {
            claim_id: claim_id.into(),
            claim_text: claim_text.into(),
            claim_type,
            page_numbers: Vec::new(),
        }
    }

    pub fn with_pages(mut self, pages: impl IntoIterator<Item = u32>) -> Self {
        self.page_numbers = pages.into_iter().collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_wire_format() {
        let json = r#"{
            "claim_id": "C001",
            "claim_text": "Revenue is overstated by 40%",
            "claim_type": "accounting",
            "page_numbers": [1, 2]
        }"#;
        let claim: Claim = serde_json::from_str(json).unwrap();
        assert_eq!(claim.claim_id.as_str(), "C001");
        assert_eq!(claim.claim_type, ClaimType::Accounting);
        assert_eq!(claim.page_numbers, vec![1, 2]);
    }

    #[test]
    fn test_unknown_claim_type_maps_to_other() {
        let json = r#"{"claim_id": "C9", "claim_text": "x", "claim_type": "esg"}"#;
        let claim: Claim = serde_json::from_str(json).unwrap();
        assert_eq!(claim.claim_type, ClaimType::Other);
        assert!(claim.page_numbers.is_empty());
    }
}
