use serde::{Deserialize, Serialize};

use crate::ids::{ClaimId, ReportId};
use crate::types::{AnalysisResult, Claim};

/// POST /upload_report response.
///
/// Some service builds run extraction as part of the upload and return the
/// claims inline.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadReportResponse {
    pub report_id: ReportId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claims: Option<Vec<Claim>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// POST /extract_claims request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExtractClaimsRequest {
    pub report_id: ReportId,
}

/// POST /extract_claims response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExtractClaimsResponse {
    pub claims: Vec<Claim>,
}

/// POST /verify_evidence request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerifyEvidenceRequest {
    pub report_id: ReportId,
    pub claim_ids: Vec<ClaimId>,
}

/// POST /verify_evidence response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerifyEvidenceResponse {
    pub verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// POST /analyze request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub report_id: ReportId,
    pub top_k: u32,
    pub max_claims: u32,
}

/// POST /analyze response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub report: AnalysisResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A downloaded report, ready to be written out under `file_name`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadedReport {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl DownloadedReport {
    /// The file name offered for a download: `report_{report_id}.{format}`.
    ///
    /// Both parts come from outside the client, so anything other than ASCII
    /// alphanumerics, `-`, `_` and `.` is replaced with `_`. The result never
    /// contains a path separator.
    pub fn file_name_for(report_id: &ReportId, format: &str) -> String {
        format!(
            "report_{}.{}",
            sanitize_component(report_id.as_str()),
            sanitize_component(format)
        )
    }
}

fn sanitize_component(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Formats the service is known to render. Others are passed through and
/// left for the service to reject.
pub const KNOWN_EXPORT_FORMATS: [&str; 3] = ["md", "json", "pdf"];

pub fn is_known_export_format(format: &str) -> bool {
    KNOWN_EXPORT_FORMATS.contains(&format)
}
