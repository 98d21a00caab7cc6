use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde_json::Value;

use rebuttal_common::api::health::{HealthStatus, IndexOutcome};
use rebuttal_common::api::report::{
    AnalyzeRequest, AnalyzeResponse, DownloadedReport, ExtractClaimsRequest,
    ExtractClaimsResponse, UploadReportResponse, VerifyEvidenceRequest, VerifyEvidenceResponse,
};
use rebuttal_common::config::{ClientConfig, ServiceConfig, VerificationConfig, VerificationMode};
use rebuttal_common::types::{AnalysisResult, Claim};
use rebuttal_common::{ClaimId, ReportId};

use super::{GatewayError, Operation, ReportFile, ReportService};

/// [`ReportService`] over JSON/HTTP (multipart for upload).
pub struct HttpReportService {
    http: reqwest::Client,
    service: ServiceConfig,
    verification: VerificationConfig,
}

impl HttpReportService {
    pub fn new(config: &ClientConfig) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("rebuttal-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GatewayError::Transport {
                operation: Operation::Health,
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            http,
            service: config.service.clone(),
            verification: config.verification.clone(),
        })
    }
}

#[async_trait]
impl ReportService for HttpReportService {
    async fn upload_report(&self, file: &ReportFile) -> Result<UploadReportResponse, GatewayError> {
        let op = Operation::UploadReport;
        let part = Part::bytes(file.bytes.clone()).file_name(file.file_name.clone());
        let form = Form::new().part("file", part);

        let response = self
            .http
            .post(self.service.api_url("/upload_report"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| send_error(op, e))?;

        read_json(op, response).await
    }

    async fn extract_claims(&self, report_id: &ReportId) -> Result<Vec<Claim>, GatewayError> {
        let op = Operation::ExtractClaims;
        let response = self
            .http
            .post(self.service.api_url("/extract_claims"))
            .json(&ExtractClaimsRequest {
                report_id: report_id.clone(),
            })
            .send()
            .await
            .map_err(|e| send_error(op, e))?;

        let body: ExtractClaimsResponse = read_json(op, response).await?;
        Ok(body.claims)
    }

    async fn verify_evidence(
        &self,
        report_id: &ReportId,
        claim_ids: &[ClaimId],
    ) -> Result<VerifyEvidenceResponse, GatewayError> {
        let op = Operation::VerifyEvidence;

        if self.verification.mode == VerificationMode::Simulated {
            // TODO: drop the simulated mode once /verify_evidence is deployed.
            tracing::debug!(
                report_id = %report_id,
                claims = claim_ids.len(),
                "Simulating evidence verification"
            );
            tokio::time::sleep(Duration::from_millis(self.verification.simulated_delay_ms)).await;
            return Ok(VerifyEvidenceResponse {
                verified: true,
                message: None,
            });
        }

        let response = self
            .http
            .post(self.service.api_url("/verify_evidence"))
            .json(&VerifyEvidenceRequest {
                report_id: report_id.clone(),
                claim_ids: claim_ids.to_vec(),
            })
            .send()
            .await
            .map_err(|e| send_error(op, e))?;

        read_json(op, response).await
    }

    async fn generate_rebuttal(&self, request: &AnalyzeRequest) -> Result<AnalysisResult, GatewayError> {
        let op = Operation::GenerateRebuttal;
        let response = self
            .http
            .post(self.service.api_url("/analyze"))
            .json(request)
            .send()
            .await
            .map_err(|e| send_error(op, e))?;

        let body: AnalyzeResponse = read_json(op, response).await?;
        Ok(body.report)
    }

    async fn download_report(
        &self,
        report_id: &ReportId,
        format: &str,
    ) -> Result<DownloadedReport, GatewayError> {
        let op = Operation::DownloadReport;
        let mut url = reqwest::Url::parse(&self.service.api_url("/download_report")).map_err(|e| {
            GatewayError::Transport {
                operation: op,
                message: format!("Invalid download URL: {}", e),
            }
        })?;
        // Service-assigned ids are opaque; push percent-encodes them as one segment.
        url.path_segments_mut()
            .map_err(|_| GatewayError::Transport {
                operation: op,
                message: "Service base URL cannot carry a path".into(),
            })?
            .push(report_id.as_str());

        let response = self
            .http
            .get(url)
            .query(&[("format", format)])
            .send()
            .await
            .map_err(|e| send_error(op, e))?;

        let response = check_status(op, response).await?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let bytes = response.bytes().await.map_err(|e| send_error(op, e))?;

        Ok(DownloadedReport {
            file_name: DownloadedReport::file_name_for(report_id, format),
            content_type,
            bytes: bytes.to_vec(),
        })
    }

    async fn health(&self) -> Result<HealthStatus, GatewayError> {
        let op = Operation::Health;
        let response = self
            .http
            .get(self.service.root_url("/health"))
            .send()
            .await
            .map_err(|e| send_error(op, e))?;

        read_json(op, response).await
    }

    async fn build_index(&self) -> Result<IndexOutcome, GatewayError> {
        let op = Operation::BuildIndex;
        let response = self
            .http
            .post(self.service.api_url("/check_and_index"))
            .send()
            .await
            .map_err(|e| send_error(op, e))?;

        read_json(op, response).await
    }
}

async fn read_json<T: DeserializeOwned>(
    operation: Operation,
    response: reqwest::Response,
) -> Result<T, GatewayError> {
    let response = check_status(operation, response).await?;
    let body = response
        .bytes()
        .await
        .map_err(|e| send_error(operation, e))?;

    serde_json::from_slice(&body).map_err(|e| GatewayError::Decode {
        operation,
        message: e.to_string(),
    })
}

/// Turn a non-2xx response into [`GatewayError::Remote`], keeping the
/// service's `detail` when the body has one.
async fn check_status(
    operation: Operation,
    response: reqwest::Response,
) -> Result<reqwest::Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(GatewayError::Remote {
        operation,
        status: status.as_u16(),
        detail: extract_detail(&body),
    })
}

/// `detail` is a string for handled errors and a list of field errors for
/// request validation failures.
fn extract_detail(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn send_error(operation: Operation, e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout { operation }
    } else {
        GatewayError::Transport {
            operation,
            message: e.to_string(),
        }
    }
}
