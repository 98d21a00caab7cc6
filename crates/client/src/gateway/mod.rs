mod http;

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use rebuttal_common::api::health::{HealthStatus, IndexOutcome};
use rebuttal_common::api::report::{
    AnalyzeRequest, DownloadedReport, UploadReportResponse, VerifyEvidenceResponse,
};
use rebuttal_common::config::TimeoutConfig;
use rebuttal_common::types::{AnalysisResult, Claim, Stage};
use rebuttal_common::{ClaimId, ReportId, WorkflowError};

pub use http::HttpReportService;

/// Remote operations issued by the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    UploadReport,
    ExtractClaims,
    VerifyEvidence,
    GenerateRebuttal,
    DownloadReport,
    Health,
    BuildIndex,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UploadReport => "upload_report",
            Self::ExtractClaims => "extract_claims",
            Self::VerifyEvidence => "verify_evidence",
            Self::GenerateRebuttal => "generate_rebuttal",
            Self::DownloadReport => "download_report",
            Self::Health => "health",
            Self::BuildIndex => "build_index",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{operation} timed out")]
    Timeout { operation: Operation },

    #[error("{operation} rejected with status {status}: {}", detail.as_deref().unwrap_or("no detail"))]
    Remote {
        operation: Operation,
        status: u16,
        /// The service's `detail` field, when the error body carried one.
        detail: Option<String>,
    },

    #[error("{operation} transport error: {message}")]
    Transport { operation: Operation, message: String },

    #[error("{operation} returned an unreadable response: {message}")]
    Decode { operation: Operation, message: String },
}

impl GatewayError {
    /// Normalize into the user-facing error of the stage that issued the call.
    pub fn into_workflow_error(self, stage: Stage) -> WorkflowError {
        match self {
            Self::Timeout { .. } => WorkflowError::Timeout { stage },
            Self::Remote {
                status,
                detail: Some(detail),
                ..
            } => WorkflowError::Remote {
                stage,
                status,
                detail,
            },
            Self::Remote {
                status,
                detail: None,
                ..
            } => WorkflowError::Transport {
                stage,
                message: format!("service responded with status {}", status),
            },
            Self::Transport { message, .. } => WorkflowError::Transport { stage, message },
            Self::Decode { message, .. } => WorkflowError::Transport {
                stage,
                message: format!("unreadable response: {}", message),
            },
        }
    }
}

/// A report file chosen for upload.
#[derive(Clone, Debug)]
pub struct ReportFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl ReportFile {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    /// Lower-cased extension of the file name, if it has one.
    pub fn extension(&self) -> Option<String> {
        std::path::Path::new(&self.file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
    }
}

/// The remote rebuttal service. Implementations do the transport; timeouts
/// are applied by [`ApiGateway`].
#[async_trait]
pub trait ReportService: Send + Sync {
    async fn upload_report(&self, file: &ReportFile) -> Result<UploadReportResponse, GatewayError>;

    async fn extract_claims(&self, report_id: &ReportId) -> Result<Vec<Claim>, GatewayError>;

    async fn verify_evidence(
        &self,
        report_id: &ReportId,
        claim_ids: &[ClaimId],
    ) -> Result<VerifyEvidenceResponse, GatewayError>;

    async fn generate_rebuttal(&self, request: &AnalyzeRequest) -> Result<AnalysisResult, GatewayError>;

    async fn download_report(
        &self,
        report_id: &ReportId,
        format: &str,
    ) -> Result<DownloadedReport, GatewayError>;

    async fn health(&self) -> Result<HealthStatus, GatewayError>;

    async fn build_index(&self) -> Result<IndexOutcome, GatewayError>;
}

/// Timeout budget per operation.
#[derive(Clone, Copy, Debug)]
pub struct TimeoutPolicy {
    pub default: Duration,
    pub extract: Duration,
    pub rebuttal: Duration,
}

impl TimeoutPolicy {
    pub fn for_operation(&self, operation: Operation) -> Duration {
        match operation {
            Operation::ExtractClaims => self.extract,
            Operation::GenerateRebuttal => self.rebuttal,
            // Index builds embed the whole corpus.
            Operation::BuildIndex => self.rebuttal,
            _ => self.default,
        }
    }
}

impl From<&TimeoutConfig> for TimeoutPolicy {
    fn from(config: &TimeoutConfig) -> Self {
        Self {
            default: Duration::from_secs(config.default_seconds),
            extract: Duration::from_secs(config.extract_seconds),
            rebuttal: Duration::from_secs(config.rebuttal_seconds),
        }
    }
}

/// Issues remote operations with their timeout policy and records latency.
#[derive(Clone)]
pub struct ApiGateway {
    service: Arc<dyn ReportService>,
    timeouts: TimeoutPolicy,
}

impl ApiGateway {
    pub fn new(service: Arc<dyn ReportService>, timeouts: TimeoutPolicy) -> Self {
        Self { service, timeouts }
    }

    pub async fn upload_report(&self, file: &ReportFile) -> Result<UploadReportResponse, GatewayError> {
        self.call(Operation::UploadReport, self.service.upload_report(file))
            .await
    }

    pub async fn extract_claims(&self, report_id: &ReportId) -> Result<Vec<Claim>, GatewayError> {
        self.call(Operation::ExtractClaims, self.service.extract_claims(report_id))
            .await
    }

    pub async fn verify_evidence(
        &self,
        report_id: &ReportId,
        claim_ids: &[ClaimId],
    ) -> Result<VerifyEvidenceResponse, GatewayError> {
        self.call(
            Operation::VerifyEvidence,
            self.service.verify_evidence(report_id, claim_ids),
        )
        .await
    }

    pub async fn generate_rebuttal(
        &self,
        report_id: &ReportId,
        top_k: u32,
        max_claims: u32,
    ) -> Result<AnalysisResult, GatewayError> {
        let request = AnalyzeRequest {
            report_id: report_id.clone(),
            top_k,
            max_claims,
        };
        self.call(
            Operation::GenerateRebuttal,
            self.service.generate_rebuttal(&request),
        )
        .await
    }

    pub async fn download_report(
        &self,
        report_id: &ReportId,
        format: &str,
    ) -> Result<DownloadedReport, GatewayError> {
        self.call(
            Operation::DownloadReport,
            self.service.download_report(report_id, format),
        )
        .await
    }

    pub async fn health(&self) -> Result<HealthStatus, GatewayError> {
        self.call(Operation::Health, self.service.health()).await
    }

    pub async fn build_index(&self) -> Result<IndexOutcome, GatewayError> {
        self.call(Operation::BuildIndex, self.service.build_index())
            .await
    }

    /// Run one call under its timeout. On timeout the call's future is
    /// dropped, so a late response can never be observed.
    async fn call<T>(
        &self,
        operation: Operation,
        request: impl Future<Output = Result<T, GatewayError>>,
    ) -> Result<T, GatewayError> {
        let budget = self.timeouts.for_operation(operation);
        let start = Instant::now();

        let result = match tokio::time::timeout(budget, request).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout { operation }),
        };

        let latency = start.elapsed().as_secs_f64();
        metrics::histogram!("gateway.request.latency", "operation" => operation.as_str())
            .record(latency);

        match &result {
            Ok(_) => {
                tracing::debug!(operation = operation.as_str(), latency, "Request succeeded");
            }
            Err(GatewayError::Timeout { .. }) => {
                metrics::counter!("gateway.request.timeouts", "operation" => operation.as_str())
                    .increment(1);
                tracing::warn!(
                    operation = operation.as_str(),
                    budget_secs = budget.as_secs(),
                    "Request timed out"
                );
            }
            Err(e) => {
                metrics::counter!("gateway.request.errors", "operation" => operation.as_str())
                    .increment(1);
                tracing::warn!(operation = operation.as_str(), error = %e, "Request failed");
            }
        }

        result
    }
}
