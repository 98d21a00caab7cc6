//! HTTP gateway against a mock service on a local port.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Multipart, Path, Query};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use rebuttal_client::gateway::{
    ApiGateway, GatewayError, HttpReportService, Operation, ReportFile, ReportService,
    TimeoutPolicy,
};
use rebuttal_client::orchestrator::Workflow;
use rebuttal_common::config::{ClientConfig, VerificationMode};
use rebuttal_common::types::Stage;
use rebuttal_common::{ClaimId, ReportId};

async fn upload(mut multipart: Multipart) -> impl IntoResponse {
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let size = field.bytes().await.map(|b| b.len()).unwrap_or(0);
        if size > 0 {
            return (
                StatusCode::OK,
                Json(json!({"report_id": "r1", "message": format!("{file_name} uploaded")})),
            );
        }
    }
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"detail": "No file uploaded"})),
    )
}

async fn extract(Json(body): Json<Value>) -> axum::response::Response {
    if body["report_id"] == "r-broken" {
        return (StatusCode::BAD_GATEWAY, "<html>Bad Gateway</html>").into_response();
    }
    Json(json!({
        "claims": [
            {"claim_id": "C1", "claim_text": "Revenue recognized before delivery", "claim_type": "accounting", "page_numbers": [4]},
            {"claim_id": "C2", "claim_text": "Inflated store count", "claim_type": "store_count"}
        ]
    }))
    .into_response()
}

async fn verify(Json(body): Json<Value>) -> Json<Value> {
    let count = body["claim_ids"].as_array().map(Vec::len).unwrap_or(0);
    Json(json!({"verified": count > 0, "message": format!("{count} claims checked")}))
}

async fn analyze(Json(body): Json<Value>) -> Json<Value> {
    Json(json!({
        "report": {
            "report_id": body["report_id"],
            "generated_at": "2026-10-19T09:30:00Z",
            "summary": {
                "total_claims": 2,
                "fully_addressed": 1,
                "partially_addressed": 0,
                "not_addressed": 1,
                "average_confidence": 55.0,
                "key_gaps": ["Store-level foot traffic data"],
                "priority_actions": ["Publish audited store list"]
            },
            "claim_analyses": [
                {
                    "claim_id": "C1",
                    "coverage": "fully_addressed",
                    "confidence": 85,
                    "reasoning": "- Revenue is recognized on delivery per the 10-K",
                    "citations": [{
                        "doc_id": "10k-2025",
                        "doc_title": "Annual Report 2025",
                        "chunk_id": "10k-2025-041",
                        "quote": "Revenue is recognized when control transfers",
                        "similarity_score": 0.82
                    }],
                    "gaps": null,
                    "recommended_actions": null
                },
                {
                    "claim_id": "C2",
                    "coverage": "not_addressed",
                    "confidence": 25,
                    "reasoning": "- No store counts in the corpus",
                    "citations": [],
                    "gaps": ["Store-level foot traffic data"],
                    "recommended_actions": ["Publish audited store list"]
                }
            ]
        },
        "message": "Analysis complete"
    }))
}

async fn download(
    Path(report_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> axum::response::Response {
    match params.get("format").map(String::as_str) {
        Some("json") => (
            [(header::CONTENT_TYPE, "application/json")],
            format!(r#"{{"report_id": "{report_id}"}}"#),
        )
            .into_response(),
        Some("md") => (
            [(header::CONTENT_TYPE, "text/markdown")],
            format!("# Rebuttal for {report_id}\n"),
        )
            .into_response(),
        _ => (
            StatusCode::BAD_REQUEST,
            Json(json!({"detail": "Format must be 'md' or 'json'"})),
        )
            .into_response(),
    }
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "chroma_db_exists": true,
        "collection_exists": true,
        "collection_count": 412
    }))
}

async fn slow_index() -> Json<Value> {
    tokio::time::sleep(Duration::from_secs(5)).await;
    Json(json!({"indexed": true, "count": 412, "message": "Indexed"}))
}

async fn spawn_service() -> String {
    let app = Router::new()
        .route("/health", get(health))
        .route("/api/upload_report", post(upload))
        .route("/api/extract_claims", post(extract))
        .route("/api/verify_evidence", post(verify))
        .route("/api/analyze", post(analyze))
        .route("/api/download_report/{report_id}", get(download))
        .route("/api/check_and_index", post(slow_index));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn config_for_service() -> ClientConfig {
    let mut config = ClientConfig::default();
    config.service.base_url = spawn_service().await;
    config.verification.simulated_delay_ms = 10;
    config
}

#[tokio::test]
async fn test_upload_is_multipart() {
    let config = config_for_service().await;
    let service = HttpReportService::new(&config).unwrap();

    let response = service
        .upload_report(&ReportFile::new("short_report.pdf", b"%PDF-1.7".to_vec()))
        .await
        .unwrap();
    assert_eq!(response.report_id.as_str(), "r1");
    assert!(response.claims.is_none());
    assert_eq!(response.message.as_deref(), Some("short_report.pdf uploaded"));
}

#[tokio::test]
async fn test_extract_parses_claims() {
    let config = config_for_service().await;
    let service = HttpReportService::new(&config).unwrap();

    let claims = service.extract_claims(&ReportId::new("r1")).await.unwrap();
    assert_eq!(claims.len(), 2);
    assert_eq!(claims[0].page_numbers, vec![4]);
    assert!(claims[1].page_numbers.is_empty());
}

#[tokio::test]
async fn test_error_without_detail_falls_back_to_status() {
    let config = config_for_service().await;
    let service = HttpReportService::new(&config).unwrap();

    let err = service
        .extract_claims(&ReportId::new("r-broken"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GatewayError::Remote {
            status: 502,
            detail: None,
            ..
        }
    ));
    assert_eq!(
        err.into_workflow_error(Stage::Extract).to_string(),
        "extract request failed: service responded with status 502"
    );
}

#[tokio::test]
async fn test_download_naming_and_rejected_format() {
    let config = config_for_service().await;
    let service = HttpReportService::new(&config).unwrap();
    let report_id = ReportId::new("r1");

    let report = service.download_report(&report_id, "json").await.unwrap();
    assert_eq!(report.file_name, "report_r1.json");
    assert_eq!(report.content_type.as_deref(), Some("application/json"));
    assert_eq!(report.bytes, br#"{"report_id": "r1"}"#.to_vec());

    let err = service.download_report(&report_id, "xyz").await.unwrap_err();
    assert_eq!(
        err.into_workflow_error(Stage::Export).to_string(),
        "Format must be 'md' or 'json'"
    );
}

#[tokio::test]
async fn test_download_encodes_report_id() {
    let config = config_for_service().await;
    let service = HttpReportService::new(&config).unwrap();
    let report_id = ReportId::new("q3/../r1?x");

    let report = service.download_report(&report_id, "json").await.unwrap();
    assert_eq!(report.bytes, br#"{"report_id": "q3/../r1?x"}"#.to_vec());
    assert_eq!(report.file_name, "report_q3_.._r1_x.json");
    assert!(!report.file_name.contains('/'));
}

#[tokio::test]
async fn test_verification_modes() {
    let mut config = config_for_service().await;
    let claim_ids = [ClaimId::new("C1")];

    let simulated = HttpReportService::new(&config).unwrap();
    let response = simulated
        .verify_evidence(&ReportId::new("r1"), &claim_ids)
        .await
        .unwrap();
    assert!(response.verified);
    assert_eq!(response.message, None);

    config.verification.mode = VerificationMode::Remote;
    let remote = HttpReportService::new(&config).unwrap();
    let response = remote
        .verify_evidence(&ReportId::new("r1"), &claim_ids)
        .await
        .unwrap();
    assert!(response.verified);
    assert_eq!(response.message.as_deref(), Some("1 claims checked"));
}

#[tokio::test]
async fn test_health_is_served_from_root() {
    let config = config_for_service().await;
    let service = HttpReportService::new(&config).unwrap();

    let health = service.health().await.unwrap();
    assert_eq!(health.status, "healthy");
    assert!(!health.needs_index());
}

#[tokio::test]
async fn test_gateway_timeout_drops_slow_call() {
    let config = config_for_service().await;
    let service = Arc::new(HttpReportService::new(&config).unwrap());
    let gateway = ApiGateway::new(
        service,
        TimeoutPolicy {
            default: Duration::from_secs(5),
            extract: Duration::from_secs(5),
            rebuttal: Duration::from_millis(100),
        },
    );

    let err = gateway.build_index().await.unwrap_err();
    assert!(matches!(
        err,
        GatewayError::Timeout {
            operation: Operation::BuildIndex
        }
    ));
}

#[tokio::test]
async fn test_full_workflow_over_http() {
    let config = config_for_service().await;
    let service = Arc::new(HttpReportService::new(&config).unwrap());
    let gateway = ApiGateway::new(service, TimeoutPolicy::from(&config.timeouts));
    let workflow = Workflow::new(gateway, &config);

    workflow
        .upload_report(ReportFile::new("short_report.txt", b"Short report text".to_vec()))
        .await
        .unwrap();
    for stage in [Stage::Extract, Stage::Verify] {
        assert_eq!(workflow.next().unwrap(), stage);
        workflow.wait_idle(stage).await;
    }
    assert_eq!(workflow.next().unwrap(), Stage::Rebuttal);

    let summary = workflow
        .generate_rebuttal_with_defaults()
        .await
        .unwrap()
        .applied()
        .unwrap();
    assert_eq!(summary.total_claims, 2);
    assert_eq!(summary.key_gaps, vec!["Store-level foot traffic data"]);

    let snapshot = workflow.snapshot();
    let analysis = snapshot.store.analysis().unwrap();
    assert!(analysis.summary_consistent());
    assert!(analysis.claim_analyses[0].gaps.is_empty());

    assert_eq!(workflow.next().unwrap(), Stage::Export);
    let report = workflow.export("md").await.unwrap().applied().unwrap();
    assert_eq!(report.file_name, "report_r1.md");
    assert_eq!(report.bytes, b"# Rebuttal for r1\n".to_vec());
}
