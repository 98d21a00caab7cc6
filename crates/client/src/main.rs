use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;

use rebuttal_client::config;
use rebuttal_client::gateway::{ApiGateway, HttpReportService, ReportFile, TimeoutPolicy};
use rebuttal_client::orchestrator::{Completion, Workflow};
use rebuttal_common::types::Stage;

#[derive(Parser)]
#[command(name = "rebuttal-client")]
#[command(about = "Run a short-seller report through upload, claim extraction, verification, rebuttal and export")]
struct Cli {
    /// Report to analyze (.pdf, .docx or .txt)
    report: PathBuf,

    /// Directory containing client.toml
    #[arg(long, env = "REBUTTAL_CONFIG_DIR", default_value = "config")]
    config_dir: PathBuf,

    /// Export format; repeat for several
    #[arg(long = "format", default_values_t = [String::from("md"), String::from("json")])]
    formats: Vec<String>,

    /// Evidence chunks retrieved per claim (defaults to the configured value)
    #[arg(long)]
    top_k: Option<u32>,

    /// Claims analyzed per run (defaults to the configured value)
    #[arg(long)]
    max_claims: Option<u32>,

    /// Where exported reports are written
    #[arg(long, default_value = ".")]
    out: PathBuf,

    /// Build the evidence index first if the service reports it missing
    #[arg(long)]
    index: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let client_config = match config::load_config(&cli.config_dir) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load configuration, refusing to start");
            return Err(e.into());
        }
    };

    let service = HttpReportService::new(&client_config).context("Failed to build HTTP client")?;
    let gateway = ApiGateway::new(
        Arc::new(service),
        TimeoutPolicy::from(&client_config.timeouts),
    );

    check_index(&gateway, cli.index).await;

    let workflow = Workflow::new(gateway, &client_config);
    run(&workflow, &cli).await.inspect_err(|e| {
        tracing::error!(session_id = %workflow.session_id(), error = %e, "Workflow failed");
    })
}

/// Warn about (or, with `--index`, repair) a missing evidence index. The
/// workflow can still run without one; its analysis will find no evidence.
async fn check_index(gateway: &ApiGateway, build: bool) {
    let health = match gateway.health().await {
        Ok(health) => health,
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed, continuing");
            return;
        }
    };
    tracing::info!(
        status = %health.status,
        collection_count = health.collection_count,
        "Service health"
    );
    if !health.needs_index() {
        return;
    }
    if !build {
        tracing::warn!("Evidence index is missing or empty; pass --index to build it");
        return;
    }
    match gateway.build_index().await {
        Ok(outcome) => match outcome.failure() {
            None => tracing::info!(
                count = outcome.count,
                message = %outcome.message,
                "Evidence index built"
            ),
            Some(reason) => tracing::warn!(reason, "Index build failed, continuing"),
        },
        Err(e) => tracing::warn!(error = %e, "Index build failed, continuing"),
    }
}

async fn run(workflow: &Workflow, cli: &Cli) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(&cli.report)
        .await
        .with_context(|| format!("Failed to read {}", cli.report.display()))?;
    let file_name = cli
        .report
        .file_name()
        .and_then(|name| name.to_str())
        .context("Report path has no file name")?;

    let report_id = applied(workflow.upload_report(ReportFile::new(file_name, bytes)).await?)?;
    tracing::info!(report_id = %report_id, "Report accepted");

    // Extraction and verification start on stage entry.
    for stage in [Stage::Extract, Stage::Verify] {
        workflow.next()?;
        workflow.wait_idle(stage).await;
        if !workflow.snapshot().store.is_stage_complete(stage) {
            match workflow.last_error() {
                Some(e) => return Err(e.into()),
                None => bail!("{} stage did not complete", stage),
            }
        }
    }

    workflow.next()?;
    let defaults = workflow.rebuttal_defaults().clone();
    let summary = applied(
        workflow
            .generate_rebuttal(
                cli.top_k.unwrap_or(defaults.top_k),
                cli.max_claims.unwrap_or(defaults.max_claims),
            )
            .await?,
    )?;
    tracing::info!(
        total_claims = summary.total_claims,
        fully_addressed = summary.fully_addressed,
        partially_addressed = summary.partially_addressed,
        not_addressed = summary.not_addressed,
        average_confidence = summary.average_confidence,
        "Rebuttal generated"
    );

    workflow.next()?;
    tokio::fs::create_dir_all(&cli.out)
        .await
        .with_context(|| format!("Failed to create {}", cli.out.display()))?;
    for format in &cli.formats {
        let report = applied(workflow.export(format).await?)?;
        let path = cli.out.join(&report.file_name);
        tokio::fs::write(&path, &report.bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!(path = %path.display(), bytes = report.bytes.len(), "Report exported");
    }

    Ok(())
}

fn applied<T>(completion: Completion<T>) -> anyhow::Result<T> {
    completion
        .applied()
        .context("Result was discarded because the workflow moved on")
}
