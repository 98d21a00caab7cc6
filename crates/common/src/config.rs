use serde::{Deserialize, Serialize};

/// Top-level client configuration, deserialized from client.toml.
///
/// `Default` mirrors the shipped config/client.toml.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub progress: ProgressConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub rebuttal: RebuttalDefaults,
    #[serde(default)]
    pub verification: VerificationConfig,
}

/// Where the rebuttal service lives.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service root; `/health` is served from here.
    pub base_url: String,
    /// Prefix of the workflow endpoints (e.g. "/api").
    pub api_prefix: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".into(),
            api_prefix: "/api".into(),
        }
    }
}

impl ServiceConfig {
    /// Absolute URL of a workflow endpoint, e.g. `api_url("/analyze")`.
    pub fn api_url(&self, path: &str) -> String {
        format!(
            "{}{}{}",
            self.base_url.trim_end_matches('/'),
            self.api_prefix.trim_end_matches('/'),
            path
        )
    }

    /// Absolute URL of a root-level endpoint, e.g. `root_url("/health")`.
    pub fn root_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// Per-operation timeouts. Rebuttal generation runs retrieval plus an LLM
/// judgement per claim, so its budget is an order of magnitude larger.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Upload, verification, download and health calls.
    pub default_seconds: u64,
    pub extract_seconds: u64,
    pub rebuttal_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            default_seconds: 30,
            extract_seconds: 60,
            rebuttal_seconds: 1800,
        }
    }
}

/// Synthetic progress tick profiles for the stages without real progress.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProgressConfig {
    pub extract: ProgressProfile,
    pub verify: ProgressProfile,
    pub rebuttal: ProgressProfile,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            extract: ProgressProfile {
                interval_ms: 500,
                step: 10,
            },
            verify: ProgressProfile {
                interval_ms: 300,
                step: 15,
            },
            rebuttal: ProgressProfile {
                interval_ms: 2000,
                step: 2,
            },
        }
    }
}

/// One stage's tick: `step` percentage points every `interval_ms`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressProfile {
    pub interval_ms: u64,
    pub step: u8,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Lower-case file extensions accepted by the client-side pre-check.
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            allowed_extensions: vec!["pdf".into(), "docx".into(), "txt".into()],
        }
    }
}

/// Default rebuttal parameters and their accepted ranges.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RebuttalDefaults {
    /// Evidence chunks retrieved per claim (3–20).
    pub top_k: u32,
    /// Claims analyzed per run (5–50).
    pub max_claims: u32,
}

impl Default for RebuttalDefaults {
    fn default() -> Self {
        Self {
            top_k: 6,
            max_claims: 30,
        }
    }
}

/// How the verification stage is carried out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationMode {
    /// Timed local stand-in that always succeeds.
    Simulated,
    /// POST /verify_evidence on the service.
    Remote,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerificationConfig {
    pub mode: VerificationMode,
    /// Duration of the simulated verification.
    pub simulated_delay_ms: u64,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            mode: VerificationMode::Simulated,
            simulated_delay_ms: 1500,
        }
    }
}
