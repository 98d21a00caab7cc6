use std::path::{Path, PathBuf};

use rebuttal_common::config::ClientConfig;

use super::validation;

pub const CONFIG_FILE_NAME: &str = "client.toml";

/// Load and validate `client.toml` from the given config directory.
///
/// Fails loudly with clear error messages if anything is misconfigured.
/// The client refuses to start on validation failure.
pub fn load_config(config_dir: &Path) -> Result<ClientConfig, ConfigError> {
    let path = config_dir.join(CONFIG_FILE_NAME);
    tracing::info!(path = %path.display(), "Loading configuration");

    let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileRead {
        path: path.clone(),
        source: e,
    })?;

    let config: ClientConfig = toml::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.clone(),
        detail: e.to_string(),
    })?;

    validation::validate(&config)?;

    tracing::info!(
        base_url = %config.service.base_url,
        verification = ?config.verification.mode,
        "Configuration loaded successfully"
    );

    Ok(config)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {detail}")]
    Parse { path: PathBuf, detail: String },

    #[error("Validation failed: {0}")]
    Validation(String),
}
