use std::ops::RangeInclusive;

use rebuttal_common::config::{ClientConfig, ProgressProfile};

use super::loader::ConfigError;

/// Accepted evidence-retrieval breadth per claim.
pub const TOP_K_RANGE: RangeInclusive<u32> = 3..=20;
/// Accepted number of claims per rebuttal run.
pub const MAX_CLAIMS_RANGE: RangeInclusive<u32> = 5..=50;

/// Validate the complete client configuration.
///
/// Collects every problem rather than stopping at the first one.
pub fn validate(config: &ClientConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    validate_service(config, &mut errors);
    validate_timeouts(config, &mut errors);
    validate_progress(config, &mut errors);
    validate_upload(config, &mut errors);
    validate_rebuttal(config, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Validation(errors.join("; ")))
    }
}

fn validate_service(config: &ClientConfig, errors: &mut Vec<String>) {
    let s = &config.service;

    if !(s.base_url.starts_with("http://") || s.base_url.starts_with("https://")) {
        errors.push("service.base_url must start with http:// or https://".into());
    }
    if !s.api_prefix.is_empty() && !s.api_prefix.starts_with('/') {
        errors.push("service.api_prefix must be empty or start with '/'".into());
    }
}

fn validate_timeouts(config: &ClientConfig, errors: &mut Vec<String>) {
    let t = &config.timeouts;

    if t.default_seconds == 0 {
        errors.push("timeouts.default_seconds must be > 0".into());
    }
    if t.extract_seconds == 0 {
        errors.push("timeouts.extract_seconds must be > 0".into());
    }
    if t.rebuttal_seconds < t.extract_seconds {
        errors.push("timeouts.rebuttal_seconds must be >= extract_seconds".into());
    }
}

fn validate_progress(config: &ClientConfig, errors: &mut Vec<String>) {
    let validate_profile = |p: &ProgressProfile, name: &str, errors: &mut Vec<String>| {
        if p.interval_ms == 0 {
            errors.push(format!("progress.{}.interval_ms must be > 0", name));
        }
        if p.step == 0 || p.step > 90 {
            errors.push(format!("progress.{}.step must be between 1 and 90", name));
        }
    };

    validate_profile(&config.progress.extract, "extract", errors);
    validate_profile(&config.progress.verify, "verify", errors);
    validate_profile(&config.progress.rebuttal, "rebuttal", errors);
}

fn validate_upload(config: &ClientConfig, errors: &mut Vec<String>) {
    let exts = &config.upload.allowed_extensions;

    if exts.is_empty() {
        errors.push("upload.allowed_extensions must not be empty".into());
    }
    for ext in exts {
        if ext.is_empty() || ext.starts_with('.') || ext.chars().any(|c| c.is_ascii_uppercase()) {
            errors.push(format!(
                "upload.allowed_extensions entry {:?} must be a lower-case extension without a dot",
                ext
            ));
        }
    }
}

fn validate_rebuttal(config: &ClientConfig, errors: &mut Vec<String>) {
    let r = &config.rebuttal;

    if !TOP_K_RANGE.contains(&r.top_k) {
        errors.push(format!(
            "rebuttal.top_k must be between {} and {}",
            TOP_K_RANGE.start(),
            TOP_K_RANGE.end()
        ));
    }
    if !MAX_CLAIMS_RANGE.contains(&r.max_claims) {
        errors.push(format!(
            "rebuttal.max_claims must be between {} and {}",
            MAX_CLAIMS_RANGE.start(),
            MAX_CLAIMS_RANGE.end()
        ));
    }
}
