//! Configuration file loading and parsing.

use std::path::Path;

use anyhow::{Context, Result};

use super::model::AppConfig;
use crate::error::ConfigError;
use crate::validation::{report, validate_config};

pub use crate::validation::Role;

/// Loads the configuration file from disk and parses it.
pub fn load_from_path(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;

    let config: AppConfig =
        serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    Ok(config)
}

/// Loads the configuration file, or the built-in defaults when no path is given.
pub fn load(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    match path {
        Some(path) => load_from_path(path),
        None => Ok(AppConfig::default()),
    }
}

/// Loads and validates the configuration for the given process role.
pub fn load_and_validate(path: Option<&Path>, role: Role) -> Result<AppConfig> {
    let config = load(path).context("Failed to load configuration")?;

    let result = validate_config(&config, role);

    for issue in result.warnings() {
        tracing::warn!(
            path = %issue.path,
            message = %issue.message,
            suggestion = ?issue.suggestion,
            "Config validation warning"
        );
    }

    if !result.is_valid() {
        tracing::error!("{}", report::format_report(&result));
        anyhow::bail!(ConfigError::ValidationFailed {
            error_count: result.error_count()
        });
    }

    Ok(config)
}
