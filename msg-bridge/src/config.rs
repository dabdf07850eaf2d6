//! Textual configuration for the facade.
//!
//! Hosts hand over the session options as a JSON string; files may be JSON
//! or TOML, chosen by extension. Either way the result is a validated
//! [`SessionConfig`].

use std::path::{Path, PathBuf};

use netmsg_client::SessionConfig;

/// Parse a JSON configuration.
///
/// # Errors
///
/// Returns an error if the text is not valid JSON for [`SessionConfig`] or
/// the values fail validation.
pub fn from_json_str(text: &str) -> Result<SessionConfig, ConfigError> {
    let config: SessionConfig = serde_json::from_str(text)?;
    config.validate()?;
    Ok(config)
}

/// Parse a TOML configuration.
///
/// # Errors
///
/// Returns an error if the text is not valid TOML for [`SessionConfig`] or
/// the values fail validation.
pub fn from_toml_str(text: &str) -> Result<SessionConfig, ConfigError> {
    let config: SessionConfig = toml::from_str(text)?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from a file.
///
/// Files ending in `.toml` are parsed as TOML, anything else as JSON.
///
/// # Errors
///
/// Returns an error if the file cannot be read, parsed or validated.
pub fn from_file(path: &Path) -> Result<SessionConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;

    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    if is_toml {
        from_toml_str(&content)
    } else {
        from_json_str(&content)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// JSON text did not describe a configuration.
    #[error("failed to parse JSON config: {0}")]
    Json(#[from] serde_json::Error),
    /// TOML text did not describe a configuration.
    #[error("failed to parse TOML config: {0}")]
    Toml(#[from] toml::de::Error),
    /// Parsed values are unusable.
    #[error(transparent)]
    Invalid(#[from] netmsg_client::ConfigError),
}
