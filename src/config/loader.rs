//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::EngineConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<EngineConfig, ConfigError> {
    let config: EngineConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<EngineConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reports_validation_errors() {
        let err = parse_config(
            r#"
            [[chains]]
            chain_id = 1
            rpc_urls = []
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("chain 1 has no RPC endpoints"));
    }

    #[test]
    fn test_parse_error() {
        let err = parse_config("chains = 7").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_config(Path::new("/nonexistent/engine.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
