//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{ConduitConfig, LogFormat, LogLevel, LogOutput, LoggingConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &ConduitConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;

    if config.plugins.keys().any(|name| name.trim().is_empty()) {
        return Err(ConfigError::validation(
            "Plugin configuration sections must be keyed by a non-empty plugin name",
        ));
    }

    Ok(())
}

/// Validates logging configuration.
fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    for (module, level) in &logging.filters {
        if module.is_empty() {
            return Err(ConfigError::validation("Log filter module cannot be empty"));
        }
        level.parse::<LogLevel>()?;
    }

    if logging.output == LogOutput::File {
        let path = logging
            .file_path
            .as_ref()
            .ok_or_else(|| ConfigError::missing_field("logging.file_path"))?;
        if path.file_name().is_none() {
            return Err(ConfigError::validation(format!(
                "Log file path has no file name: {}",
                path.display()
            )));
        }
    }

    if logging.format == LogFormat::Json && !cfg!(feature = "json-log") {
        return Err(ConfigError::validation(
            "JSON log format requires the `json-log` feature",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn test_validate_default_config() {
        let config = ConduitConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_invalid_filter_level() {
        let mut config = ConduitConfig::default();
        config
            .logging
            .filters
            .insert("conduit_framework".to_string(), "loud".to_string());
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_validate_file_output_requires_path() {
        let mut config = ConduitConfig::default();
        config.logging.output = LogOutput::File;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { .. })
        ));

        config.logging.file_path = Some(PathBuf::from("logs/conduit.log"));
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_zero_timeouts_disable_deadlines() {
        let mut config = ConduitConfig::default();
        config.lifecycle.hook_timeout_ms = Some(0);
        config.pipeline.middleware_timeout_ms = Some(0);
        assert!(validate_config(&config).is_ok());
        assert!(config.lifecycle.to_options().hook_timeout.is_none());
        assert!(config.pipeline.call_timeout().is_none());
    }

    #[test]
    fn test_validate_empty_plugin_section_name() {
        let mut config = ConduitConfig::default();
        config
            .plugins
            .insert(" ".to_string(), serde_json::json!({}));
        assert!(validate_config(&config).is_err());
    }
}
