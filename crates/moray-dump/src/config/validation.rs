//! Configuration validation.

use super::ExtractConfig;
use crate::error::{ExtractError, Result};

/// Validate the configuration.
pub fn validate(config: &ExtractConfig) -> Result<()> {
    if config.config_table.is_empty() {
        return Err(ExtractError::Config("config_table is required".into()));
    }
    if config.event_buffer == 0 {
        return Err(ExtractError::Config(
            "event_buffer must be at least 1".into(),
        ));
    }
    if config.read_buffer_bytes == 0 {
        return Err(ExtractError::Config(
            "read_buffer_bytes must be at least 1".into(),
        ));
    }
    if config.write_buffer_bytes == 0 {
        return Err(ExtractError::Config(
            "write_buffer_bytes must be at least 1".into(),
        ));
    }
    if config.report_interval_ms == 0 {
        return Err(ExtractError::Config(
            "report_interval_ms must be at least 1".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config() {
        assert!(validate(&ExtractConfig::default()).is_ok());
    }

    #[test]
    fn test_empty_config_table() {
        let mut config = ExtractConfig::default();
        config.config_table = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_event_buffer() {
        let mut config = ExtractConfig::default();
        config.event_buffer = 0;
        assert!(matches!(validate(&config), Err(ExtractError::Config(_))));
    }

    #[test]
    fn test_zero_report_interval() {
        let mut config = ExtractConfig::default();
        config.report_interval_ms = 0;
        assert!(validate(&config).is_err());
    }
}
