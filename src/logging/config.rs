//! Logging configuration
//!
//! Per-component log levels and output destinations.

use super::spans::{BATCH_TARGET, ENGINE_TARGET};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const VALID_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Global log level (trace, debug, info, warn, error)
    pub global_level: String,

    /// Enable console output
    pub console_output: bool,

    /// Directory for JSON log files (None = no file logging)
    pub log_directory: Option<PathBuf>,

    /// Include file location in logs
    pub include_file_location: bool,

    /// Level for the detection and registration components
    pub engine_level: String,

    /// Level for the batch runner
    pub batch_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            global_level: "info".to_string(),
            console_output: true,
            log_directory: None,
            include_file_location: false,
            engine_level: "info".to_string(),
            batch_level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Verbose console logging plus JSON files under `logs/`
    pub fn development() -> Self {
        Self {
            global_level: "debug".to_string(),
            console_output: true,
            log_directory: Some(PathBuf::from("logs")),
            include_file_location: true,
            engine_level: "trace".to_string(),
            batch_level: "debug".to_string(),
        }
    }

    /// File-only logging with warnings and above
    pub fn production() -> Self {
        Self {
            global_level: "warn".to_string(),
            console_output: false,
            log_directory: Some(PathBuf::from("/var/log/form-alignment")),
            include_file_location: false,
            engine_level: "info".to_string(),
            batch_level: "info".to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        for (name, level) in [
            ("global_level", &self.global_level),
            ("engine_level", &self.engine_level),
            ("batch_level", &self.batch_level),
        ] {
            if !VALID_LEVELS.contains(&level.as_str()) {
                return Err(format!(
                    "Invalid {}: {}. Must be one of: {:?}",
                    name, level, VALID_LEVELS
                ));
            }
        }

        if let Some(ref log_dir) = self.log_directory {
            if let Some(parent) = log_dir.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    return Err(format!("Log directory parent does not exist: {:?}", parent));
                }
            }
        }

        Ok(())
    }

    /// Get the effective log level for a specific component
    pub fn get_component_level(&self, component: &str) -> &str {
        match component {
            "engine" | "algorithms" | "pipeline" => &self.engine_level,
            "batch" => &self.batch_level,
            _ => &self.global_level,
        }
    }

    /// Filter directive covering the crate and its components
    pub fn filter_directive(&self) -> String {
        let crate_name = env!("CARGO_CRATE_NAME");
        let engine = self.get_component_level("engine");
        format!(
            "{crate_name}={global},{crate_name}::algorithms={engine},{engine_target}={engine},{batch_target}={batch}",
            global = self.global_level,
            engine_target = ENGINE_TARGET,
            batch_target = BATCH_TARGET,
            batch = self.get_component_level("batch"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.global_level, "info");
        assert!(config.console_output);
        assert!(config.log_directory.is_none());
        assert!(!config.include_file_location);
    }

    #[test]
    fn test_presets() {
        let dev = LoggingConfig::development();
        assert_eq!(dev.engine_level, "trace");
        assert!(dev.include_file_location);

        let prod = LoggingConfig::production();
        assert_eq!(prod.global_level, "warn");
        assert!(!prod.console_output);
    }

    #[test]
    fn test_config_validation() {
        let mut config = LoggingConfig::default();
        assert!(config.validate().is_ok());

        config.global_level = "invalid".to_string();
        assert!(config.validate().is_err());

        config.global_level = "debug".to_string();
        config.batch_level = "loud".to_string();
        assert!(config.validate().unwrap_err().contains("batch_level"));
    }

    #[test]
    fn test_component_level_selection() {
        let config = LoggingConfig::development();
        assert_eq!(config.get_component_level("algorithms"), "trace");
        assert_eq!(config.get_component_level("batch"), "debug");
        assert_eq!(config.get_component_level("unknown"), "debug");
    }

    #[test]
    fn test_filter_directive_mentions_components() {
        let directive = LoggingConfig::default().filter_directive();
        assert!(directive.starts_with("form_alignment=info"));
        assert!(directive.contains("form_alignment::pipeline::batch=info"));
    }

    #[test]
    fn test_engine_level_reaches_span_events() {
        let config = LoggingConfig {
            engine_level: "trace".to_string(),
            batch_level: "warn".to_string(),
            ..LoggingConfig::default()
        };
        let directive = config.filter_directive();
        assert_eq!(ENGINE_TARGET, "form_alignment::pipeline::engine");
        assert!(directive.contains(&format!("{}=trace", ENGINE_TARGET)));
        assert!(directive.contains(&format!("{}=warn", BATCH_TARGET)));
        assert!(directive.contains("form_alignment::algorithms=trace"));

        let filter = tracing_subscriber::EnvFilter::try_new(&directive);
        assert!(filter.is_ok());
    }
}
