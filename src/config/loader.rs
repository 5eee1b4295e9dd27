//! Configuration file loader.

use super::error::{ConfigError, ConfigResult};
use super::types::ControllerConfig;
use super::validation::Validator;
use std::path::Path;
use tracing::warn;

/// Configuration loader with validation support.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    /// Validators to run on loaded configuration.
    validators: Vec<Box<dyn Validator>>,
}

impl ConfigLoader {
    /// Create a new configuration loader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a validator to the loader.
    #[must_use]
    pub fn with_validator<V: Validator + 'static>(mut self, validator: V) -> Self {
        self.validators.push(Box::new(validator));
        self
    }

    /// Load configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file does not exist
    /// - The file cannot be read
    /// - The TOML is malformed
    /// - Validation fails
    pub fn load<P: AsRef<Path>>(&self, path: P) -> ConfigResult<ControllerConfig> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        self.load_str(&content)
    }

    /// Load configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The TOML is malformed
    /// - Validation fails
    pub fn load_str(&self, content: &str) -> ConfigResult<ControllerConfig> {
        let config: ControllerConfig = toml::from_str(content)?;
        self.validate(&config)?;
        Ok(config)
    }

    /// Validate a configuration against all registered validators.
    ///
    /// Warnings are logged; errors fail the load.
    pub fn validate(&self, config: &ControllerConfig) -> ConfigResult<()> {
        for validator in &self.validators {
            let result = validator.validate(config);
            for warning in result.warnings() {
                warn!(field = %warning.field, "{}", warning.message);
            }
            if !result.is_valid() {
                let errors: Vec<String> = result
                    .errors_only()
                    .iter()
                    .map(|e| format!("{}: {}", e.field, e.message))
                    .collect();
                return Err(ConfigError::ValidationError(errors.join("; ")));
            }
        }
        Ok(())
    }

    /// Load configuration or return default if file doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_default<P: AsRef<Path>>(&self, path: P) -> ConfigResult<ControllerConfig> {
        let path = path.as_ref();
        if path.exists() {
            self.load(path)
        } else {
            Ok(ControllerConfig::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BasicValidator;
    use std::net::Ipv4Addr;
    use tempfile::tempdir;

    #[test]
    fn test_load_from_string() {
        let loader = ConfigLoader::new();
        let config = loader
            .load_str(
                r#"
            [controller]
            name = "test"
        "#,
            )
            .unwrap();
        assert_eq!(config.controller.name, "test");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("pied-piper.toml");

        std::fs::write(
            &config_path,
            r#"
            [controller]
            name = "file-test"

            [load_balancer]
            virtual_ip = "10.0.0.200"
        "#,
        )
        .unwrap();

        let loader = ConfigLoader::new();
        let config = loader.load(&config_path).unwrap();
        assert_eq!(config.controller.name, "file-test");
        assert_eq!(
            config.load_balancer.virtual_ip,
            Ipv4Addr::new(10, 0, 0, 200)
        );
    }

    #[test]
    fn test_load_nonexistent_file() {
        let loader = ConfigLoader::new();
        let result = loader.load("/nonexistent/path/config.toml");
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_load_or_default() {
        let loader = ConfigLoader::new();
        let config = loader.load_or_default("/nonexistent/path").unwrap();
        assert_eq!(config.controller.name, "pied-piper");
    }

    #[test]
    fn test_validation_failure() {
        let loader = ConfigLoader::new().with_validator(BasicValidator::new());
        let result = loader.load_str(
            r#"
            [controller]
            port = 0
        "#,
        );
        assert!(matches!(result, Err(ConfigError::ValidationError(msg)) if msg.contains("controller.port")));
    }

    #[test]
    fn test_malformed_toml() {
        let loader = ConfigLoader::new();
        assert!(matches!(
            loader.load_str("[controller"),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_optional_expiry() {
        let loader = ConfigLoader::new();

        let config = loader.load_str("[load_balancer]\nsession_expiry = \"90s\"\n").unwrap();
        assert_eq!(
            config.load_balancer.session_expiry,
            Some(std::time::Duration::from_secs(90))
        );

        let config = loader.load_str("[controller]\nname = \"lab\"\n").unwrap();
        assert_eq!(config.controller.name, "lab");
        assert!(config.load_balancer.session_expiry.is_none());
    }
}
