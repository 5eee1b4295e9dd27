//! Configuration validation system.

use super::types::ControllerConfig;
use crate::controller::MAX_ECHO_INTERVAL;
use std::collections::HashSet;

/// A single validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// Error message.
    pub message: String,
    /// Severity level.
    pub severity: ValidationSeverity,
}

impl ValidationError {
    /// Create a new error.
    #[must_use]
    pub fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: ValidationSeverity::Error,
        }
    }

    /// Create a new warning.
    #[must_use]
    pub fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: ValidationSeverity::Warning,
        }
    }
}

/// Severity of validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationSeverity {
    /// Error - configuration is invalid.
    Error,
    /// Warning - configuration may have issues.
    Warning,
}

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    errors: Vec<ValidationError>,
}

impl ValidationResult {
    /// Create a new empty (valid) result.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an error to the result.
    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    /// Check if the validation passed (no errors).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self
            .errors
            .iter()
            .any(|e| e.severity == ValidationSeverity::Error)
    }

    /// Get all validation errors.
    #[must_use]
    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    /// Get only errors (not warnings).
    #[must_use]
    pub fn errors_only(&self) -> Vec<&ValidationError> {
        self.errors
            .iter()
            .filter(|e| e.severity == ValidationSeverity::Error)
            .collect()
    }

    /// Get only warnings.
    #[must_use]
    pub fn warnings(&self) -> Vec<&ValidationError> {
        self.errors
            .iter()
            .filter(|e| e.severity == ValidationSeverity::Warning)
            .collect()
    }

    /// Merge another validation result into this one.
    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
    }
}

/// Trait for configuration validators.
pub trait Validator: std::fmt::Debug + Send + Sync {
    /// Validate a configuration and return any errors.
    fn validate(&self, config: &ControllerConfig) -> ValidationResult;
}

/// Built-in validator for the controller and logging sections.
#[derive(Debug, Default)]
pub struct BasicValidator;

impl BasicValidator {
    /// Create a new basic validator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Validator for BasicValidator {
    fn validate(&self, config: &ControllerConfig) -> ValidationResult {
        let mut result = ValidationResult::new();

        if config.controller.name.is_empty() {
            result.add_error(ValidationError::error(
                "controller.name",
                "Controller name cannot be empty",
            ));
        }

        if config.controller.port == 0 {
            result.add_error(ValidationError::error(
                "controller.port",
                "OpenFlow port cannot be 0",
            ));
        }

        if config.controller.echo_interval.is_zero() {
            result.add_error(ValidationError::error(
                "controller.echo_interval",
                "Echo interval must be positive",
            ));
        } else if config.controller.echo_interval > MAX_ECHO_INTERVAL {
            result.add_error(ValidationError::error(
                "controller.echo_interval",
                format!(
                    "Echo interval cannot exceed {}s",
                    MAX_ECHO_INTERVAL.as_secs()
                ),
            ));
        }

        result
    }
}

/// Validator for the `[load_balancer]` section.
#[derive(Debug, Default)]
pub struct LoadBalancerValidator;

impl LoadBalancerValidator {
    /// Create a new load balancer validator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Validator for LoadBalancerValidator {
    fn validate(&self, config: &ControllerConfig) -> ValidationResult {
        let mut result = ValidationResult::new();
        let lb = &config.load_balancer;

        if lb.backends.is_empty() {
            result.add_error(ValidationError::warning(
                "load_balancer.backends",
                "No backends configured; every connection will be dropped",
            ));
        }

        let idle = lb.idle_timeout.as_secs();
        if idle == 0 || idle > u64::from(u16::MAX) {
            result.add_error(ValidationError::error(
                "load_balancer.idle_timeout",
                format!("Idle timeout must be between 1s and {}s", u16::MAX),
            ));
        }

        if lb.session_priority == 0 {
            result.add_error(ValidationError::error(
                "load_balancer.session_priority",
                "Session priority must be above the table-miss priority 0",
            ));
        }

        if lb.session_expiry.is_some_and(|d| d.is_zero()) {
            result.add_error(ValidationError::error(
                "load_balancer.session_expiry",
                "Session expiry must be positive when set",
            ));
        }

        let mut seen = HashSet::new();
        for backend in &lb.backends {
            let field = format!("load_balancer.backends.{}", backend.address);

            if !seen.insert(backend.address) {
                result.add_error(ValidationError::error(
                    field.clone(),
                    format!("Duplicate backend address: {}", backend.address),
                ));
            }

            if backend.address == lb.virtual_ip {
                result.add_error(ValidationError::error(
                    field.clone(),
                    "Backend address cannot be the virtual IP",
                ));
            }

            if backend.services.is_empty() {
                result.add_error(ValidationError::error(
                    field,
                    "Backend must serve at least one port",
                ));
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::load_balancer::BackendConfig;
    use crate::packet::MacAddr;
    use std::net::Ipv4Addr;
    use std::time::Duration;

    fn backend(last: u8, services: &[u16]) -> BackendConfig {
        BackendConfig::new(
            Ipv4Addr::new(10, 0, 0, last),
            MacAddr::new(0, 0, 0, 0, 0, last),
            u32::from(last),
            services.iter().copied(),
        )
    }

    fn with_backends(backends: Vec<BackendConfig>) -> ControllerConfig {
        let mut config = ControllerConfig::default();
        config.load_balancer.backends = backends;
        config
    }

    #[test]
    fn test_basic_validator_valid() {
        let config = ControllerConfig::default();
        let result = BasicValidator::new().validate(&config);
        assert!(result.is_valid());
    }

    #[test]
    fn test_basic_validator_empty_name() {
        let mut config = ControllerConfig::default();
        config.controller.name = String::new();

        let result = BasicValidator::new().validate(&config);

        assert!(!result.is_valid());
        assert!(result.errors()[0].message.contains("name cannot be empty"));
    }

    #[test]
    fn test_echo_interval_bounds() {
        let mut config = ControllerConfig::default();
        config.controller.echo_interval = std::time::Duration::ZERO;
        assert!(!BasicValidator::new().validate(&config).is_valid());

        config.controller.echo_interval = std::time::Duration::from_secs(u64::MAX);
        let result = BasicValidator::new().validate(&config);
        assert!(!result.is_valid());
        assert_eq!(result.errors()[0].field, "controller.echo_interval");

        config.controller.echo_interval = MAX_ECHO_INTERVAL;
        assert!(BasicValidator::new().validate(&config).is_valid());
    }

    #[test]
    fn test_no_backends_is_only_a_warning() {
        let result = LoadBalancerValidator::new().validate(&ControllerConfig::default());
        assert!(result.is_valid());
        assert_eq!(result.warnings().len(), 1);
    }

    #[test]
    fn test_duplicate_backends() {
        let config = with_backends(vec![backend(1, &[80]), backend(1, &[81])]);
        let result = LoadBalancerValidator::new().validate(&config);

        assert!(!result.is_valid());
        assert!(result.errors_only()[0].message.contains("Duplicate"));
    }

    #[test]
    fn test_vip_collision_and_empty_services() {
        let mut config = with_backends(vec![backend(100, &[80]), backend(2, &[])]);
        config.load_balancer.virtual_ip = Ipv4Addr::new(10, 0, 0, 100);

        let result = LoadBalancerValidator::new().validate(&config);
        assert_eq!(result.errors_only().len(), 2);
    }

    #[test]
    fn test_timeouts_and_priority() {
        let mut config = with_backends(vec![backend(1, &[80])]);
        config.load_balancer.idle_timeout = Duration::from_secs(70_000);
        config.load_balancer.session_priority = 0;
        config.load_balancer.session_expiry = Some(Duration::ZERO);

        let result = LoadBalancerValidator::new().validate(&config);
        let fields: Vec<_> = result.errors_only().iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "load_balancer.idle_timeout",
                "load_balancer.session_priority",
                "load_balancer.session_expiry",
            ]
        );
    }

    #[test]
    fn test_validation_result_merge() {
        let mut result1 = ValidationResult::new();
        result1.add_error(ValidationError::error("field1", "error1"));

        let mut result2 = ValidationResult::new();
        result2.add_error(ValidationError::warning("field2", "warning1"));

        result1.merge(result2);
        assert_eq!(result1.errors().len(), 2);
    }
}
