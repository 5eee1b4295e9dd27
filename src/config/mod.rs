//! # Configuration System
//!
//! TOML-based configuration for the controller: parsing, defaults and
//! validation.
//!
//! ## Example Configuration
//!
//! ```toml
//! [controller]
//! name = "pied-piper"
//! bind_address = "0.0.0.0"
//! port = 6653
//!
//! [logging]
//! level = "info"
//! format = "pretty"
//!
//! [load_balancer]
//! virtual_ip = "10.0.0.100"
//! virtual_mac = "00:00:00:00:ff:ff"
//!
//! [[load_balancer.backends]]
//! address = "10.0.0.1"
//! mac = "00:00:00:00:00:01"
//! port = 1
//! services = [8080]
//! ```

mod error;
mod loader;
mod types;
mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use types::{ControllerConfig, ControllerSection, LogFormat, LogLevel, LoggingConfig};
pub use validation::{
    BasicValidator, LoadBalancerValidator, ValidationError, ValidationResult,
    ValidationSeverity, Validator,
};
