//! # Module Contract
//!
//! The contract controller modules implement: a standardized interface for
//! lifecycle management, configuration, metrics and health reporting.

mod config;
mod contract;
mod error;
mod manifest;
mod status;

pub use config::ModuleConfig;
pub use contract::{MetricsPayload, ModuleContract};
pub use error::{ModuleError, ModuleResult};
pub use manifest::{Capability, ModuleManifest, ModuleManifestBuilder, SemVer};
pub use status::ModuleStatus;
