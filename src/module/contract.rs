//! The core Module Contract trait.

use super::{ModuleConfig, ModuleManifest, ModuleResult, ModuleStatus};
use std::collections::BTreeMap;
use std::fmt::Write;

/// Metrics payload containing module-specific metrics.
#[derive(Debug, Clone, Default)]
pub struct MetricsPayload {
    /// Counter metrics (monotonically increasing).
    pub counters: BTreeMap<String, u64>,

    /// Gauge metrics (can go up and down).
    pub gauges: BTreeMap<String, f64>,
}

impl MetricsPayload {
    /// Creates a new empty metrics payload.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a counter metric.
    pub fn counter(&mut self, name: impl Into<String>, value: u64) {
        self.counters.insert(name.into(), value);
    }

    /// Adds a gauge metric.
    pub fn gauge(&mut self, name: impl Into<String>, value: f64) {
        self.gauges.insert(name.into(), value);
    }

    /// Formats metrics in Prometheus text format, sorted by name.
    #[must_use]
    pub fn to_prometheus(&self, prefix: &str) -> String {
        let mut output = String::new();

        for (name, value) in &self.counters {
            let _ = writeln!(output, "# TYPE {prefix}_{name} counter");
            let _ = writeln!(output, "{prefix}_{name} {value}");
        }

        for (name, value) in &self.gauges {
            let _ = writeln!(output, "# TYPE {prefix}_{name} gauge");
            let _ = writeln!(output, "{prefix}_{name} {value}");
        }

        output
    }
}

/// The contract every controller module implements.
///
/// # Lifecycle
///
/// 1. `manifest()` - Called to discover module capabilities
/// 2. `init()` - Initialize with configuration
/// 3. `start()` - Begin processing
/// 4. `status()` / `metrics()` - Ongoing monitoring
/// 5. `reload()` - Apply new configuration
/// 6. `stop()` - Graceful shutdown
pub trait ModuleContract: Send + Sync {
    /// Returns the module's manifest describing its identity and capabilities.
    fn manifest(&self) -> ModuleManifest;

    /// Initializes the module with the provided configuration.
    ///
    /// The module should validate the configuration and prepare internal
    /// state, but should not start processing until `start()` is called.
    ///
    /// # Errors
    ///
    /// Returns `ModuleError::ConfigError` if the configuration is invalid.
    fn init(&mut self, config: ModuleConfig) -> ModuleResult<()>;

    /// Starts the module's processing.
    ///
    /// # Errors
    ///
    /// Returns `ModuleError::InvalidState` if the module is already running.
    fn start(&mut self) -> ModuleResult<()>;

    /// Stops the module gracefully.
    ///
    /// # Errors
    ///
    /// Returns `ModuleError::InvalidState` if the module is not running.
    fn stop(&mut self) -> ModuleResult<()>;

    /// Reloads the module's configuration.
    ///
    /// # Errors
    ///
    /// Returns `ModuleError::ConfigError` if the new configuration is invalid.
    fn reload(&mut self, config: ModuleConfig) -> ModuleResult<()>;

    /// Returns the current status of the module.
    fn status(&self) -> ModuleStatus;

    /// Returns the current metrics from the module.
    fn metrics(&self) -> MetricsPayload;

    /// Liveness check. Defaults to "operational".
    fn heartbeat(&self) -> bool {
        self.status().is_operational()
    }
}
