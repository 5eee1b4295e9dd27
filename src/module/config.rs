//! Module configuration handoff.

use super::error::{ModuleError, ModuleResult};
use serde::Serialize;

/// Configuration handed to a module on `init` and `reload`.
///
/// Modules receive their own section of the controller configuration as a
/// raw TOML document and deserialize it into their typed config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleConfig {
    raw: Option<String>,
}

impl ModuleConfig {
    /// Creates an empty configuration; modules fall back to their defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a ModuleConfig from a raw TOML string.
    #[must_use]
    pub fn from_raw(raw: String) -> Self {
        Self { raw: Some(raw) }
    }

    /// Serializes a typed configuration section.
    ///
    /// # Errors
    ///
    /// Returns `ModuleError::ConfigError` if the section cannot be
    /// represented as a TOML table.
    pub fn from_section<T: Serialize>(section: &T) -> ModuleResult<Self> {
        toml::to_string(section)
            .map(Self::from_raw)
            .map_err(|e| ModuleError::ConfigError(format!("failed to serialize config: {e}")))
    }

    /// Gets the raw configuration string.
    #[must_use]
    pub fn raw_config(&self) -> Option<&str> {
        self.raw.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Section {
        name: &'static str,
        port: u16,
    }

    #[test]
    fn test_from_section() {
        let config = ModuleConfig::from_section(&Section {
            name: "lb",
            port: 6653,
        })
        .unwrap();
        let raw = config.raw_config().unwrap();
        assert!(raw.contains("name = \"lb\""));
        assert!(raw.contains("port = 6653"));
    }

    #[test]
    fn test_empty() {
        assert!(ModuleConfig::new().raw_config().is_none());
    }
}
