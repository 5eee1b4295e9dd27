//! Backend registry.

use super::config::BackendConfig;
use super::error::{LoadBalancerError, LoadBalancerResult};
use crate::packet::MacAddr;
use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::sync::Arc;

/// A backend server behind the virtual IP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backend {
    address: Ipv4Addr,
    mac: MacAddr,
    switch_port: u32,
    services: BTreeSet<u16>,
}

impl Backend {
    /// Create a new backend from configuration.
    #[must_use]
    pub fn new(config: &BackendConfig) -> Self {
        Self {
            address: config.address,
            mac: config.mac,
            switch_port: config.port,
            services: config.services.clone(),
        }
    }

    /// Get the backend address.
    #[must_use]
    pub fn address(&self) -> Ipv4Addr {
        self.address
    }

    /// Get the backend link-layer address.
    #[must_use]
    pub fn mac(&self) -> MacAddr {
        self.mac
    }

    /// Get the switch port the backend hangs off.
    #[must_use]
    pub fn switch_port(&self) -> u32 {
        self.switch_port
    }

    /// Get the service ports this backend accepts.
    #[must_use]
    pub fn services(&self) -> &BTreeSet<u16> {
        &self.services
    }

    /// Check whether this backend accepts `port`.
    #[must_use]
    pub fn serves(&self, port: u16) -> bool {
        self.services.contains(&port)
    }
}

/// The fixed, ordered set of backends.
///
/// Order is configuration order and is what round-robin rotates over.
#[derive(Debug, Clone, Default)]
pub struct BackendRegistry {
    backends: Vec<Arc<Backend>>,
}

impl BackendRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from configuration, rejecting duplicate addresses
    /// and backends that serve nothing.
    pub fn from_configs(configs: &[BackendConfig]) -> LoadBalancerResult<Self> {
        let mut registry = Self::new();
        for config in configs {
            registry.add(Backend::new(config))?;
        }
        Ok(registry)
    }

    /// Append a backend.
    pub fn add(&mut self, backend: Backend) -> LoadBalancerResult<()> {
        if self.contains(backend.address()) {
            return Err(LoadBalancerError::DuplicateBackend(backend.address()));
        }
        if backend.services().is_empty() {
            return Err(LoadBalancerError::NoServices(backend.address()));
        }
        self.backends.push(Arc::new(backend));
        Ok(())
    }

    /// Backends that accept `port`, in registry order.
    #[must_use]
    pub fn eligible(&self, port: u16) -> Vec<Arc<Backend>> {
        self.backends
            .iter()
            .filter(|b| b.serves(port))
            .cloned()
            .collect()
    }

    /// Look up a backend by address.
    #[must_use]
    pub fn get(&self, address: Ipv4Addr) -> Option<&Arc<Backend>> {
        self.backends.iter().find(|b| b.address() == address)
    }

    /// Check whether `address` belongs to a backend.
    #[must_use]
    pub fn contains(&self, address: Ipv4Addr) -> bool {
        self.get(address).is_some()
    }

    /// Number of backends.
    #[must_use]
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// Whether there are no backends.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}
