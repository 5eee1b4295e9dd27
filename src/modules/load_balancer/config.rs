//! Load balancer configuration types.

use crate::packet::MacAddr;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Configuration for the load balancer module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadBalancerConfig {
    /// Address clients connect to.
    pub virtual_ip: Ipv4Addr,

    /// Link-layer address answered for the virtual IP.
    pub virtual_mac: MacAddr,

    /// Idle timeout carried by every session rule.
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,

    /// Priority of session rules.
    pub session_priority: u16,

    /// Lowest switch port on which IPv4 senders are learned as clients.
    pub host_port_min: u32,

    /// Delete a session's rules from the switch when it is torn down.
    pub remove_rules_on_close: bool,

    /// Drop sessions the controller has not seen for this long.
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub session_expiry: Option<Duration>,

    /// Backend servers, in rotation order.
    pub backends: Vec<BackendConfig>,
}

impl Default for LoadBalancerConfig {
    fn default() -> Self {
        Self {
            virtual_ip: Ipv4Addr::new(10, 0, 0, 100),
            virtual_mac: MacAddr::new(0, 0, 0, 0, 0xff, 0xff),
            idle_timeout: Duration::from_secs(60),
            session_priority: 20,
            host_port_min: 4,
            remove_rules_on_close: true,
            session_expiry: None,
            backends: Vec::new(),
        }
    }
}

impl LoadBalancerConfig {
    /// Idle timeout in the whole seconds a flow entry carries.
    #[must_use]
    pub fn idle_timeout_secs(&self) -> u16 {
        u16::try_from(self.idle_timeout.as_secs()).unwrap_or(u16::MAX)
    }

    /// Every service port served by at least one backend.
    #[must_use]
    pub fn service_ports(&self) -> BTreeSet<u16> {
        self.backends
            .iter()
            .flat_map(|b| b.services.iter().copied())
            .collect()
    }
}

/// Configuration for a single backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Backend address.
    pub address: Ipv4Addr,

    /// Backend link-layer address.
    pub mac: MacAddr,

    /// Switch port the backend is attached to.
    pub port: u32,

    /// TCP service ports this backend accepts.
    pub services: BTreeSet<u16>,
}

impl BackendConfig {
    /// Create a backend configuration.
    #[must_use]
    pub fn new(
        address: Ipv4Addr,
        mac: MacAddr,
        port: u32,
        services: impl IntoIterator<Item = u16>,
    ) -> Self {
        Self {
            address,
            mac,
            port,
            services: services.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LoadBalancerConfig::default();
        assert!(config.backends.is_empty());
        assert_eq!(config.virtual_ip, Ipv4Addr::new(10, 0, 0, 100));
        assert_eq!(config.virtual_mac.to_string(), "00:00:00:00:ff:ff");
        assert_eq!(config.idle_timeout_secs(), 60);
        assert_eq!(config.session_priority, 20);
        assert_eq!(config.host_port_min, 4);
        assert!(config.remove_rules_on_close);
        assert!(config.session_expiry.is_none());
    }

    #[test]
    fn test_idle_timeout_saturates() {
        let config = LoadBalancerConfig {
            idle_timeout: Duration::from_secs(100_000),
            ..Default::default()
        };
        assert_eq!(config.idle_timeout_secs(), u16::MAX);
    }

    #[test]
    fn test_deserialize_config() {
        let toml = r#"
            virtual_ip = "192.168.1.10"
            virtual_mac = "02:00:00:00:00:0a"
            idle_timeout = "30s"
            session_expiry = "2m"

            [[backends]]
            address = "192.168.1.1"
            mac = "02:00:00:00:00:01"
            port = 1
            services = [8080]

            [[backends]]
            address = "192.168.1.2"
            mac = "02:00:00:00:00:02"
            port = 2
            services = [8080, 8181]
        "#;

        let config: LoadBalancerConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.virtual_ip, Ipv4Addr::new(192, 168, 1, 10));
        assert_eq!(config.idle_timeout, Duration::from_secs(30));
        assert_eq!(config.session_expiry, Some(Duration::from_secs(120)));
        assert_eq!(config.session_priority, 20);
        assert_eq!(config.backends.len(), 2);
        assert_eq!(config.backends[1].port, 2);
        assert!(config.backends[1].services.contains(&8181));
        assert_eq!(
            config.service_ports().into_iter().collect::<Vec<_>>(),
            vec![8080, 8181]
        );
    }
}
