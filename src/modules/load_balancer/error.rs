//! Load balancer error types.

use std::net::Ipv4Addr;
use thiserror::Error;

/// Errors that can occur in the load balancer module.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadBalancerError {
    /// No configured backend serves the requested port.
    #[error("no backend serves port {0}")]
    NoEligibleBackend(u16),

    /// Two backends share an address.
    #[error("backend {0} configured more than once")]
    DuplicateBackend(Ipv4Addr),

    /// A backend serves no ports.
    #[error("backend {0} serves no ports")]
    NoServices(Ipv4Addr),

    /// The virtual IP is also a backend address.
    #[error("virtual IP {0} collides with a backend")]
    VirtualIpIsBackend(Ipv4Addr),

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),
}

/// Result type for load balancer operations.
pub type LoadBalancerResult<T> = Result<T, LoadBalancerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LoadBalancerError::NoEligibleBackend(9090);
        assert_eq!(err.to_string(), "no backend serves port 9090");

        let err = LoadBalancerError::DuplicateBackend(Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(err.to_string(), "backend 10.0.0.1 configured more than once");
    }
}
