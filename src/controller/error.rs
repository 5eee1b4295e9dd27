//! Controller runtime error types.

use crate::config::ConfigError;
use crate::module::ModuleError;
use crate::openflow::OpenFlowError;
use std::time::Duration;
use thiserror::Error;

/// Errors that end a switch connection or the listener, or fail a reload.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Socket error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The switch sent something we could not decode.
    #[error("protocol error: {0}")]
    Protocol(#[from] OpenFlowError),

    /// The switch offered a version older than OpenFlow 1.3.
    #[error("switch speaks OpenFlow version {0:#04x}, need 0x04")]
    IncompatibleVersion(u8),

    /// The switch stopped answering keepalives.
    #[error("no message from switch in {0:?}")]
    EchoTimeout(Duration),

    /// A reloaded configuration file was rejected.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// The load balancer refused a configuration.
    #[error("module error: {0}")]
    Module(#[from] ModuleError),
}

/// Result type for the controller runtime.
pub type ControllerResult<T> = Result<T, ControllerError>;
