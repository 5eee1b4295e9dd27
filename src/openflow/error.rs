//! OpenFlow wire error types.

use thiserror::Error;

/// Errors that can occur while encoding or decoding OpenFlow messages.
#[derive(Debug, Error)]
pub enum OpenFlowError {
    /// IO error on the switch connection.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer speaks a protocol version we do not.
    #[error("unsupported OpenFlow version {0:#04x}")]
    UnsupportedVersion(u8),

    /// A structure ended early.
    #[error("truncated {what}: need {needed} bytes, have {available}")]
    Truncated {
        /// Structure being decoded.
        what: &'static str,
        /// Bytes required.
        needed: usize,
        /// Bytes available.
        available: usize,
    },

    /// A length field is inconsistent with the structure it describes.
    #[error("invalid length {length} for {what}")]
    InvalidLength {
        /// Structure being decoded.
        what: &'static str,
        /// Offending length.
        length: usize,
    },
}

/// Result type for OpenFlow wire operations.
pub type OpenFlowResult<T> = Result<T, OpenFlowError>;
