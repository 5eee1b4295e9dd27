//! Header codec error types.

use thiserror::Error;

/// Errors that can occur while decoding link-layer frames.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    /// The buffer ended before a complete header could be read.
    #[error("truncated {layer} header: need {needed} bytes, have {available}")]
    Truncated {
        /// Header being decoded.
        layer: &'static str,
        /// Bytes required.
        needed: usize,
        /// Bytes available.
        available: usize,
    },

    /// A header field holds a value the codec cannot accept.
    #[error("malformed {layer} header: {reason}")]
    Malformed {
        /// Header being decoded.
        layer: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// A MAC address string could not be parsed.
    #[error("invalid MAC address '{0}'")]
    InvalidMac(String),
}

impl PacketError {
    pub(crate) fn truncated(layer: &'static str, needed: usize, available: usize) -> Self {
        Self::Truncated {
            layer,
            needed,
            available,
        }
    }

    pub(crate) fn malformed(layer: &'static str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            layer,
            reason: reason.into(),
        }
    }
}

/// Result type for header codec operations.
pub type PacketResult<T> = Result<T, PacketError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PacketError::truncated("ipv4", 20, 12);
        assert_eq!(
            err.to_string(),
            "truncated ipv4 header: need 20 bytes, have 12"
        );

        let err = PacketError::malformed("tcp", "data offset 3");
        assert_eq!(err.to_string(), "malformed tcp header: data offset 3");
    }
}
