//! Protocol error types.

use thiserror::Error;

/// Errors raised while encoding or decoding protocol data.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown opcode: {0}")]
    UnknownOpcode(i16),

    #[error("string too long: {len} bytes (max {max})")]
    StringTooLong { len: usize, max: usize },

    #[error("invalid UTF-8 in string")]
    InvalidUtf8,

    #[error("truncated record: need {needed} bytes, got {got}")]
    Truncated { needed: usize, got: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::UnknownOpcode(4242);
        assert!(err.to_string().contains("4242"));

        let err = ProtocolError::StringTooLong { len: 2000, max: 1024 };
        let msg = err.to_string();
        assert!(msg.contains("2000"));
        assert!(msg.contains("1024"));

        let err = ProtocolError::InvalidUtf8;
        assert!(err.to_string().contains("UTF-8"));

        let err = ProtocolError::Truncated { needed: 12, got: 3 };
        assert!(err.to_string().contains("12"));
    }
}
