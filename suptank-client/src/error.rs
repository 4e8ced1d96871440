//! Client error types.

use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] suptank_protocol::ProtocolError),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("request timeout")]
    Timeout,

    #[error("server replied ERROR")]
    Rejected,

    #[error("unexpected reply opcode {0}")]
    UnexpectedReply(i16),
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe => ClientError::ConnectionClosed,
            std::io::ErrorKind::TimedOut => ClientError::Timeout,
            _ => ClientError::Io(err),
        }
    }
}

impl ClientError {
    /// Returns whether the server refused the request.
    pub fn is_rejected(&self) -> bool {
        matches!(self, ClientError::Rejected)
    }

    /// Returns whether the connection is gone.
    pub fn is_closed(&self) -> bool {
        matches!(self, ClientError::ConnectionClosed)
    }
}
