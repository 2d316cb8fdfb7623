//! Client error types.

use aerolite_protocol::{ProtocolError, ResultCode};
use thiserror::Error;

/// Errors surfaced by the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport failure. Never retried at this layer; whether to
    /// reconnect is the caller's decision.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Structural codec failure; frame alignment on the connection is
    /// suspect afterwards.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The node answered with a nonzero result code the retry policy did
    /// not absorb.
    #[error("server error: {0}")]
    Server(ResultCode),

    /// Connecting did not finish inside the configured timeout.
    #[error("connect timeout")]
    Timeout,
}

impl ClientError {
    /// True for the not-found result code, the soft miss the high-level
    /// API maps to `false` answers.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::Server(code) if code.is_not_found())
    }
}
