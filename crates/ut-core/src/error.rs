//! Error taxonomy for the outbound core.
//!
//! The split matters for callers: `InvalidConfig`/`UnknownProtocol`/
//! `DuplicateProtocol` are construction-time and never retried; `Dial` and
//! `Handshake` are consumed by the retry loop; `OutboundFailed` and `Closed`
//! are terminal for a given outbound instance.

use thiserror::Error;
use ut_transport::DialError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{protocol}: invalid config: {reason}")]
    InvalidConfig { protocol: String, reason: String },

    #[error("unknown protocol: {0}")]
    UnknownProtocol(String),

    #[error("duplicate protocol registration: {0}")]
    DuplicateProtocol(String),

    #[error("{protocol}: dial failed: {source}")]
    Dial {
        protocol: String,
        #[source]
        source: DialError,
    },

    #[error("{protocol}: handshake failed: {reason}")]
    Handshake { protocol: String, reason: String },

    /// Stored when the attempt budget is exhausted; every later call on the
    /// same outbound gets this back verbatim.
    #[error("{protocol}: failed after {attempts} attempts: {reason}")]
    OutboundFailed {
        protocol: String,
        attempts: u32,
        reason: String,
    },

    #[error("outbound closed")]
    Closed,

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    pub fn invalid_config(protocol: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::InvalidConfig {
            protocol: protocol.into(),
            reason: reason.into(),
        }
    }

    pub fn handshake(protocol: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::Handshake {
            protocol: protocol.into(),
            reason: reason.into(),
        }
    }
}
