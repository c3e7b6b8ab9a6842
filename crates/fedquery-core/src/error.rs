//! Core error taxonomy.
//!
//! Every failure class carries a stable kind tag. The tag is what error
//! Records expose to consumers, so its string form must not change once
//! published.

use thiserror::Error;

/// Stable failure classification used by [`CoreError`] and error Records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed URL or query key, rejected before any I/O.
    InvalidInput,
    /// Transport or connection failure after local retries.
    Network,
    /// Malformed backend payload.
    Parse,
    /// Credential refresh failure.
    Auth,
    /// Per-round deadline expired while requests were still pending.
    Timeout,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::Network => "network_error",
            Self::Parse => "parse_error",
            Self::Auth => "auth_error",
            Self::Timeout => "timeout_error",
        }
    }
}

/// Structured core error. Lower layers never panic: failures surface either
/// as a `CoreError` value or as an error Record built from one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("network failure: {0}")]
    Network(String),
    #[error("parse failure: {0}")]
    Parse(String),
    #[error("credential refresh failed: {0}")]
    Auth(String),
    #[error("deadline expired: {0}")]
    Timeout(String),
}

impl CoreError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Network(_) => ErrorKind::Network,
            Self::Parse(_) => ErrorKind::Parse,
            Self::Auth(_) => ErrorKind::Auth,
            Self::Timeout(_) => ErrorKind::Timeout,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::InvalidInput(msg)
            | Self::Network(msg)
            | Self::Parse(msg)
            | Self::Auth(msg)
            | Self::Timeout(msg) => msg,
        }
    }
}
