//! Common error types for healthprobe components.

use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

/// A specialized Result type for healthprobe operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for healthprobe operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Rejected by SSRF validation. Counts as invalid input.
    #[error("SSRF validation failed: {0}")]
    Ssrf(#[from] SsrfError),

    /// The probe did not settle within its time budget; health is unknown.
    #[error("Probe {probe:?} timed out after {timeout:?}")]
    Timeout { probe: String, timeout: Duration },

    /// An operator-supplied hook failed while a probe was running.
    #[error("Probe hook failed: {0:#}")]
    Hook(anyhow::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a new invalid input error.
    pub fn invalid_input(msg: impl fmt::Display) -> Self {
        Error::InvalidInput(msg.to_string())
    }

    /// Create a new configuration error.
    pub fn config(msg: impl fmt::Display) -> Self {
        Error::Config(msg.to_string())
    }

    /// True for plain invalid input and for every SSRF rejection.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Error::InvalidInput(_) | Error::Ssrf(_))
    }

    /// True when a probe run ran out of time without producing a report.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }
}

/// Reasons a target was refused by SSRF validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SsrfError {
    #[error("URL scheme must be one of [\"http\", \"https\"], got {0:?}")]
    DisallowedScheme(String),

    #[error("host {0:?} must not be localhost when private hosts are blocked")]
    Localhost(String),

    #[error("host {0} is loopback, private or reserved")]
    BlockedAddress(IpAddr),

    #[error("host {host:?} resolves to blocked address {addr}")]
    ResolvesToBlocked { host: String, addr: IpAddr },
}
