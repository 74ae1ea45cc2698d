//! Error types for device transport operations.
//!
//! Errors are categorized to drive retry policy and fleet-level reporting.
//! A timeout on the management RPC channel is the only transient category;
//! everything else either indicates an upstream bug (rejected candidate
//! configuration), a deliberate stop (abort), or a per-device hard failure.

use thiserror::Error;

/// Categories of transport errors for retry and reporting decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Session establishment failure (DNS, refused, handshake, auth)
    Connect,
    /// Candidate configuration rejected at load time
    Load,
    /// Commit check / validation rejected the staged configuration
    Validation,
    /// Management-RPC-level timeout (transient, retryable)
    Timeout,
    /// Explicit rejection by the device or the operator
    Abort,
    /// Best-effort rollback failed
    Rollback,
    /// No transport implementation for the device platform
    UnsupportedPlatform,
    /// Malformed or unexpected reply from the device
    Protocol,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Whether this error category is transient and worth retrying.
    ///
    /// Only RPC timeouts qualify: the device may have auto-rolled-back on its
    /// own confirm timer and a later attempt can converge it. An abort is a
    /// deliberate stop condition and a rejected candidate is an upstream
    /// generation bug; retrying either would repeat the same outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// Get a short description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Connect => "Connection failure",
            Self::Load => "Candidate configuration rejected",
            Self::Validation => "Validation failure",
            Self::Timeout => "RPC timeout",
            Self::Abort => "Operation aborted",
            Self::Rollback => "Rollback failure",
            Self::UnsupportedPlatform => "Unsupported platform",
            Self::Protocol => "Protocol error",
            Self::Other => "Unexpected error",
        }
    }
}

/// Errors that can occur while operating on a device.
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to establish the management session.
    ///
    /// DNS failures, refused connections, handshake failures and rejected
    /// authentication all map here; the fleet engine does not need to
    /// distinguish them.
    #[error("connection error: {message}")]
    Connect {
        /// Detail from the failed session establishment
        message: String,
    },

    /// The device rejected the candidate configuration at load time
    #[error("load error: {message}")]
    Load {
        /// Device-reported reason for the rejection
        message: String,
    },

    /// The staged configuration failed commit check / validation
    #[error("validation error: {message}")]
    Validation {
        /// Device-reported validation failure
        message: String,
    },

    /// The management RPC did not complete within the configured timeout
    #[error("RPC timeout: {message}")]
    Timeout {
        /// Which operation timed out
        message: String,
    },

    /// The operation was explicitly aborted by the device or the operator
    #[error("aborted: {message}")]
    Abort {
        /// Why the operation was aborted
        message: String,
    },

    /// The best-effort rollback of staged configuration failed
    #[error("rollback error: {message}")]
    Rollback {
        /// Detail from the failed rollback
        message: String,
    },

    /// No transport implementation matches the device platform tag
    #[error("unsupported platform: {platform}")]
    UnsupportedPlatform {
        /// The unmatched platform tag
        platform: String,
    },

    /// The device replied with something the transport cannot interpret
    #[error("protocol error: {message}")]
    Protocol {
        /// What was unexpected about the reply
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get the error category for retry and reporting decisions.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Connect { .. } => ErrorCategory::Connect,
            Error::Load { .. } => ErrorCategory::Load,
            Error::Validation { .. } => ErrorCategory::Validation,
            Error::Timeout { .. } => ErrorCategory::Timeout,
            Error::Abort { .. } => ErrorCategory::Abort,
            Error::Rollback { .. } => ErrorCategory::Rollback,
            Error::UnsupportedPlatform { .. } => ErrorCategory::UnsupportedPlatform,
            Error::Protocol { .. } => ErrorCategory::Protocol,
            Error::Io(_) => ErrorCategory::Other,
        }
    }

    /// Whether this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Create a connect error from any displayable cause.
    pub fn connect(cause: impl std::fmt::Display) -> Self {
        Error::Connect {
            message: cause.to_string(),
        }
    }

    /// Create a timeout error naming the operation that timed out.
    pub fn timeout(operation: &str) -> Self {
        Error::Timeout {
            message: format!("{operation} did not complete in time"),
        }
    }
}

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, Error>;
