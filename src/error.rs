//! Error types for frame transmission and network coordination.
//!
//! All errors implement the `std::error::Error` trait and carry enough context
//! to decide whether to retry or to report to a human operator.
//!
//! ## Error Categories
//!
//! - **Transmitter Errors**: the output library/driver is missing or a send failed
//! - **Network Errors**: socket bind, broadcast or receive failures in the coordinator
//! - **Configuration Errors**: unreadable config files or out-of-range values
//! - **Protocol Errors**: malformed peer messages or documents
//! - **State Errors**: a control action that is not legal right now
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use frame_conductor::ConductorError;
//!
//! let error = ConductorError::unavailable("sACN output library not installed");
//! if !error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for conductor operations.
pub type Result<T, E = ConductorError> = std::result::Result<T, E>;

/// Main error type for conductor operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ConductorError {
    #[error("Transmitter unavailable: {reason}")]
    TransmitterUnavailable {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Failed to transmit to universe {universe}")]
    Transmit {
        universe: u16,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Network error during {operation}")]
    Network {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Config file error: {path}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid value {value} for '{field}': expected {expected}")]
    InvalidConfig { field: String, value: String, expected: String },

    #[error("Protocol error: {details}")]
    Protocol { details: String },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Cannot {action} while {status}")]
    InvalidState { action: String, status: String },
}

impl ConductorError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            ConductorError::Transmit { .. } => true,
            ConductorError::Network { .. } => true,
            ConductorError::Timeout { .. } => true,
            ConductorError::InvalidState { .. } => true,
            ConductorError::TransmitterUnavailable { .. } => false,
            ConductorError::ConfigFile { .. } => false,
            ConductorError::InvalidConfig { .. } => false,
            ConductorError::Protocol { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            ConductorError::TransmitterUnavailable { .. } => vec![
                "Install the sACN output library or driver",
                "Check that the network interface used for output is up",
                "Run with --dry-run to exercise the engine without output",
            ],
            ConductorError::Transmit { .. } => vec![
                "Check the output network interface",
                "Verify the universe is routable on this network",
            ],
            ConductorError::Network { .. } => vec![
                "Check that the singleton port is not used by another program",
                "Verify broadcast is permitted on this network",
                "Use --no-singleton to skip network coordination",
            ],
            ConductorError::ConfigFile { .. } => vec![
                "Check the config file exists and is readable",
                "Check write permissions on the config directory",
            ],
            ConductorError::InvalidConfig { .. } => vec![
                "Use a value inside the documented range",
                "Delete the config file to restore defaults",
            ],
            ConductorError::Protocol { .. } => vec![
                "Check that all instances run compatible versions",
                "Verify the document is valid JSON",
            ],
            ConductorError::Timeout { .. } => {
                vec!["Increase the timeout duration", "Check system load"]
            }
            ConductorError::InvalidState { .. } => {
                vec!["Query the current state before issuing the action"]
            }
        }
    }

    /// Helper constructor for a missing or failed transmitter.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        ConductorError::TransmitterUnavailable { reason: reason.into(), source: None }
    }

    /// Helper constructor for a missing or failed transmitter with source.
    pub fn unavailable_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        ConductorError::TransmitterUnavailable { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for a failed send.
    pub fn transmit(
        universe: u16,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        ConductorError::Transmit { universe, source: source.into() }
    }

    /// Helper constructor for socket errors.
    pub fn network(operation: impl Into<String>, source: std::io::Error) -> Self {
        ConductorError::Network { operation: operation.into(), source }
    }

    /// Helper constructor for config file errors with path context.
    pub fn config_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConductorError::ConfigFile { path: path.into(), source }
    }

    /// Helper constructor for out-of-range config values.
    pub fn invalid_config(
        field: impl Into<String>,
        value: impl ToString,
        expected: impl Into<String>,
    ) -> Self {
        ConductorError::InvalidConfig {
            field: field.into(),
            value: value.to_string(),
            expected: expected.into(),
        }
    }

    /// Helper constructor for protocol errors.
    pub fn protocol(details: impl Into<String>) -> Self {
        ConductorError::Protocol { details: details.into() }
    }

    /// Helper constructor for illegal control actions.
    pub fn invalid_state(action: impl Into<String>, status: impl Into<String>) -> Self {
        ConductorError::InvalidState { action: action.into(), status: status.into() }
    }
}

impl From<serde_json::Error> for ConductorError {
    fn from(err: serde_json::Error) -> Self {
        ConductorError::Protocol { details: err.to_string() }
    }
}
