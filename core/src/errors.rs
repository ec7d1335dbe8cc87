//! Error types for the serbridge core crate.
//!
//! The agent wraps these in `anyhow` at its collaborator boundaries; the
//! protocol branches (wrong password, unknown menu key) are not errors and
//! never surface here.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading, validating or saving the configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read or written.
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid JSON or does not match the schema.
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value is out of its domain (empty port, duplicate bind, ...).
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Errors related to opening and driving a UART.
#[derive(Error, Debug)]
pub enum SerialError {
    /// The device could not be opened with the requested settings.
    #[error("Failed to open serial port {port}: {message}")]
    Open { port: String, message: String },

    /// The device rejected a settings change.
    #[error("Failed to configure serial port {port}: {message}")]
    Configure { port: String, message: String },
}
