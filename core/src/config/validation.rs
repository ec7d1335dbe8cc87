//! Semantic checks on a parsed [`ServerConfig`].
//!
//! Serde already enforces the shape of the file; [`validate_config`]
//! catches values that parse but cannot be served (duplicate ports,
//! unsupported line settings, empty secrets).

use std::collections::HashSet;

use super::{ServerConfig, UartKind};

/// A single validation error for a configuration field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dot-path to the field (e.g., `"bridges.0.uart.bits"`).
    pub field: String,
    /// Human-readable error message.
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a configuration. An empty list means it can be served.
pub fn validate_config(config: &ServerConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if config.bridges.is_empty() {
        errors.push(ValidationError::new(
            "bridges",
            "at least one bridge is required",
        ));
    }

    let mut uart_ports = HashSet::new();
    let mut binds = HashSet::new();

    for (i, bridge) in config.bridges.iter().enumerate() {
        let prefix = format!("bridges.{i}");
        let uart = &bridge.uart;

        let device = uart.port.device_path();
        if device.trim().is_empty() {
            errors.push(ValidationError::new(
                format!("{prefix}.uart.port"),
                "serial port must not be empty",
            ));
        } else if !uart_ports.insert(device.clone()) {
            errors.push(ValidationError::new(
                format!("{prefix}.uart.port"),
                format!("{device} is already used by another bridge"),
            ));
        }

        if uart.baudrate == 0 {
            errors.push(ValidationError::new(
                format!("{prefix}.uart.baudrate"),
                "baud rate must be positive",
            ));
        }
        if !(5..=8).contains(&uart.bits) {
            errors.push(ValidationError::new(
                format!("{prefix}.uart.bits"),
                format!("{} data bits not supported (5-8)", uart.bits),
            ));
        }
        if !matches!(uart.stop, 1 | 2) {
            errors.push(ValidationError::new(
                format!("{prefix}.uart.stop"),
                format!("{} stop bits not supported (1 or 2)", uart.stop),
            ));
        }
        if uart.kind == UartKind::Soft && (uart.tx.is_none() || uart.rx.is_none()) {
            errors.push(ValidationError::new(
                format!("{prefix}.uart"),
                "SoftUART requires tx and rx pins",
            ));
        }

        let bind = &bridge.tcp.bind;
        if bind.port == 0 {
            errors.push(ValidationError::new(
                format!("{prefix}.tcp.bind"),
                "port must be non-zero",
            ));
        } else if !binds.insert((bind.host.clone(), bind.port)) {
            errors.push(ValidationError::new(
                format!("{prefix}.tcp.bind"),
                format!("{bind} is already used by another bridge"),
            ));
        }

        if let Some(auth) = &bridge.auth {
            if auth.password.is_empty() {
                errors.push(ValidationError::new(
                    format!("{prefix}.auth.password"),
                    "password must not be empty",
                ));
            }
        }

        if let Some(tls) = &bridge.ssl {
            if tls.cert.is_empty() {
                errors.push(ValidationError::new(
                    format!("{prefix}.ssl.cert"),
                    "certificate path must not be empty",
                ));
            }
            if tls.key.is_empty() {
                errors.push(ValidationError::new(
                    format!("{prefix}.ssl.key"),
                    "key path must not be empty",
                ));
            }
        }
    }

    if let Some(syslog) = &config.syslog {
        if syslog.host.is_empty() {
            errors.push(ValidationError::new("syslog.host", "host must not be empty"));
        }
    }

    errors
}
