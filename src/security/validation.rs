//! Request field validation, applied before any hub call.

use std::time::Duration;

use thiserror::Error;

use crate::error::HubError;

/// Validation limits.
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    /// Maximum length of connection, session and credential ids.
    pub max_id_length: usize,
    /// Maximum command length in bytes.
    pub max_command_length: usize,
    /// Maximum path length in bytes.
    pub max_path_length: usize,
    /// Maximum host name length.
    pub max_host_length: usize,
    /// Largest accepted terminal width or height.
    pub max_dimension: u16,
    /// Read timeouts are clamped to this range.
    pub min_read_timeout: Duration,
    pub max_read_timeout: Duration,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_id_length: 128,
            max_command_length: 64 * 1024,
            max_path_length: 4096,
            max_host_length: 255,
            max_dimension: 1000,
            min_read_timeout: Duration::from_millis(1),
            max_read_timeout: Duration::from_millis(300_000),
        }
    }
}

/// Request validator.
#[derive(Debug, Default)]
pub struct RequestValidator {
    config: ValidationConfig,
}

impl RequestValidator {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Validate a caller-chosen id. `field` names it in the error.
    pub fn validate_id(&self, field: &'static str, id: &str) -> Result<(), ValidationError> {
        if id.is_empty() {
            return Err(ValidationError::Empty(field));
        }
        if id.len() > self.config.max_id_length {
            return Err(ValidationError::TooLong {
                field,
                length: id.len(),
                max: self.config.max_id_length,
            });
        }
        if let Some(c) = id.chars().find(|c| c.is_control()) {
            return Err(ValidationError::InvalidCharacter { field, found: c });
        }
        Ok(())
    }

    pub fn validate_host(&self, host: &str) -> Result<(), ValidationError> {
        if host.trim().is_empty() {
            return Err(ValidationError::Empty("host"));
        }
        if host.len() > self.config.max_host_length {
            return Err(ValidationError::TooLong {
                field: "host",
                length: host.len(),
                max: self.config.max_host_length,
            });
        }
        if let Some(c) = host.chars().find(|c| c.is_control() || c.is_whitespace()) {
            return Err(ValidationError::InvalidCharacter {
                field: "host",
                found: c,
            });
        }
        Ok(())
    }

    pub fn validate_port(&self, port: u16) -> Result<(), ValidationError> {
        if port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }

    /// Validate terminal dimensions.
    pub fn validate_dimensions(&self, cols: u16, rows: u16) -> Result<(), ValidationError> {
        let max = self.config.max_dimension;
        for (field, value) in [("cols", cols), ("rows", rows)] {
            if value == 0 || value > max {
                return Err(ValidationError::OutOfRange { field, value, max });
            }
        }
        Ok(())
    }

    /// Validate a command line.
    pub fn validate_command(&self, command: &str) -> Result<(), ValidationError> {
        if command.len() > self.config.max_command_length {
            return Err(ValidationError::TooLong {
                field: "command",
                length: command.len(),
                max: self.config.max_command_length,
            });
        }
        if command.trim().is_empty() {
            return Err(ValidationError::Empty("command"));
        }
        if command.contains('\0') {
            return Err(ValidationError::InvalidCharacter {
                field: "command",
                found: '\0',
            });
        }
        Ok(())
    }

    /// Validate a local or remote path.
    pub fn validate_path(&self, field: &'static str, path: &str) -> Result<(), ValidationError> {
        if path.is_empty() {
            return Err(ValidationError::Empty(field));
        }
        if path.len() > self.config.max_path_length {
            return Err(ValidationError::TooLong {
                field,
                length: path.len(),
                max: self.config.max_path_length,
            });
        }
        if path.contains('\0') {
            return Err(ValidationError::InvalidCharacter { field, found: '\0' });
        }
        Ok(())
    }

    /// Clamp a read timeout in milliseconds to the accepted range.
    pub fn read_timeout(&self, timeout_ms: u64) -> Duration {
        Duration::from_millis(timeout_ms).clamp(self.config.min_read_timeout, self.config.max_read_timeout)
    }
}

/// Validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("{field} too long: {length} bytes (max: {max})")]
    TooLong {
        field: &'static str,
        length: usize,
        max: usize,
    },

    #[error("{field} contains invalid character {found:?}")]
    InvalidCharacter { field: &'static str, found: char },

    #[error("port must be non-zero")]
    InvalidPort,

    #[error("{field} out of range: {value} (expected 1..={max})")]
    OutOfRange {
        field: &'static str,
        value: u16,
        max: u16,
    },
}

impl From<ValidationError> for HubError {
    fn from(e: ValidationError) -> Self {
        HubError::InvalidParams(e.to_string())
    }
}

/// Strip control characters and cap the length, for log lines.
pub fn sanitize_for_display(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || *c == '\t')
        .take(200)
        .collect()
}
