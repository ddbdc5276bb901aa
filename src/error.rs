//! Error types for layout configuration, graph files and the GPU backend
//!
//! Degenerate geometry, buffer growth and a missing GPU are handled inside
//! the engine and never surface here.

use thiserror::Error;

/// Errors that can occur while configuring or driving a layout
#[derive(Error, Debug)]
pub enum LayoutError {
    /// A configuration value is outside its valid range
    #[error("invalid config field `{field}`: {reason}")]
    InvalidConfig {
        field: &'static str,
        reason: String,
    },

    /// An I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A config or graph file could not be parsed
    #[error("parse error: {0}")]
    Parse(String),

    /// The compute device rejected an operation (buffer mapping, device loss)
    #[error("GPU error: {0}")]
    Gpu(String),
}

impl LayoutError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for LayoutError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

impl From<serde_yaml::Error> for LayoutError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

/// Result type for layout operations
pub type LayoutResult<T> = Result<T, LayoutError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_config_names_the_field() {
        let err = LayoutError::invalid("timestep", "must be positive");
        assert_eq!(
            err.to_string(),
            "invalid config field `timestep`: must be positive"
        );
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: LayoutError = io.into();
        assert!(matches!(err, LayoutError::Io(_)));
    }
}
