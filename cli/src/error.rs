#![deny(missing_docs)]

//! # CLI Errors
//!
//! Error types for the CLI crate.

use derive_more::{Display, From};
use refwalk_core::AppError;

/// Main error enum for CLI operations.
#[derive(Debug, Display, From)]
pub enum CliError {
    /// IO Error wrapper.
    #[display("IO Error: {}", _0)]
    Io(std::io::Error),

    /// Failure raised by the core library.
    #[display("{}", _0)]
    Core(AppError),

    /// Output serialization failure (YAML).
    #[display("YAML Error: {}", _0)]
    Yaml(serde_yaml::Error),

    /// Output serialization failure (JSON).
    #[display("JSON Error: {}", _0)]
    Json(serde_json::Error),

    /// The run completed but reported problems.
    #[from(ignore)]
    #[display("{} problem(s) reported", _0)]
    Reported(usize),
}

/// Manual implementation of the standard Error trait.
impl std::error::Error for CliError {}

/// Result type alias.
pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_error_converts() {
        let err: CliError = AppError::General("boom".into()).into();
        assert!(matches!(err, CliError::Core(_)));
        assert_eq!(err.to_string(), "General Error: boom");
    }

    #[test]
    fn test_reported_display() {
        assert_eq!(CliError::Reported(3).to_string(), "3 problem(s) reported");
    }
}
