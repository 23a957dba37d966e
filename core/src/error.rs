//! # Error Handling
//!
//! Provides the unified `AppError` enum used across the workspace.
//!
//! Resolution problems found inside a document (missing targets, infinite
//! cycles) are not errors in this sense: the resolver reports them as values
//! so one pass surfaces all of them. `AppError` covers the failures that stop
//! a single operation: unreadable files, unparsable content, lookups that no
//! registered filesystem could serve.

use derive_more::{Display, From};

/// The Global Error Enum.
///
/// We use `derive_more` for boilerplate.
/// Note: String errors default to `General`.
#[derive(Debug, Display, From)]
pub enum AppError {
    /// Wrapper for standard IO errors.
    #[display("IO Error: {_0}")]
    Io(std::io::Error),

    /// Content that is not valid YAML (or JSON).
    #[display("YAML Error: {_0}")]
    Yaml(serde_yaml::Error),

    /// JSON serialization failure.
    #[display("JSON Error: {_0}")]
    Json(serde_json::Error),

    /// A file could not be parsed or indexed during a bulk indexing pass.
    #[from(ignore)]
    #[display("unable to index file '{path}': {reason}")]
    FileIndex {
        /// Canonical full path of the file.
        path: String,
        /// What went wrong.
        reason: String,
    },

    /// No registered filesystem could serve the requested location.
    #[from(ignore)]
    #[display("unable to open '{location}': {}", attempts.join("; "))]
    FileLookup {
        /// The location as requested by the caller.
        location: String,
        /// One entry per failed attempt, in the order attempted.
        attempts: Vec<String>,
    },

    /// Several independent failures, joined without aborting sibling work.
    #[from(ignore)]
    #[display("{}", join_errors(_0))]
    Multiple(Vec<AppError>),

    /// Generic errors.
    #[display("General Error: {_0}")]
    General(String),
}

/// Manual implementation of the standard Error trait.
impl std::error::Error for AppError {}

/// Helper type alias for Result using AppError.
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Joins a list of errors, returning `None` when the list is empty.
    pub fn join(errors: Vec<AppError>) -> Option<AppError> {
        if errors.is_empty() {
            None
        } else {
            Some(AppError::Multiple(errors))
        }
    }

    /// Flattens this error into its leaves (nested `Multiple` lists are expanded).
    pub fn leaves(&self) -> Vec<&AppError> {
        match self {
            AppError::Multiple(inner) => inner.iter().flat_map(|e| e.leaves()).collect(),
            other => vec![other],
        }
    }
}

fn join_errors(errors: &[AppError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}
