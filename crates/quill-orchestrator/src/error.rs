//! Error types for the Quill orchestrator.

use thiserror::Error;

/// Terminal errors surfaced to the caller of `generate_request_body`.
///
/// Generator and service failures inside the generation-execution loop are
/// never surfaced individually; they are absorbed into corrective turns until
/// the retry budget is exhausted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerateError {
    /// A required input was missing or empty. Raised before any external call.
    #[error("Invalid argument: {0}")]
    Argument(String),

    /// No Workspace service could be resolved from the resource selector.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The retry budget was exhausted without an accepted submission.
    #[error("Failed to generate a valid request body after {attempts} attempts")]
    ExhaustedRetries {
        /// Number of attempts made before giving up.
        attempts: usize,
    },
}

/// Result type alias for orchestrator operations.
pub type Result<T> = std::result::Result<T, GenerateError>;
