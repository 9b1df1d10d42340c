//! Error types for the game runner.
//!
//! Covers the parts the engine does not own: environment configuration,
//! prompt rendering, and the HTTP calls to LLM backends.

use parley_core::OracleError;

/// Errors that can occur while setting up or calling the LLM oracle.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// Failed to load or render a prompt template.
    #[error("template error: {0}")]
    Template(String),

    /// An LLM backend returned an error or was unreachable.
    #[error("LLM backend error: {0}")]
    LlmBackend(String),

    /// Configuration is invalid or missing.
    #[error("config error: {0}")]
    Config(String),

    /// Serialization or deserialization failure.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<RunnerError> for OracleError {
    fn from(e: RunnerError) -> Self {
        Self::Backend {
            message: e.to_string(),
        }
    }
}
