//! Error types for the ctxengine domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all ctxengine operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Policy errors ---
    #[error("Policy violation: {0}")]
    Policy(#[from] PolicyViolation),

    // --- Provenance errors ---
    #[error("Provenance error: {0}")]
    Provenance(#[from] ProvenanceError),

    // --- Adapter errors ---
    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// A hard security policy was broken. Never degraded, always surfaced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyViolation {
    #[error("source \"{source_type}\" is on the never-allowed list")]
    NeverAllowedSource { source_type: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProvenanceError {
    #[error("invalid provenance tag: {}", errors.join("; "))]
    Invalid { errors: Vec<String> },
}

/// Failures raised by injected adapters.
///
/// Only [`AdapterError::ContractViolation`] aborts assembly; everything else
/// degrades to an empty result at the call site.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    #[error("{adapter} failed: {reason}")]
    Failed { adapter: String, reason: String },

    #[error("{adapter} timed out after {timeout_ms}ms")]
    Timeout { adapter: String, timeout_ms: u64 },

    #[error("circuit open for {0}")]
    CircuitOpen(String),

    #[error("{adapter} broke its type contract: {detail}")]
    ContractViolation { adapter: String, detail: String },
}

impl AdapterError {
    pub fn failed(adapter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Failed {
            adapter: adapter.into(),
            reason: reason.into(),
        }
    }

    /// Whether this failure may be absorbed by graceful degradation.
    pub fn is_degradable(&self) -> bool {
        !matches!(self, Self::ContractViolation { .. })
    }
}
