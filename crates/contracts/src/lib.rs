//! Archetype context contracts.
//!
//! A contract says which context slots an agent archetype must receive,
//! may receive, and must never receive, and which budget profile it runs
//! under. Contracts are external data: JSON files named
//! `<archetype>.json`, or the built-in defaults.
//!
//! # Example Contract
//!
//! ```json
//! {
//!   "contract_id": "ctx-worker-v1",
//!   "archetype": "worker",
//!   "version": "1.0.0",
//!   "budget_profile": "standard",
//!   "required_context": ["system_prompt_context", "entity_data", "knowledge_chunks"],
//!   "optional_context": ["few_shot_examples", "tool_schemas"],
//!   "excluded_context": ["cross_agent_context"]
//! }
//! ```
//!
//! Required entries may also use the rich form
//! `{"slot": ..., "fields": [...], "source": ..., "priority": ...}`.

mod model;
mod validate;

pub use model::{
    Archetype, ArchetypeContract, ContextRequirement, ContractSet, Disposition, SlotSpec,
    SourceRequirement, list_archetypes, load_contract,
};
pub use validate::{ContextValidation, validate_context};

use std::path::PathBuf;

/// Re-export for convenience.
pub type ContractResult<T> = std::result::Result<T, ContractError>;

/// Errors from the contract subsystem. All of them are configuration
/// errors and abort whatever asked for the contract.
#[derive(Debug, thiserror::Error)]
pub enum ContractError {
    #[error("unknown contract archetype \"{0}\" (valid: orchestrator, worker, reviewer)")]
    UnknownArchetype(String),

    #[error("contract file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("contract file malformed ({archetype}.json): {detail}")]
    Malformed { archetype: String, detail: String },

    #[error("contract \"{archetype}\" missing required fields: {}", fields.join(", "))]
    MissingFields { archetype: String, fields: Vec<String> },

    #[error("contract file error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<ContractError> for ctxengine_core::Error {
    fn from(err: ContractError) -> Self {
        ctxengine_core::Error::Config {
            message: err.to_string(),
        }
    }
}
