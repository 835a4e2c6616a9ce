//! # ctxengine Core
//!
//! Domain types, adapter traits, and error definitions for the ctxengine
//! context assembly pipeline. Every other crate depends inward on this one.
//!
//! ## Layout
//!
//! - [`provenance`]: enumerations, provenance tags, and their lifecycle
//! - [`item`]: the loosely-typed data items adapters hand back
//! - [`package`]: slots and the assembled context package
//! - [`adapter`]: traits for the injected retrieval backends
//! - [`error`]: the error taxonomy shared across crates

pub mod adapter;
pub mod error;
pub mod item;
pub mod package;
pub mod provenance;

// Re-export key types at crate root for ergonomics
pub use adapter::{
    AdapterBundle, EntitySource, KnowledgeSearch, KnowledgeSource, RetrievalQuery, Retriever,
};
pub use error::{AdapterError, Error, PolicyViolation, ProvenanceError, Result};
pub use item::DataItem;
pub use package::{ContextPackage, Slot, SlotContent};
pub use provenance::{
    AuthorityTier, DataClassification, ProvenanceFields, ProvenanceTag, SourceType, Tagged,
    TrustClass,
};
