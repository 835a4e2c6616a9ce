//! Trust & authority resolution, entitlement checks, and provenance
//! tagging.
//!
//! - [`TrustResolver`] classifies source types and blocks deny-listed ones
//! - [`rank_sources`] / [`resolve_conflict`] order competing sources
//! - [`AccessPolicy`] maps data types to classifications and checks roles
//! - [`provenance`] creates, validates, merges, and collects tags

pub mod access;
pub mod provenance;
mod resolver;

pub use access::AccessPolicy;
pub use resolver::{
    AuthoritySource, NEVER_ALLOWED, Resolution, ResolutionKind, TrustResolver, is_never_allowed,
    rank_sources, resolve_conflict,
};
