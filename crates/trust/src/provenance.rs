//! Provenance tagging operations.
//!
//! Thin, clock-aware entry points over [`ProvenanceTag`], plus the
//! collection step that gathers every valid tag from a set of items and
//! drops the rest with a warning.

use chrono::{DateTime, Utc};
use ctxengine_core::provenance::{self, REQUIRED_FIELDS, ValidationOutcome};
use ctxengine_core::{AuthorityTier, DataItem, ProvenanceError, ProvenanceFields, ProvenanceTag, Tagged};
use tracing::warn;

pub use ctxengine_core::provenance::compute_chunk_hash;

/// Create a tag, defaulting `fetched_at` to now and `ttl_seconds` to one
/// hour, and validate it.
pub fn create_provenance_tag(fields: ProvenanceFields) -> Result<ProvenanceTag, ProvenanceError> {
    ProvenanceTag::create(fields, Utc::now())
}

pub fn validate_provenance(fields: &ProvenanceFields) -> ValidationOutcome {
    provenance::validate(fields)
}

pub fn is_expired(tag: &ProvenanceTag, now: DateTime<Utc>) -> bool {
    tag.is_expired_at(now)
}

/// Tag for data derived from two sources. Never more trusted, more
/// authoritative, longer-lived, or less restricted than either input.
pub fn merge_provenance(a: &ProvenanceTag, b: &ProvenanceTag) -> ProvenanceTag {
    ProvenanceTag::merge(a, b, Utc::now())
}

pub fn tag_provenance<T>(data: T, fields: ProvenanceFields) -> Result<Tagged<T>, ProvenanceError> {
    Tagged::new(data, fields)
}

pub fn strip_provenance<T>(tagged: Tagged<T>) -> T {
    tagged.into_data()
}

/// The authority tier in raw fields, if present and in range.
pub fn authority_tier_of(fields: &ProvenanceFields) -> Option<AuthorityTier> {
    fields
        .authority_tier
        .and_then(|raw| AuthorityTier::try_from(raw).ok())
}

pub fn required_fields() -> &'static [&'static str] {
    &REQUIRED_FIELDS
}

/// Tags gathered from a package's items.
#[derive(Debug, Clone, Default)]
pub struct TagCollection {
    pub tags: Vec<ProvenanceTag>,
    /// Items whose provenance was present but failed validation.
    pub invalid: usize,
    /// Valid tags that were already past their TTL.
    pub expired: usize,
}

/// Gather the provenance of every item that carries a valid tag. Items
/// without provenance are skipped; invalid ones are counted and logged.
pub fn collect_tags<'a>(
    items: impl IntoIterator<Item = &'a DataItem>,
    now: DateTime<Utc>,
) -> TagCollection {
    let mut collection = TagCollection::default();
    for item in items {
        let Some(fields) = &item.provenance else {
            continue;
        };
        match ProvenanceTag::try_from(fields.clone()) {
            Ok(tag) => {
                if tag.is_expired_at(now) {
                    collection.expired += 1;
                }
                collection.tags.push(tag);
            }
            Err(err) => {
                warn!(source_id = ?item.source_id(), error = %err, "Dropping invalid provenance tag");
                collection.invalid += 1;
            }
        }
    }
    collection
}
