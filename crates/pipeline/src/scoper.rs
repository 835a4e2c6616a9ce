//! Scoping: the fixed-order filter chain that decides which candidate
//! items a caller may see.
//!
//! Order: domain → entity → jurisdiction → classification ceiling → role
//! entitlement → temporal validity. Every filter is pure; the clock is
//! passed in.

use chrono::{DateTime, Utc};
use ctxengine_core::provenance::parse_timestamp;
use ctxengine_core::{DataClassification, DataItem};
use ctxengine_trust::AccessPolicy;
use serde::Serialize;
use tracing::debug;

/// Domain shared by every product line.
pub const PLATFORM_DOMAIN: &str = "platform";
/// Jurisdiction that applies everywhere.
pub const GLOBAL_JURISDICTION: &str = "GLOBAL";
/// Entity type assumed when an item or request does not name one.
pub const DEFAULT_ENTITY_TYPE: &str = "project";

/// Which filters to apply. `None` switches a filter off; the temporal
/// filter always runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScopingConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Entities the request is about. Empty switches the filter off.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub entity_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jurisdiction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_classification: Option<DataClassification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_role: Option<String>,
}

/// Keep items for `domain`, for the platform, or with no domain at all.
pub fn scope_by_domain(items: Vec<DataItem>, domain: &str) -> Vec<DataItem> {
    items
        .into_iter()
        .filter(|item| match item.domain.as_deref() {
            None => true,
            Some(d) => d == domain || d == PLATFORM_DOMAIN,
        })
        .collect()
}

/// Keep items bound to no entity, or to one of `entity_ids` with the
/// matching type.
pub fn scope_by_entity(items: Vec<DataItem>, entity_ids: &[String], entity_type: &str) -> Vec<DataItem> {
    items
        .into_iter()
        .filter(|item| match item.entity_id.as_deref().filter(|id| !id.is_empty()) {
            None => true,
            Some(id) => {
                entity_ids.iter().any(|wanted| wanted == id)
                    && item.entity_type.as_deref().unwrap_or(DEFAULT_ENTITY_TYPE) == entity_type
            }
        })
        .collect()
}

/// Keep GLOBAL, matching, or untagged items.
pub fn scope_by_jurisdiction(items: Vec<DataItem>, jurisdiction: &str) -> Vec<DataItem> {
    items
        .into_iter()
        .filter(|item| match item.jurisdiction() {
            None => true,
            Some(j) => j == jurisdiction || j == GLOBAL_JURISDICTION,
        })
        .collect()
}

/// The classification an item is held to for entitlement checks. Missing
/// or unrecognised labels are RESTRICTED.
pub fn effective_classification(item: &DataItem) -> DataClassification {
    item.classification()
        .map_or(DataClassification::Restricted, DataClassification::or_restricted)
}

/// Drop items labelled above `max`. Unlabelled items pass; the role
/// filter is what holds them to RESTRICTED.
pub fn scope_by_classification(items: Vec<DataItem>, max: DataClassification) -> Vec<DataItem> {
    items
        .into_iter()
        .filter(|item| {
            item.classification()
                .filter(|label| !label.is_empty())
                .is_none_or(|label| DataClassification::or_restricted(label) <= max)
        })
        .collect()
}

/// Keep what `role` is entitled to see. Deny by default.
pub fn scope_by_role(items: Vec<DataItem>, role: &str, policy: &AccessPolicy) -> Vec<DataItem> {
    items
        .into_iter()
        .filter(|item| policy.can_user_access(role, effective_classification(item)))
        .collect()
}

/// Drop items not yet effective or already expired. Absent dates pass;
/// dates that cannot be read do not.
pub fn scope_by_temporal(items: Vec<DataItem>, now: DateTime<Utc>) -> Vec<DataItem> {
    items
        .into_iter()
        .filter(|item| {
            let effective_ok = item
                .effective_date()
                .is_none_or(|raw| parse_timestamp(raw).is_some_and(|d| d <= now));
            let expiry_ok = item
                .expiry_date()
                .is_none_or(|raw| parse_timestamp(raw).is_some_and(|d| d >= now));
            effective_ok && expiry_ok
        })
        .collect()
}

/// Run the whole chain.
pub fn apply_all_scopes(
    items: Vec<DataItem>,
    config: &ScopingConfig,
    policy: &AccessPolicy,
    now: DateTime<Utc>,
) -> Vec<DataItem> {
    let before = items.len();
    let mut scoped = items;

    if let Some(domain) = &config.domain {
        scoped = scope_by_domain(scoped, domain);
    }
    if config.entity_ids.iter().any(|id| !id.is_empty()) {
        let entity_type = config.entity_type.as_deref().unwrap_or(DEFAULT_ENTITY_TYPE);
        scoped = scope_by_entity(scoped, &config.entity_ids, entity_type);
    }
    if let Some(jurisdiction) = config.jurisdiction.as_deref().filter(|j| !j.is_empty()) {
        scoped = scope_by_jurisdiction(scoped, jurisdiction);
    }
    if let Some(max) = config.max_classification {
        scoped = scope_by_classification(scoped, max);
    }
    if let Some(role) = config.user_role.as_deref().filter(|r| !r.is_empty()) {
        scoped = scope_by_role(scoped, role, policy);
    }
    scoped = scope_by_temporal(scoped, now);

    debug!(before, after = scoped.len(), "Applied scopes");
    scoped
}
