//! Data items: the loosely-typed records adapters return and the pipeline
//! scopes, ranks, and places into slots.
//!
//! Scoping and ranking attributes may live on the item itself or on its
//! nested `provenance` object. The accessors here read the item first and
//! fall back to provenance, field by field.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::provenance::{AuthorityTier, ProvenanceFields, ProvenanceTag};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jurisdiction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_classification: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority_tier: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f64>,
    /// Policy scope (`group` or `local`), used when resolving conflicts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<ProvenanceFields>,

    /// Anything else the adapter sent; carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DataItem {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn with_provenance(mut self, provenance: impl Into<ProvenanceFields>) -> Self {
        self.provenance = Some(provenance.into());
        self
    }

    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }

    pub fn jurisdiction(&self) -> Option<&str> {
        self.jurisdiction
            .as_deref()
            .or_else(|| self.prov().and_then(|p| p.jurisdiction.as_deref()))
    }

    pub fn classification(&self) -> Option<&str> {
        self.data_classification
            .as_deref()
            .or_else(|| self.prov().and_then(|p| p.data_classification.as_deref()))
    }

    pub fn effective_date(&self) -> Option<&str> {
        self.effective_date
            .as_deref()
            .or_else(|| self.prov().and_then(|p| p.effective_date.as_deref()))
    }

    pub fn expiry_date(&self) -> Option<&str> {
        self.expiry_date
            .as_deref()
            .or_else(|| self.prov().and_then(|p| p.expiry_date.as_deref()))
    }

    pub fn source_id(&self) -> Option<&str> {
        self.source_id
            .as_deref()
            .or_else(|| self.prov().and_then(|p| p.source_id.as_deref()))
    }

    pub fn source_type(&self) -> Option<&str> {
        self.source_type
            .as_deref()
            .or_else(|| self.prov().and_then(|p| p.source_type.as_deref()))
    }

    pub fn trust_class(&self) -> Option<&str> {
        self.trust_class
            .as_deref()
            .or_else(|| self.prov().and_then(|p| p.trust_class.as_deref()))
    }

    /// Authority tier when it is present and in range.
    pub fn authority_tier(&self) -> Option<AuthorityTier> {
        self.authority_tier
            .or_else(|| self.prov().and_then(|p| p.authority_tier))
            .and_then(|raw| AuthorityTier::try_from(raw).ok())
    }

    fn prov(&self) -> Option<&ProvenanceFields> {
        self.provenance.as_ref()
    }
}

impl From<&ProvenanceTag> for DataItem {
    fn from(tag: &ProvenanceTag) -> Self {
        DataItem {
            source_id: Some(tag.source_id().to_string()),
            source_type: Some(tag.source_type().as_str().to_string()),
            authority_tier: Some(i64::from(tag.authority_tier().get())),
            provenance: Some(ProvenanceFields::from(tag)),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn item_fields_win_over_provenance() {
        let item: DataItem = serde_json::from_value(json!({
            "content": "x",
            "jurisdiction": "SG",
            "provenance": {"jurisdiction": "HK", "data_classification": "CONFIDENTIAL"}
        }))
        .unwrap();
        assert_eq!(item.jurisdiction(), Some("SG"));
        assert_eq!(item.classification(), Some("CONFIDENTIAL"));
    }

    #[test]
    fn unknown_keys_survive_round_trip() {
        let raw = json!({"content": "x", "snippet": "short", "score_hint": 3});
        let item: DataItem = serde_json::from_value(raw).unwrap();
        assert_eq!(item.extra["snippet"], "short");
        let back = serde_json::to_value(&item).unwrap();
        assert_eq!(back["score_hint"], 3);
    }

    #[test]
    fn out_of_range_tier_reads_as_absent() {
        let item = DataItem {
            authority_tier: Some(9),
            ..Default::default()
        };
        assert_eq!(item.authority_tier(), None);

        let nested = DataItem::new("x").with_provenance(ProvenanceFields {
            authority_tier: Some(3),
            ..Default::default()
        });
        assert_eq!(nested.authority_tier().map(AuthorityTier::get), Some(3));
    }
}
