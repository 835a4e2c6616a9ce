//! Source trust classification and authority ordering.

use ctxengine_config::{SourceTier, TrustConfig};
use ctxengine_core::provenance::parse_timestamp;
use ctxengine_core::{AuthorityTier, DataItem, Error, PolicyViolation, ProvenanceTag, Result, TrustClass};
use regex_lite::Regex;
use serde::Serialize;
use tracing::{debug, warn};

/// Source types that must never reach a context package. Hitting one is a
/// policy violation, not a quiet downgrade to UNTRUSTED.
pub const NEVER_ALLOWED: [&str; 4] = [
    "unverified_web_scrapes",
    "social_media",
    "competitor_intelligence",
    "user_pasted_claiming_policy",
];

pub fn is_never_allowed(source_type: &str) -> bool {
    NEVER_ALLOWED.contains(&source_type)
}

/// Compiled trust rules plus the source hierarchy they were loaded with.
#[derive(Debug, Clone)]
pub struct TrustResolver {
    rules: Vec<(Regex, TrustClass)>,
    hierarchy: Vec<SourceTier>,
}

impl TrustResolver {
    /// Compile the configured rules. A pattern that does not compile is a
    /// configuration error.
    pub fn new(config: &TrustConfig) -> Result<Self> {
        let rules = config
            .rules
            .iter()
            .map(|rule| {
                Regex::new(&rule.pattern)
                    .map(|re| (re, rule.trust_class))
                    .map_err(|e| Error::Config {
                        message: format!("invalid trust rule pattern '{}': {e}", rule.pattern),
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut hierarchy = config.source_hierarchy.clone();
        hierarchy.sort_by_key(|entry| entry.tier);

        Ok(Self { rules, hierarchy })
    }

    /// Classify a source type. Deny-listed types fail; anything no rule
    /// matches (including a missing type) is UNTRUSTED.
    ///
    /// Rules match at the start of the source type; the first hit wins.
    pub fn classify_trust(
        &self,
        source_type: Option<&str>,
    ) -> std::result::Result<TrustClass, PolicyViolation> {
        let Some(source_type) = source_type.filter(|s| !s.is_empty()) else {
            return Ok(TrustClass::Untrusted);
        };

        if is_never_allowed(source_type) {
            warn!(source_type, "Blocked deny-listed source");
            return Err(PolicyViolation::NeverAllowedSource {
                source_type: source_type.to_string(),
            });
        }

        let class = self
            .rules
            .iter()
            .find(|(re, _)| re.find(source_type).is_some_and(|m| m.start() == 0))
            .map(|(_, class)| *class)
            .unwrap_or(TrustClass::Untrusted);
        debug!(source_type, trust_class = %class, "Classified source");
        Ok(class)
    }

    /// The configured hierarchy, most authoritative first.
    pub fn source_hierarchy(&self) -> &[SourceTier] {
        &self.hierarchy
    }

    pub fn source_tier(&self, source_type: &str) -> Option<&SourceTier> {
        self.hierarchy
            .iter()
            .find(|entry| entry.source_type.as_str() == source_type)
    }
}

// ── Ranking & conflicts ─────────────────────────────────────────────────────

/// Anything that can be ordered by source authority.
pub trait AuthoritySource {
    fn authority(&self) -> Option<AuthorityTier>;
    fn kind(&self) -> Option<&str>;
    fn effective_on(&self) -> Option<&str>;
    /// Policy scope: `group` or `local`.
    fn policy_scope(&self) -> Option<&str>;
}

impl AuthoritySource for DataItem {
    fn authority(&self) -> Option<AuthorityTier> {
        self.authority_tier()
    }
    fn kind(&self) -> Option<&str> {
        self.source_type()
    }
    fn effective_on(&self) -> Option<&str> {
        self.effective_date()
    }
    fn policy_scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }
}

impl AuthoritySource for ProvenanceTag {
    fn authority(&self) -> Option<AuthorityTier> {
        Some(self.authority_tier())
    }
    fn kind(&self) -> Option<&str> {
        Some(self.source_type().as_str())
    }
    fn effective_on(&self) -> Option<&str> {
        self.effective_date()
    }
    fn policy_scope(&self) -> Option<&str> {
        None
    }
}

impl<T: AuthoritySource> AuthoritySource for &T {
    fn authority(&self) -> Option<AuthorityTier> {
        T::authority(self)
    }
    fn kind(&self) -> Option<&str> {
        T::kind(self)
    }
    fn effective_on(&self) -> Option<&str> {
        T::effective_on(self)
    }
    fn policy_scope(&self) -> Option<&str> {
        T::policy_scope(self)
    }
}

/// Sort key: tier number, with unknown tiers after every known one.
fn rank_key<T: AuthoritySource>(source: &T) -> u8 {
    source.authority().map_or(u8::MAX, AuthorityTier::get)
}

/// Stable ascending sort by authority tier (tier 1 first). Ties keep their
/// input order.
pub fn rank_sources<T: AuthoritySource>(mut sources: Vec<T>) -> Vec<T> {
    sources.sort_by_key(|source| rank_key(source));
    sources
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionKind {
    AuthorityTier,
    SorPriority,
    EffectiveDate,
    PolicyScope,
    #[serde(rename = "NEEDS_HUMAN_REVIEW")]
    NeedsHumanReview,
}

/// Outcome of a conflict between two sources. `winner` is `None` only for
/// [`ResolutionKind::NeedsHumanReview`].
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution<'a, T> {
    pub winner: Option<&'a T>,
    pub kind: ResolutionKind,
    pub reason: String,
}

impl<'a, T> Resolution<'a, T> {
    fn decided(winner: &'a T, kind: ResolutionKind, reason: impl Into<String>) -> Self {
        Self {
            winner: Some(winner),
            kind,
            reason: reason.into(),
        }
    }
}

/// Decide which of two conflicting sources prevails.
///
/// 1. lower tier wins
/// 2. same tier: system of record beats anything else
/// 3. same tier and type class: newer effective date wins
/// 4. same tier: group policy beats local policy
/// 5. otherwise a human has to look at it
pub fn resolve_conflict<'a, T: AuthoritySource>(a: &'a T, b: &'a T) -> Resolution<'a, T> {
    let (tier_a, tier_b) = (rank_key(a), rank_key(b));
    if tier_a != tier_b {
        let winner = if tier_a < tier_b { a } else { b };
        return Resolution::decided(
            winner,
            ResolutionKind::AuthorityTier,
            format!(
                "Higher authority tier: {} vs {}",
                tier_a.min(tier_b),
                tier_a.max(tier_b)
            ),
        );
    }

    let sor_a = a.kind() == Some("system_of_record");
    let sor_b = b.kind() == Some("system_of_record");
    if sor_a != sor_b {
        let winner = if sor_a { a } else { b };
        return Resolution::decided(winner, ResolutionKind::SorPriority, "System of record wins");
    }

    let date_a = a.effective_on().and_then(parse_timestamp);
    let date_b = b.effective_on().and_then(parse_timestamp);
    if let (Some(date_a), Some(date_b)) = (date_a, date_b)
        && date_a != date_b
    {
        let winner = if date_a > date_b { a } else { b };
        return Resolution::decided(winner, ResolutionKind::EffectiveDate, "Newer effective_date wins");
    }

    match (a.policy_scope(), b.policy_scope()) {
        (Some("group"), Some("local")) => {
            return Resolution::decided(a, ResolutionKind::PolicyScope, "Group policy wins over local");
        }
        (Some("local"), Some("group")) => {
            return Resolution::decided(b, ResolutionKind::PolicyScope, "Group policy wins over local");
        }
        _ => {}
    }

    Resolution {
        winner: None,
        kind: ResolutionKind::NeedsHumanReview,
        reason: "Cannot resolve: same tier, type, and date. Requires human review.".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctxengine_config::TrustRule;

    fn resolver() -> TrustResolver {
        TrustResolver::new(&TrustConfig::default()).unwrap()
    }

    fn source(id: &str, tier: i64, source_type: &str) -> DataItem {
        DataItem {
            id: Some(id.into()),
            authority_tier: Some(tier),
            source_type: Some(source_type.into()),
            ..Default::default()
        }
    }

    #[test]
    fn known_sources_are_trusted() {
        let r = resolver();
        for source_type in [
            "mcp_tool_results",
            "bank_sops_from_kb",
            "regulatory_docs_from_kb",
            "agent_outputs_with_provenance",
            "reference_data_tables",
            "system_of_record",
        ] {
            assert_eq!(
                r.classify_trust(Some(source_type)).unwrap(),
                TrustClass::Trusted,
                "{source_type}"
            );
        }
    }

    #[test]
    fn unknown_and_user_sources_are_untrusted() {
        let r = resolver();
        for source_type in ["user_free_text", "uploaded_documents", "external_api_responses", "mystery_feed"] {
            assert_eq!(r.classify_trust(Some(source_type)).unwrap(), TrustClass::Untrusted);
        }
        assert_eq!(r.classify_trust(None).unwrap(), TrustClass::Untrusted);
        assert_eq!(r.classify_trust(Some("")).unwrap(), TrustClass::Untrusted);
    }

    #[test]
    fn deny_listed_sources_fail_loudly() {
        let r = resolver();
        for source_type in NEVER_ALLOWED {
            let err = r.classify_trust(Some(source_type)).unwrap_err();
            assert_eq!(
                err,
                PolicyViolation::NeverAllowedSource {
                    source_type: source_type.to_string()
                }
            );
        }
        assert!(is_never_allowed("social_media"));
        assert!(!is_never_allowed("bank_sop"));
    }

    #[test]
    fn rules_match_from_the_start_only() {
        let config = TrustConfig {
            rules: vec![TrustRule {
                pattern: "sop".into(),
                trust_class: TrustClass::Trusted,
            }],
            ..TrustConfig::default()
        };
        let r = TrustResolver::new(&config).unwrap();
        assert_eq!(r.classify_trust(Some("sop_v2")).unwrap(), TrustClass::Trusted);
        assert_eq!(r.classify_trust(Some("bank_sop")).unwrap(), TrustClass::Untrusted);
    }

    #[test]
    fn bad_pattern_is_a_config_error() {
        let config = TrustConfig {
            rules: vec![TrustRule {
                pattern: "(unclosed".into(),
                trust_class: TrustClass::Trusted,
            }],
            ..TrustConfig::default()
        };
        assert!(matches!(TrustResolver::new(&config), Err(Error::Config { .. })));
    }

    #[test]
    fn hierarchy_lookup() {
        let r = resolver();
        assert_eq!(r.source_hierarchy().len(), 5);
        assert_eq!(r.source_hierarchy()[0].tier, 1);
        assert_eq!(r.source_tier("bank_sop").unwrap().tier, 2);
        assert!(r.source_tier("rumours").is_none());
    }

    #[test]
    fn ranking_is_stable_on_ties() {
        let ranked = rank_sources(vec![
            source("c", 3, "industry_standard"),
            source("a1", 1, "system_of_record"),
            source("b1", 2, "bank_sop"),
            source("a2", 1, "system_of_record"),
            source("b2", 2, "bank_sop"),
            DataItem::new("no tier"),
        ]);
        let ids: Vec<_> = ranked.iter().map(|s| s.id.as_deref().unwrap_or("-")).collect();
        assert_eq!(ids, vec!["a1", "a2", "b1", "b2", "c", "-"]);
    }

    #[test]
    fn lower_tier_wins_conflict() {
        let a = source("a", 3, "industry_standard");
        let b = source("b", 1, "system_of_record");
        let res = resolve_conflict(&a, &b);
        assert_eq!(res.kind, ResolutionKind::AuthorityTier);
        assert_eq!(res.winner.unwrap().id.as_deref(), Some("b"));
    }

    #[test]
    fn system_of_record_wins_on_equal_tier() {
        let sor = source("sor", 2, "system_of_record");
        let sop = source("sop", 2, "bank_sop");
        let res = resolve_conflict(&sop, &sor);
        assert_eq!(res.kind, ResolutionKind::SorPriority);
        assert_eq!(res.winner.unwrap().id.as_deref(), Some("sor"));
    }

    #[test]
    fn newer_effective_date_wins() {
        let mut old = source("old", 2, "bank_sop");
        old.effective_date = Some("2024-01-01".into());
        let mut new = source("new", 2, "bank_sop");
        new.effective_date = Some("2025-06-01".into());
        let res = resolve_conflict(&old, &new);
        assert_eq!(res.kind, ResolutionKind::EffectiveDate);
        assert_eq!(res.winner.unwrap().id.as_deref(), Some("new"));
    }

    #[test]
    fn group_policy_beats_local() {
        let mut group = source("group", 2, "bank_sop");
        group.scope = Some("group".into());
        let mut local = source("local", 2, "bank_sop");
        local.scope = Some("local".into());
        let res = resolve_conflict(&local, &group);
        assert_eq!(res.kind, ResolutionKind::PolicyScope);
        assert_eq!(res.winner.unwrap().id.as_deref(), Some("group"));
    }

    #[test]
    fn indistinguishable_sources_need_a_human() {
        let a = source("a", 2, "bank_sop");
        let b = source("b", 2, "bank_sop");
        let res = resolve_conflict(&a, &b);
        assert_eq!(res.kind, ResolutionKind::NeedsHumanReview);
        assert!(res.winner.is_none());
        assert_eq!(
            serde_json::to_value(res.kind).unwrap(),
            serde_json::json!("NEEDS_HUMAN_REVIEW")
        );
    }
}
