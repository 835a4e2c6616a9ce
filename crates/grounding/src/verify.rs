//! Five-step claim verification and aggregate grounding score.

use chrono::{DateTime, TimeDelta, Utc};
use ctxengine_config::GroundingConfig;
use ctxengine_core::provenance::{DEFAULT_TTL_SECONDS, parse_timestamp};
use ctxengine_core::{ProvenanceFields, TrustClass};
use serde::Serialize;
use tracing::debug;

use crate::claims::{Claim, identify_claims};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStep {
    HasCitation,
    SourceExists,
    SourceSupports,
    SourceCurrent,
    AuthoritySufficient,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepResult {
    pub step: VerificationStep,
    pub passed: bool,
    pub detail: String,
}

impl StepResult {
    fn new(step: VerificationStep, passed: bool, detail: impl Into<String>) -> Self {
        Self {
            step,
            passed,
            detail: detail.into(),
        }
    }

    fn no_citation(step: VerificationStep) -> Self {
        Self::new(step, false, "No citation to verify")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClaimVerification {
    pub claim: Claim,
    pub grounded: bool,
    /// `source_id` of the tag the claim was matched to, if any.
    pub cited_source: Option<String>,
    pub steps: Vec<StepResult>,
    pub failed_steps: Vec<VerificationStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroundingReport {
    pub score: f64,
    pub claims_checked: usize,
    pub claims_grounded: usize,
    pub claims_ungrounded: Vec<String>,
    pub verifications: Vec<ClaimVerification>,
}

/// Checks claims against provenance using configured tier requirements.
#[derive(Debug, Clone, Default)]
pub struct GroundingVerifier {
    config: GroundingConfig,
}

impl GroundingVerifier {
    pub fn new(config: GroundingConfig) -> Self {
        Self { config }
    }

    /// Run all five steps on one claim. Every step runs even when an
    /// earlier one fails, so the report lists every problem.
    pub fn verify_claim(
        &self,
        claim: &Claim,
        tags: &[ProvenanceFields],
        full_text: &str,
        now: DateTime<Utc>,
    ) -> ClaimVerification {
        let citation = self.find_citation(claim, tags, full_text);

        let steps = vec![
            StepResult::new(
                VerificationStep::HasCitation,
                citation.is_some(),
                if citation.is_some() {
                    "Citation found"
                } else {
                    "No citation found for claim"
                },
            ),
            check_source_exists(citation, tags),
            check_source_supports(claim, citation),
            check_source_current(citation, now),
            self.check_authority(claim, citation),
        ];

        let failed_steps: Vec<VerificationStep> =
            steps.iter().filter(|s| !s.passed).map(|s| s.step).collect();

        ClaimVerification {
            claim: claim.clone(),
            grounded: failed_steps.is_empty(),
            cited_source: citation.and_then(|t| t.source_id.clone()),
            steps,
            failed_steps,
        }
    }

    /// Identify and verify every claim. No claims scores 1.0.
    pub fn score_grounding(
        &self,
        text: &str,
        tags: &[ProvenanceFields],
        now: DateTime<Utc>,
    ) -> GroundingReport {
        let claims = identify_claims(text);
        let verifications: Vec<ClaimVerification> = claims
            .iter()
            .map(|claim| self.verify_claim(claim, tags, text, now))
            .collect();

        let claims_grounded = verifications.iter().filter(|v| v.grounded).count();
        let claims_ungrounded: Vec<String> = verifications
            .iter()
            .filter(|v| !v.grounded)
            .map(|v| v.claim.text.clone())
            .collect();
        let score = if claims.is_empty() {
            1.0
        } else {
            round4(claims_grounded as f64 / claims.len() as f64)
        };

        debug!(
            claims = claims.len(),
            grounded = claims_grounded,
            score,
            "Scored grounding"
        );

        GroundingReport {
            score,
            claims_checked: claims.len(),
            claims_grounded,
            claims_ungrounded,
            verifications,
        }
    }

    /// Look for a tag referenced near the claim: `source_id` first, then
    /// `source_type` or `name`. Matching is case-insensitive.
    fn find_citation<'t>(
        &self,
        claim: &Claim,
        tags: &'t [ProvenanceFields],
        full_text: &str,
    ) -> Option<&'t ProvenanceFields> {
        let window = if full_text.is_empty() {
            claim.text.to_lowercase()
        } else {
            let start = floor_boundary(full_text, claim.start.saturating_sub(self.config.citation_window));
            let end = ceil_boundary(full_text, claim.end.saturating_add(self.config.citation_window));
            full_text[start..end].to_lowercase()
        };
        let mentioned = |value: &Option<String>| {
            value
                .as_deref()
                .is_some_and(|v| !v.is_empty() && window.contains(&v.to_lowercase()))
        };

        tags.iter()
            .find(|tag| mentioned(&tag.source_id))
            .or_else(|| {
                tags.iter()
                    .find(|tag| mentioned(&tag.source_type) || mentioned(&tag.name))
            })
    }

    fn check_authority(&self, claim: &Claim, citation: Option<&ProvenanceFields>) -> StepResult {
        let step = VerificationStep::AuthoritySufficient;
        let Some(citation) = citation else {
            return StepResult::no_citation(step);
        };
        let min_tier = i64::from(self.config.min_tier_for(claim.claim_type.as_str()));
        let source_tier = citation.authority_tier.unwrap_or(5);
        let passed = source_tier <= min_tier;
        StepResult::new(
            step,
            passed,
            format!(
                "Source tier {source_tier} {} required tier {min_tier}",
                if passed { "<=" } else { ">" }
            ),
        )
    }
}

fn check_source_exists(citation: Option<&ProvenanceFields>, tags: &[ProvenanceFields]) -> StepResult {
    let step = VerificationStep::SourceExists;
    let Some(citation) = citation else {
        return StepResult::no_citation(step);
    };
    let source_id = citation.source_id.as_deref().unwrap_or("");
    let exists = !source_id.is_empty()
        && tags
            .iter()
            .any(|t| t.source_id.as_deref() == Some(source_id));
    StepResult::new(
        step,
        exists,
        format!(
            "Source {source_id} {} in provenance",
            if exists { "found" } else { "not found" }
        ),
    )
}

fn check_source_supports(claim: &Claim, citation: Option<&ProvenanceFields>) -> StepResult {
    let step = VerificationStep::SourceSupports;
    let Some(citation) = citation else {
        return StepResult::no_citation(step);
    };
    let trust = citation
        .trust_class
        .as_deref()
        .and_then(|t| t.parse::<TrustClass>().ok())
        .unwrap_or(TrustClass::Untrusted);

    if trust == TrustClass::Untrusted && claim.claim_type.needs_trusted_source() {
        return StepResult::new(
            step,
            false,
            format!("UNTRUSTED source cannot support {} claims", claim.claim_type),
        );
    }
    StepResult::new(
        step,
        true,
        format!(
            "Source type {} accepted for {}",
            citation.source_type.as_deref().unwrap_or("unknown"),
            claim.claim_type
        ),
    )
}

/// Fails when the TTL has lapsed or the timestamp cannot be read. Only a
/// tag with no timestamp at all gets the benefit of the doubt.
fn check_source_current(citation: Option<&ProvenanceFields>, now: DateTime<Utc>) -> StepResult {
    let step = VerificationStep::SourceCurrent;
    let Some(citation) = citation else {
        return StepResult::no_citation(step);
    };
    let Some(raw) = citation.fetched_at.as_deref() else {
        return StepResult::new(step, true, "No fetched_at timestamp; assumed current");
    };
    let Some(fetched_at) = parse_timestamp(raw) else {
        return StepResult::new(step, false, format!("Unreadable fetched_at: {raw}"));
    };

    let ttl = citation.ttl_seconds.unwrap_or(DEFAULT_TTL_SECONDS as i64);
    let age = now.signed_duration_since(fetched_at);
    let expired = TimeDelta::try_seconds(ttl).is_none_or(|limit| age > limit);
    StepResult::new(
        step,
        !expired,
        format!("Source age: {}s, TTL: {ttl}s", age.num_seconds()),
    )
}

fn floor_boundary(text: &str, mut idx: usize) -> usize {
    idx = idx.min(text.len());
    while !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_boundary(text: &str, mut idx: usize) -> usize {
    idx = idx.min(text.len());
    while !text.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::ClaimType;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn tag(source_id: &str, tier: i64, trust: &str) -> ProvenanceFields {
        ProvenanceFields {
            source_id: Some(source_id.into()),
            source_type: Some("bank_sop".into()),
            authority_tier: Some(tier),
            fetched_at: Some((now() - TimeDelta::seconds(60)).to_rfc3339()),
            ttl_seconds: Some(3600),
            trust_class: Some(trust.into()),
            data_classification: Some("INTERNAL".into()),
            ..Default::default()
        }
    }

    fn verifier() -> GroundingVerifier {
        GroundingVerifier::default()
    }

    #[test]
    fn text_without_claims_scores_one() {
        let report = verifier().score_grounding("Happy to help with that.", &[], now());
        assert_eq!(report.score, 1.0);
        assert_eq!(report.claims_checked, 0);
    }

    #[test]
    fn cited_trusted_claim_is_grounded() {
        let text = "Per npa_project_db, the product is classified as Tier-2.";
        let report = verifier().score_grounding(text, &[tag("npa_project_db", 1, "TRUSTED")], now());
        assert_eq!(report.claims_checked, 1);
        assert_eq!(report.claims_grounded, 1);
        assert_eq!(report.score, 1.0);
        let v = &report.verifications[0];
        assert_eq!(v.cited_source.as_deref(), Some("npa_project_db"));
        assert!(v.failed_steps.is_empty());
    }

    #[test]
    fn claim_with_no_tags_is_never_grounded() {
        let claim = &identify_claims("The product is classified as Tier-2.")[0];
        let v = verifier().verify_claim(claim, &[], "", now());
        assert!(!v.grounded);
        assert_eq!(v.failed_steps.len(), 5);
    }

    #[test]
    fn untrusted_source_never_supports_regulatory_claims() {
        let text = "MAS requires quarterly reporting (see sop-reg-7).";
        for tier in 1..=5 {
            let report = verifier().score_grounding(text, &[tag("sop-reg-7", tier, "UNTRUSTED")], now());
            let v = &report.verifications[0];
            assert_eq!(v.claim.claim_type, ClaimType::RegulatoryObligation);
            assert!(v.failed_steps.contains(&VerificationStep::SourceSupports));
            assert!(!v.grounded);
        }
    }

    #[test]
    fn weak_authority_fails_strict_claim_types() {
        let text = "The notional exceeds USD 5m according to desk-feed.";
        let report = verifier().score_grounding(text, &[tag("desk-feed", 2, "TRUSTED")], now());
        let v = &report.verifications[0];
        assert_eq!(v.claim.claim_type, ClaimType::FinancialThreshold);
        assert_eq!(v.failed_steps, vec![VerificationStep::AuthoritySufficient]);
    }

    #[test]
    fn stale_and_unreadable_timestamps_fail_currency() {
        let text = "The SLA is 3 business days per sla-book.";
        let mut stale = tag("sla-book", 1, "TRUSTED");
        stale.fetched_at = Some((now() - TimeDelta::hours(3)).to_rfc3339());
        let v = &verifier().score_grounding(text, &[stale], now()).verifications[0];
        assert_eq!(v.failed_steps, vec![VerificationStep::SourceCurrent]);

        let mut garbled = tag("sla-book", 1, "TRUSTED");
        garbled.fetched_at = Some("last tuesday".into());
        let v = &verifier().score_grounding(text, &[garbled], now()).verifications[0];
        assert_eq!(v.failed_steps, vec![VerificationStep::SourceCurrent]);

        let mut undated = tag("sla-book", 1, "TRUSTED");
        undated.fetched_at = None;
        let v = &verifier().score_grounding(text, &[undated], now()).verifications[0];
        assert!(v.grounded);
    }

    #[test]
    fn citation_falls_back_to_name_and_type() {
        let text = "According to the Product Manual, approval required for launch.";
        let mut named = tag("pm-001", 1, "TRUSTED");
        named.name = Some("Product Manual".into());
        named.source_type = Some("system_of_record".into());
        let report = verifier().score_grounding(text, &[named], now());
        assert_eq!(report.verifications[0].cited_source.as_deref(), Some("pm-001"));
        assert!(report.verifications[0].grounded);
    }

    #[test]
    fn score_is_fraction_of_grounded_claims() {
        let text = "Per npa_project_db, the product is classified as Tier-2. \
                    Separately, and with no source given anywhere nearby at all, for the record we note \
                    that the filler text must be long enough to push the window away from the citation, \
                    the risk rating of the desk is elevated.";
        let report = verifier().score_grounding(text, &[tag("npa_project_db", 1, "TRUSTED")], now());
        assert_eq!(report.claims_checked, 2);
        assert_eq!(report.claims_grounded, 1);
        assert_eq!(report.score, 0.5);
        assert_eq!(report.claims_ungrounded.len(), 1);
    }
}
