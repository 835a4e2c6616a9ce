//! Claim identification.

use std::fmt;
use std::sync::LazyLock;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimType {
    ClassificationDecision,
    RiskAssessment,
    GovernanceRule,
    RegulatoryObligation,
    SignoffRequirement,
    FinancialThreshold,
    ProhibitedItem,
    SlaDeadline,
}

impl ClaimType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClassificationDecision => "classification_decision",
            Self::RiskAssessment => "risk_assessment",
            Self::GovernanceRule => "governance_rule",
            Self::RegulatoryObligation => "regulatory_obligation",
            Self::SignoffRequirement => "signoff_requirement",
            Self::FinancialThreshold => "financial_threshold",
            Self::ProhibitedItem => "prohibited_item",
            Self::SlaDeadline => "sla_deadline",
        }
    }

    /// Claim types an UNTRUSTED source may never back.
    pub fn needs_trusted_source(&self) -> bool {
        matches!(
            self,
            Self::RegulatoryObligation | Self::GovernanceRule | Self::SignoffRequirement
        )
    }
}

impl fmt::Display for ClaimType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Matchers in priority order; an earlier type claims a span first.
const CLAIM_PATTERNS: [(&str, ClaimType); 8] = [
    (
        r"(?i)\bclassifi(?:ed|cation)\b.*?\b(?:as|is|to)\b\s+\S+",
        ClaimType::ClassificationDecision,
    ),
    (
        r"(?i)\brisk\s+(?:level|rating|score|assessment)\b.*?\b(?:is|rated|assessed)\b",
        ClaimType::RiskAssessment,
    ),
    (
        r"(?i)\b(?:governance|policy)\s+(?:requires?|mandates?|stipulates?)\b",
        ClaimType::GovernanceRule,
    ),
    (
        r"(?i)\b(?:MAS|HKMA|SEBI|RBI|regulatory|regulator)\b.*?\b(?:requires?|mandates?|prohibits?)\b",
        ClaimType::RegulatoryObligation,
    ),
    (
        r"(?i)\b(?:sign-?off|approval)\s+(?:required|needed|mandatory)\b",
        ClaimType::SignoffRequirement,
    ),
    (
        r"(?i)\b(?:threshold|notional|amount)\b.*?\b(?:exceeds?|below|above|SGD|USD|HKD)\b",
        ClaimType::FinancialThreshold,
    ),
    (
        r"(?i)\bprohibited\b.*?\b(?:item|product|instrument|activity)\b",
        ClaimType::ProhibitedItem,
    ),
    (
        r"(?i)\b(?:SLA|deadline|turnaround)\b.*?\b(?:hours?|days?|business\s+days?)\b",
        ClaimType::SlaDeadline,
    ),
];

static MATCHERS: LazyLock<Vec<(Regex, ClaimType)>> = LazyLock::new(|| {
    CLAIM_PATTERNS
        .iter()
        .filter_map(|(pattern, claim_type)| match Regex::new(pattern) {
            Ok(re) => Some((re, *claim_type)),
            Err(err) => {
                warn!(pattern, error = %err, "Skipping claim pattern that does not compile");
                None
            }
        })
        .collect()
});

/// A claim found in generated text. `start`/`end` are byte offsets of the
/// match in the original text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub claim_type: ClaimType,
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// Scan text for claims. Each span is claimed at most once: a match that
/// overlaps an earlier claim is skipped.
pub fn identify_claims(text: &str) -> Vec<Claim> {
    let mut claims: Vec<Claim> = Vec::new();
    for (re, claim_type) in MATCHERS.iter() {
        for m in re.find_iter(text) {
            let overlaps = claims
                .iter()
                .any(|c| m.start() < c.end && c.start < m.end());
            if overlaps {
                continue;
            }
            claims.push(Claim {
                claim_type: *claim_type,
                text: m.as_str().trim().to_string(),
                start: m.start(),
                end: m.end(),
            });
        }
    }
    claims
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_pattern_compiles() {
        assert_eq!(MATCHERS.len(), CLAIM_PATTERNS.len());
    }

    #[test]
    fn finds_each_claim_type() {
        let cases = [
            ("The product is classified as Tier-2.", ClaimType::ClassificationDecision),
            ("The risk rating for this deal is high.", ClaimType::RiskAssessment),
            ("Group policy requires dual control.", ClaimType::GovernanceRule),
            ("HKMA requires a cooling-off period.", ClaimType::RegulatoryObligation),
            ("Legal sign-off required before launch.", ClaimType::SignoffRequirement),
            ("The notional exceeds the desk limit.", ClaimType::FinancialThreshold),
            ("Crypto is a prohibited product here.", ClaimType::ProhibitedItem),
            ("The SLA is 5 business days.", ClaimType::SlaDeadline),
        ];
        for (text, expected) in cases {
            let claims = identify_claims(text);
            assert_eq!(claims.len(), 1, "{text}");
            assert_eq!(claims[0].claim_type, expected, "{text}");
        }
    }

    #[test]
    fn plain_text_has_no_claims() {
        assert!(identify_claims("Thanks, I will look into it tomorrow.").is_empty());
        assert!(identify_claims("").is_empty());
    }

    #[test]
    fn overlapping_matches_yield_one_claim() {
        // The regulatory matcher also covers this span, but governance
        // comes first.
        let claims = identify_claims("Regulatory policy requires approval.");
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].claim_type, ClaimType::GovernanceRule);
        assert_eq!(claims[0].text, "policy requires");
    }

    #[test]
    fn offsets_point_into_the_text() {
        let text = "Note: classified as restricted.";
        let claim = &identify_claims(text)[0];
        assert_eq!(&text[claim.start..claim.end], claim.text);
    }
}
