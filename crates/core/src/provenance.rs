//! Provenance tags: where a piece of context came from, how far it can be
//! trusted, and how long it stays fresh.
//!
//! Raw tag data arrives as [`ProvenanceFields`] (every field optional, as
//! adapters deliver it). Validation turns it into an immutable
//! [`ProvenanceTag`]; nothing downstream can construct or mutate a tag
//! without passing through [`ProvenanceTag::try_from`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::ProvenanceError;

/// Default freshness window applied when a caller omits `ttl_seconds`.
pub const DEFAULT_TTL_SECONDS: u64 = 3600;

/// The fields every valid tag must carry.
pub const REQUIRED_FIELDS: [&str; 7] = [
    "source_id",
    "source_type",
    "authority_tier",
    "fetched_at",
    "ttl_seconds",
    "trust_class",
    "data_classification",
];

// ── Enumerations ────────────────────────────────────────────────────────────

/// Kind of origin a piece of context came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    SystemOfRecord,
    BankSop,
    IndustryStandard,
    ExternalOfficial,
    GeneralWeb,
    AgentOutput,
    UserInput,
}

impl SourceType {
    pub const ALL: [SourceType; 7] = [
        SourceType::SystemOfRecord,
        SourceType::BankSop,
        SourceType::IndustryStandard,
        SourceType::ExternalOfficial,
        SourceType::GeneralWeb,
        SourceType::AgentOutput,
        SourceType::UserInput,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SystemOfRecord => "system_of_record",
            Self::BankSop => "bank_sop",
            Self::IndustryStandard => "industry_standard",
            Self::ExternalOfficial => "external_official",
            Self::GeneralWeb => "general_web",
            Self::AgentOutput => "agent_output",
            Self::UserInput => "user_input",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown source_type: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrustClass {
    Trusted,
    Untrusted,
}

impl TrustClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trusted => "TRUSTED",
            Self::Untrusted => "UNTRUSTED",
        }
    }

    /// Untrusted wins: combining anything with untrusted data is untrusted.
    pub fn combine(self, other: TrustClass) -> TrustClass {
        if self == Self::Untrusted || other == Self::Untrusted {
            Self::Untrusted
        } else {
            Self::Trusted
        }
    }
}

impl fmt::Display for TrustClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrustClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "TRUSTED" => Ok(Self::Trusted),
            "UNTRUSTED" => Ok(Self::Untrusted),
            _ => Err(format!("unknown trust_class: {s}")),
        }
    }
}

/// Sensitivity level, ordered from least to most sensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataClassification {
    Public,
    Internal,
    Confidential,
    Restricted,
}

impl DataClassification {
    pub const ALL: [DataClassification; 4] = [
        DataClassification::Public,
        DataClassification::Internal,
        DataClassification::Confidential,
        DataClassification::Restricted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "PUBLIC",
            Self::Internal => "INTERNAL",
            Self::Confidential => "CONFIDENTIAL",
            Self::Restricted => "RESTRICTED",
        }
    }

    /// Parse a label, treating anything unrecognised as the strictest level.
    pub fn or_restricted(raw: &str) -> Self {
        raw.parse().unwrap_or(Self::Restricted)
    }
}

impl fmt::Display for DataClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataClassification {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == upper)
            .ok_or_else(|| format!("unknown data_classification: {s}"))
    }
}

/// Authority ranking from 1 (most authoritative) to 5 (least).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct AuthorityTier(u8);

impl AuthorityTier {
    pub const HIGHEST: AuthorityTier = AuthorityTier(1);
    pub const LOWEST: AuthorityTier = AuthorityTier(5);

    pub fn new(tier: u8) -> Option<Self> {
        (1..=5).contains(&tier).then_some(Self(tier))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for AuthorityTier {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .ok()
            .and_then(Self::new)
            .ok_or_else(|| format!("authority_tier must be an integer from 1 to 5, got {value}"))
    }
}

impl From<AuthorityTier> for u8 {
    fn from(tier: AuthorityTier) -> u8 {
        tier.0
    }
}

impl fmt::Display for AuthorityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Raw fields ──────────────────────────────────────────────────────────────

/// Unvalidated provenance data, exactly as adapters and callers supply it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority_tier: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetched_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_classification: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jurisdiction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_hash: Option<String>,

    /// Human-readable name, used as a citation alias during grounding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ProvenanceFields {
    /// Freshness check on raw fields. Missing or unparsable timing data
    /// counts as expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        let fetched = self.fetched_at.as_deref().and_then(parse_timestamp);
        let ttl = self.ttl_seconds.and_then(|t| u64::try_from(t).ok());
        match (fetched, ttl) {
            (Some(fetched), Some(ttl)) => elapsed_beyond(fetched, ttl, now),
            _ => true,
        }
    }
}

// ── Validated tag ───────────────────────────────────────────────────────────

/// A validated, immutable provenance tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ProvenanceFields", into = "ProvenanceFields")]
pub struct ProvenanceTag {
    source_id: String,
    source_type: SourceType,
    authority_tier: AuthorityTier,
    fetched_at: DateTime<Utc>,
    ttl_seconds: u64,
    trust_class: TrustClass,
    data_classification: DataClassification,
    version: Option<String>,
    effective_date: Option<String>,
    expiry_date: Option<String>,
    owner: Option<String>,
    jurisdiction: Option<String>,
    doc_section: Option<String>,
    chunk_hash: Option<String>,
}

impl ProvenanceTag {
    pub fn source_id(&self) -> &str {
        &self.source_id
    }
    pub fn source_type(&self) -> SourceType {
        self.source_type
    }
    pub fn authority_tier(&self) -> AuthorityTier {
        self.authority_tier
    }
    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }
    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }
    pub fn trust_class(&self) -> TrustClass {
        self.trust_class
    }
    pub fn data_classification(&self) -> DataClassification {
        self.data_classification
    }
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }
    pub fn effective_date(&self) -> Option<&str> {
        self.effective_date.as_deref()
    }
    pub fn expiry_date(&self) -> Option<&str> {
        self.expiry_date.as_deref()
    }
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }
    pub fn jurisdiction(&self) -> Option<&str> {
        self.jurisdiction.as_deref()
    }
    pub fn doc_section(&self) -> Option<&str> {
        self.doc_section.as_deref()
    }
    pub fn chunk_hash(&self) -> Option<&str> {
        self.chunk_hash.as_deref()
    }

    /// Build a tag from raw fields, defaulting `fetched_at` to `now` and
    /// `ttl_seconds` to [`DEFAULT_TTL_SECONDS`] when absent, then validating.
    pub fn create(mut fields: ProvenanceFields, now: DateTime<Utc>) -> Result<Self, ProvenanceError> {
        if fields.fetched_at.is_none() {
            fields.fetched_at = Some(now.to_rfc3339());
        }
        if fields.ttl_seconds.is_none() {
            fields.ttl_seconds = Some(DEFAULT_TTL_SECONDS as i64);
        }
        Self::try_from(fields)
    }

    /// Expired when strictly more than `ttl_seconds` have elapsed since
    /// `fetched_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        elapsed_beyond(self.fetched_at, self.ttl_seconds, now)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Combine two tags into one describing derived data.
    ///
    /// The result takes the weaker authority, the shorter freshness window,
    /// the stricter classification, and is untrusted if either input is.
    pub fn merge(a: &ProvenanceTag, b: &ProvenanceTag, now: DateTime<Utc>) -> ProvenanceTag {
        ProvenanceTag {
            source_id: format!("merged:{}+{}", a.source_id, b.source_id),
            source_type: SourceType::AgentOutput,
            authority_tier: a.authority_tier.max(b.authority_tier),
            fetched_at: now,
            ttl_seconds: a.ttl_seconds.min(b.ttl_seconds),
            trust_class: a.trust_class.combine(b.trust_class),
            data_classification: a.data_classification.max(b.data_classification),
            version: None,
            effective_date: None,
            expiry_date: None,
            owner: None,
            jurisdiction: None,
            doc_section: None,
            chunk_hash: None,
        }
    }
}

impl TryFrom<ProvenanceFields> for ProvenanceTag {
    type Error = ProvenanceError;

    fn try_from(fields: ProvenanceFields) -> Result<Self, Self::Error> {
        let mut errors = Vec::new();

        let source_id = required(&fields.source_id, "source_id", &mut errors).map(str::to_string);
        let source_type = required(&fields.source_type, "source_type", &mut errors)
            .and_then(|raw| raw.parse::<SourceType>().map_err(|e| errors.push(e)).ok());
        let authority_tier = match fields.authority_tier {
            None => {
                errors.push("missing required field: authority_tier".into());
                None
            }
            Some(raw) => AuthorityTier::try_from(raw).map_err(|e| errors.push(e)).ok(),
        };
        let fetched_at = required(&fields.fetched_at, "fetched_at", &mut errors).and_then(|raw| {
            let parsed = parse_timestamp(raw);
            if parsed.is_none() {
                errors.push(format!("fetched_at is not a valid ISO-8601 timestamp: {raw}"));
            }
            parsed
        });
        let ttl_seconds = match fields.ttl_seconds {
            None => {
                errors.push("missing required field: ttl_seconds".into());
                None
            }
            Some(raw) => u64::try_from(raw)
                .map_err(|_| errors.push(format!("ttl_seconds must be non-negative, got {raw}")))
                .ok(),
        };
        let trust_class = required(&fields.trust_class, "trust_class", &mut errors)
            .and_then(|raw| raw.parse::<TrustClass>().map_err(|e| errors.push(e)).ok());
        let data_classification =
            required(&fields.data_classification, "data_classification", &mut errors).and_then(
                |raw| raw.parse::<DataClassification>().map_err(|e| errors.push(e)).ok(),
            );

        for (name, value) in [
            ("effective_date", &fields.effective_date),
            ("expiry_date", &fields.expiry_date),
        ] {
            if let Some(raw) = value
                && parse_timestamp(raw).is_none()
            {
                errors.push(format!("{name} is not a valid ISO-8601 date: {raw}"));
            }
        }
        if let Some(hash) = &fields.chunk_hash
            && !is_chunk_hash(hash)
        {
            errors.push(format!("chunk_hash must look like sha256:<64 hex chars>, got {hash}"));
        }

        match (
            source_id,
            source_type,
            authority_tier,
            fetched_at,
            ttl_seconds,
            trust_class,
            data_classification,
        ) {
            (
                Some(source_id),
                Some(source_type),
                Some(authority_tier),
                Some(fetched_at),
                Some(ttl_seconds),
                Some(trust_class),
                Some(data_classification),
            ) if errors.is_empty() => Ok(ProvenanceTag {
                source_id,
                source_type,
                authority_tier,
                fetched_at,
                ttl_seconds,
                trust_class,
                data_classification,
                version: fields.version,
                effective_date: fields.effective_date,
                expiry_date: fields.expiry_date,
                owner: fields.owner,
                jurisdiction: fields.jurisdiction,
                doc_section: fields.doc_section,
                chunk_hash: fields.chunk_hash,
            }),
            _ => Err(ProvenanceError::Invalid { errors }),
        }
    }
}

impl From<&ProvenanceTag> for ProvenanceFields {
    fn from(tag: &ProvenanceTag) -> Self {
        ProvenanceFields {
            source_id: Some(tag.source_id.clone()),
            source_type: Some(tag.source_type.as_str().to_string()),
            authority_tier: Some(i64::from(tag.authority_tier.get())),
            fetched_at: Some(tag.fetched_at.to_rfc3339()),
            ttl_seconds: Some(i64::try_from(tag.ttl_seconds).unwrap_or(i64::MAX)),
            trust_class: Some(tag.trust_class.as_str().to_string()),
            data_classification: Some(tag.data_classification.as_str().to_string()),
            version: tag.version.clone(),
            effective_date: tag.effective_date.clone(),
            expiry_date: tag.expiry_date.clone(),
            owner: tag.owner.clone(),
            jurisdiction: tag.jurisdiction.clone(),
            doc_section: tag.doc_section.clone(),
            chunk_hash: tag.chunk_hash.clone(),
            name: None,
        }
    }
}

impl From<ProvenanceTag> for ProvenanceFields {
    fn from(tag: ProvenanceTag) -> Self {
        ProvenanceFields::from(&tag)
    }
}

/// Outcome of validating raw fields without keeping the tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub errors: Vec<String>,
}

pub fn validate(fields: &ProvenanceFields) -> ValidationOutcome {
    match ProvenanceTag::try_from(fields.clone()) {
        Ok(_) => ValidationOutcome {
            valid: true,
            errors: Vec::new(),
        },
        Err(ProvenanceError::Invalid { errors }) => ValidationOutcome {
            valid: false,
            errors,
        },
    }
}

// ── Tagged data ─────────────────────────────────────────────────────────────

/// A payload paired with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tagged<T> {
    pub data: T,
    #[serde(rename = "_provenance")]
    pub provenance: ProvenanceTag,
}

impl<T> Tagged<T> {
    /// Attach provenance built from raw fields (defaults filled in).
    pub fn new(data: T, fields: ProvenanceFields) -> Result<Self, ProvenanceError> {
        let provenance = ProvenanceTag::create(fields, Utc::now())?;
        Ok(Self { data, provenance })
    }

    /// Drop the provenance and hand back the bare payload.
    pub fn into_data(self) -> T {
        self.data
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────────

/// Content fingerprint in the `sha256:<hex>` form used by `chunk_hash`.
pub fn compute_chunk_hash(content: &str) -> String {
    format!("sha256:{:x}", Sha256::digest(content.as_bytes()))
}

/// Parse an ISO-8601 timestamp or date. Offset-less values are read as UTC;
/// a bare date means midnight UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|n| n.and_utc())
}

fn elapsed_beyond(fetched_at: DateTime<Utc>, ttl_seconds: u64, now: DateTime<Utc>) -> bool {
    let ttl = i64::try_from(ttl_seconds)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX);
    now.signed_duration_since(fetched_at) > ttl
}

fn required<'a>(value: &'a Option<String>, name: &str, errors: &mut Vec<String>) -> Option<&'a str> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Some(v),
        Some(_) => {
            errors.push(format!("{name} must not be empty"));
            None
        }
        None => {
            errors.push(format!("missing required field: {name}"));
            None
        }
    }
}

fn is_chunk_hash(value: &str) -> bool {
    value
        .strip_prefix("sha256:")
        .is_some_and(|hex| hex.len() == 64 && hex.chars().all(|c| c.is_ascii_hexdigit()))
}
