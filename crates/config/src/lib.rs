//! Configuration loading, validation, and management for ctxengine.
//!
//! Loads configuration from `~/.ctxengine/config.toml` (or the file named by
//! `$CTXENGINE_CONFIG`). Every section has defaults, so a partial file is
//! valid and a missing default file yields the built-in banking setup.
//! Validates all settings at startup.

mod budget;

pub use budget::{
    BudgetConfig, BudgetProfile, OverflowAction, Priority, ProfileConfig, ResponseHeadroom,
    SlotAllocation, SlotOverride,
};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use ctxengine_core::{DataClassification, SourceType, TrustClass};
use serde::{Deserialize, Serialize};

/// The root configuration structure.
///
/// Maps directly to `~/.ctxengine/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory of `<archetype>.json` contract files. Built-in contracts
    /// are used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contracts_dir: Option<PathBuf>,

    /// Trust rules, source hierarchy, and roles
    #[serde(default)]
    pub trust: TrustConfig,

    /// Data classification taxonomy
    #[serde(default = "default_classification_levels")]
    pub classification: Vec<ClassificationLevel>,

    /// Token budget profiles
    #[serde(default)]
    pub budget: BudgetConfig,

    /// Claim grounding requirements
    #[serde(default)]
    pub grounding: GroundingConfig,

    /// Two-stage retrieval settings
    #[serde(default)]
    pub rag: RagConfig,

    /// Circuit breaker and adapter timeout settings
    #[serde(default)]
    pub resilience: ResilienceConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            contracts_dir: None,
            trust: TrustConfig::default(),
            classification: default_classification_levels(),
            budget: BudgetConfig::default(),
            grounding: GroundingConfig::default(),
            rag: RagConfig::default(),
            resilience: ResilienceConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load from `$CTXENGINE_CONFIG`, else `~/.ctxengine/config.toml`.
    ///
    /// A missing default file falls back to the built-in configuration; a
    /// path named by the environment variable must exist.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var("CTXENGINE_CONFIG") {
            return Self::load_from(Path::new(&path));
        }

        let config_path = Self::config_dir().join("config.toml");
        if !config_path.exists() {
            tracing::info!("No config file found at {}, using defaults", config_path.display());
            return Ok(Self::default());
        }
        Self::load_from(&config_path)
    }

    /// Load from an explicit path. The file must exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        tracing::debug!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".ctxengine")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (i, rule) in self.trust.rules.iter().enumerate() {
            if rule.pattern.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "trust.rules[{i}] has an empty pattern"
                )));
            }
        }

        for entry in &self.trust.source_hierarchy {
            if !(1..=5).contains(&entry.tier) {
                return Err(ConfigError::ValidationError(format!(
                    "source '{}' has tier {}, expected 1-5",
                    entry.source_type, entry.tier
                )));
            }
        }

        for level in &self.classification {
            if !self.trust.roles.contains_key(&level.min_role_required) {
                return Err(ConfigError::ValidationError(format!(
                    "classification {} requires unknown role '{}'",
                    level.level, level.min_role_required
                )));
            }
        }

        self.budget.validate()?;

        for (claim_type, tier) in &self.grounding.min_authority_tier {
            if !(1..=5).contains(tier) {
                return Err(ConfigError::ValidationError(format!(
                    "grounding.min_authority_tier.{claim_type} must be 1-5"
                )));
            }
        }

        if self.rag.relevance_weight + self.rag.authority_weight <= 0.0 {
            return Err(ConfigError::ValidationError(
                "rag.relevance_weight + rag.authority_weight must be > 0".into(),
            ));
        }
        for (domain, sources) in &self.rag.domain_sources {
            if sources.iter().any(|s| !(1..=5).contains(&s.authority_tier)) {
                return Err(ConfigError::ValidationError(format!(
                    "rag.domain_sources.{domain} has a tier outside 1-5"
                )));
            }
        }

        if self.resilience.failure_threshold == 0 {
            return Err(ConfigError::ValidationError(
                "resilience.failure_threshold must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Generate the default config as a TOML string (for `ctxengine config`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }

    /// Configured examples and role for a classification level.
    pub fn classification_level(&self, level: DataClassification) -> Option<&ClassificationLevel> {
        self.classification.iter().find(|l| l.level == level)
    }
}

// ── Trust ───────────────────────────────────────────────────────────────────

/// One ordered pattern rule. Patterns are anchored at the start of the
/// source type; the first match decides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustRule {
    pub pattern: String,
    pub trust_class: TrustClass,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceTier {
    pub tier: u8,
    pub source_type: SourceType,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustConfig {
    #[serde(default = "default_trust_rules")]
    pub rules: Vec<TrustRule>,

    #[serde(default = "default_source_hierarchy")]
    pub source_hierarchy: Vec<SourceTier>,

    /// Role name to rank. Higher ranks see more.
    #[serde(default = "default_roles")]
    pub roles: BTreeMap<String, u8>,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            rules: default_trust_rules(),
            source_hierarchy: default_source_hierarchy(),
            roles: default_roles(),
        }
    }
}

fn default_trust_rules() -> Vec<TrustRule> {
    let rule = |pattern: &str, trust_class| TrustRule {
        pattern: pattern.to_string(),
        trust_class,
    };
    vec![
        rule(
            r"^(system_of_record|bank_sop|industry_standard|external_official)$",
            TrustClass::Trusted,
        ),
        rule(r"^mcp_tool_results$", TrustClass::Trusted),
        rule(r"^[a-z_]+_from_kb$", TrustClass::Trusted),
        rule(r"^agent_outputs_with_provenance$", TrustClass::Trusted),
        rule(r"^reference_data_tables$", TrustClass::Trusted),
        rule(
            r"^(user_free_text|uploaded_documents|external_api_responses|general_web|user_input)$",
            TrustClass::Untrusted,
        ),
    ]
}

fn default_source_hierarchy() -> Vec<SourceTier> {
    let tier = |tier, source_type, description: &str| SourceTier {
        tier,
        source_type,
        description: description.to_string(),
    };
    vec![
        tier(1, SourceType::SystemOfRecord, "Booking, risk and approval systems of record"),
        tier(2, SourceType::BankSop, "Approved bank policies and procedures"),
        tier(3, SourceType::IndustryStandard, "Industry frameworks and market standards"),
        tier(4, SourceType::ExternalOfficial, "Regulator and exchange publications"),
        tier(5, SourceType::GeneralWeb, "Unverified public web content"),
    ]
}

fn default_roles() -> BTreeMap<String, u8> {
    [
        ("any", 0),
        ("employee", 1),
        ("analyst", 2),
        ("checker", 3),
        ("manager", 4),
        ("coo", 5),
        ("admin", 6),
    ]
    .into_iter()
    .map(|(name, rank)| (name.to_string(), rank))
    .collect()
}

// ── Classification ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationLevel {
    pub level: DataClassification,
    pub min_role_required: String,
    /// Data type names known to carry this classification.
    #[serde(default)]
    pub examples: Vec<String>,
}

fn default_classification_levels() -> Vec<ClassificationLevel> {
    let level = |level, role: &str, examples: &[&str]| ClassificationLevel {
        level,
        min_role_required: role.to_string(),
        examples: examples.iter().map(|e| e.to_string()).collect(),
    };
    vec![
        level(DataClassification::Public, "any", &["press_release", "product_brochure"]),
        level(DataClassification::Internal, "employee", &["sop", "policy_document"]),
        level(
            DataClassification::Confidential,
            "analyst",
            &["npa_project", "client_data", "risk_assessment"],
        ),
        level(
            DataClassification::Restricted,
            "checker",
            &["customer_pii", "trading_limits", "board_minutes"],
        ),
    ]
}

// ── Grounding ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingConfig {
    /// Weakest acceptable authority tier per claim type.
    #[serde(default = "default_min_tiers")]
    pub min_authority_tier: BTreeMap<String, u8>,

    /// Tier required for claim types not listed above.
    #[serde(default = "default_fallback_tier")]
    pub default_min_tier: u8,

    /// Characters searched on each side of a claim for a citation.
    #[serde(default = "default_citation_window")]
    pub citation_window: usize,
}

impl Default for GroundingConfig {
    fn default() -> Self {
        Self {
            min_authority_tier: default_min_tiers(),
            default_min_tier: default_fallback_tier(),
            citation_window: default_citation_window(),
        }
    }
}

impl GroundingConfig {
    pub fn min_tier_for(&self, claim_type: &str) -> u8 {
        self.min_authority_tier
            .get(claim_type)
            .copied()
            .unwrap_or(self.default_min_tier)
    }
}

fn default_min_tiers() -> BTreeMap<String, u8> {
    [
        ("classification_decision", 2),
        ("risk_assessment", 3),
        ("governance_rule", 2),
        ("regulatory_obligation", 2),
        ("signoff_requirement", 2),
        ("financial_threshold", 1),
        ("prohibited_item", 2),
        ("sla_deadline", 3),
    ]
    .into_iter()
    .map(|(claim, tier)| (claim.to_string(), tier))
    .collect()
}
fn default_fallback_tier() -> u8 {
    5
}
fn default_citation_window() -> usize {
    100
}

// ── RAG ─────────────────────────────────────────────────────────────────────

/// A source the domain prefers, matched by id or type during reranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
    pub authority_tier: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkMethod {
    SectionAware,
    FixedSize,
    FieldLevel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingStrategy {
    pub method: ChunkMethod,
    pub chunk_size: usize,
    #[serde(default)]
    pub overlap: usize,
    #[serde(default)]
    pub metadata_fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagConfig {
    #[serde(default = "default_stage1_top_k")]
    pub stage1_top_k: usize,
    #[serde(default = "default_stage2_top_k")]
    pub stage2_top_k: usize,
    #[serde(default = "default_min_relevance")]
    pub min_relevance_score: f64,
    #[serde(default = "default_true")]
    pub reranking_enabled: bool,
    #[serde(default = "default_relevance_weight")]
    pub relevance_weight: f64,
    #[serde(default = "default_authority_weight")]
    pub authority_weight: f64,
    /// Leading characters of content hashed for deduplication.
    #[serde(default = "default_dedup_prefix")]
    pub dedup_prefix_chars: usize,
    #[serde(default = "default_domain_sources")]
    pub domain_sources: BTreeMap<String, Vec<DomainSource>>,
    #[serde(default = "default_chunking")]
    pub chunking_strategies: BTreeMap<String, ChunkingStrategy>,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            stage1_top_k: default_stage1_top_k(),
            stage2_top_k: default_stage2_top_k(),
            min_relevance_score: default_min_relevance(),
            reranking_enabled: true,
            relevance_weight: default_relevance_weight(),
            authority_weight: default_authority_weight(),
            dedup_prefix_chars: default_dedup_prefix(),
            domain_sources: default_domain_sources(),
            chunking_strategies: default_chunking(),
        }
    }
}

impl RagConfig {
    /// Chunking strategy for a document type, falling back to `default`.
    pub fn chunking_strategy(&self, doc_type: &str) -> Option<&ChunkingStrategy> {
        self.chunking_strategies
            .get(doc_type)
            .or_else(|| self.chunking_strategies.get("default"))
    }

    /// Preferred sources for a domain (case-insensitive lookup).
    pub fn sources_for(&self, domain: &str) -> &[DomainSource] {
        self.domain_sources
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(domain))
            .map(|(_, sources)| sources.as_slice())
            .unwrap_or(&[])
    }
}

fn default_stage1_top_k() -> usize {
    40
}
fn default_stage2_top_k() -> usize {
    8
}
fn default_min_relevance() -> f64 {
    0.15
}
fn default_relevance_weight() -> f64 {
    0.6
}
fn default_authority_weight() -> f64 {
    0.4
}
fn default_dedup_prefix() -> usize {
    200
}
fn default_true() -> bool {
    true
}

fn default_domain_sources() -> BTreeMap<String, Vec<DomainSource>> {
    let by_type = |source_type: &str, authority_tier| DomainSource {
        source_id: None,
        source_type: Some(source_type.to_string()),
        authority_tier,
    };
    BTreeMap::from([(
        "NPA".to_string(),
        vec![
            DomainSource {
                source_id: Some("npa_project_db".into()),
                source_type: None,
                authority_tier: 1,
            },
            by_type("system_of_record", 1),
            by_type("bank_sop", 2),
            by_type("industry_standard", 3),
            by_type("external_official", 4),
        ],
    )])
}

fn default_chunking() -> BTreeMap<String, ChunkingStrategy> {
    let strategy = |method, chunk_size, overlap, fields: &[&str]| ChunkingStrategy {
        method,
        chunk_size,
        overlap,
        metadata_fields: fields.iter().map(|f| f.to_string()).collect(),
    };
    BTreeMap::from([
        (
            "sop_document".to_string(),
            strategy(ChunkMethod::SectionAware, 512, 64, &["section_number", "version", "effective_date"]),
        ),
        (
            "regulatory_notice".to_string(),
            strategy(
                ChunkMethod::SectionAware,
                384,
                48,
                &["jurisdiction", "regulator", "notice_id", "effective_date"],
            ),
        ),
        (
            "template_document".to_string(),
            strategy(ChunkMethod::FixedSize, 512, 64, &["template_id", "version"]),
        ),
        (
            "entity_record".to_string(),
            strategy(ChunkMethod::FieldLevel, 256, 0, &["entity_id", "fetched_at"]),
        ),
        ("default".to_string(), strategy(ChunkMethod::FixedSize, 512, 64, &[])),
    ])
}

// ── Resilience ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Consecutive failures before a breaker opens
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// How long an open breaker waits before allowing a probe
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    /// Upper bound on any single adapter call
    #[serde(default = "default_adapter_timeout_ms")]
    pub adapter_timeout_ms: u64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_ms: default_cooldown_ms(),
            adapter_timeout_ms: default_adapter_timeout_ms(),
        }
    }
}

fn default_failure_threshold() -> u32 {
    3
}
fn default_cooldown_ms() -> u64 {
    10_000
}
fn default_adapter_timeout_ms() -> u64 {
    10_000
}

// ── Store ───────────────────────────────────────────────────────────────────

/// Process-wide configuration cache.
///
/// Loads once on first access and hands out a shared read-only snapshot.
/// `reload` re-reads the source; `reset` drops the snapshot so the next
/// access loads afresh.
#[derive(Debug, Default)]
pub struct ConfigStore {
    path: Option<PathBuf>,
    cached: RwLock<Option<Arc<EngineConfig>>>,
}

impl ConfigStore {
    /// A store backed by the default lookup of [`EngineConfig::load`].
    pub fn new() -> Self {
        Self::default()
    }

    /// A store backed by an explicit file.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            cached: RwLock::new(None),
        }
    }

    /// A store pre-populated with an in-memory configuration.
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            path: None,
            cached: RwLock::new(Some(Arc::new(config))),
        }
    }

    pub fn get(&self) -> Result<Arc<EngineConfig>, ConfigError> {
        if let Some(config) = self.cached.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
            return Ok(Arc::clone(config));
        }
        self.reload()
    }

    pub fn reload(&self) -> Result<Arc<EngineConfig>, ConfigError> {
        let config = Arc::new(match &self.path {
            Some(path) => EngineConfig::load_from(path)?,
            None => EngineConfig::load()?,
        });
        *self.cached.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&config));
        tracing::info!("Configuration reloaded");
        Ok(config)
    }

    pub fn reset(&self) {
        *self.cached.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn is_loaded(&self) -> bool {
        self.cached
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for ctxengine_core::Error {
    fn from(err: ConfigError) -> Self {
        ctxengine_core::Error::Config {
            message: err.to_string(),
        }
    }
}
