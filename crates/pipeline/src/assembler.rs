//! The seven-stage context assembler.
//!
//! One [`ContextAssembler`] is built per configuration and reused across
//! requests. Each call to [`ContextAssembler::assemble`] owns its draft
//! package and trace; the only state shared between calls is the breaker
//! registry.
//!
//! # Failure handling
//!
//! - Unknown archetype or budget profile: fatal, returned immediately.
//! - Deny-listed source type in the request: fatal policy violation.
//! - Adapter failure, timeout, or open breaker: that slot is empty.
//! - Adapter breaking its type contract: fatal.
//! - Item with invalid provenance: left out of the collected tags.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use ctxengine_config::{BudgetProfile, EngineConfig};
use ctxengine_contracts::{ArchetypeContract, ContextValidation, ContractSet, Disposition, validate_context};
use ctxengine_core::{
    AdapterBundle, AdapterError, ContextPackage, DataClassification, DataItem, ProvenanceTag, Result,
    RetrievalQuery, Slot, SlotContent,
};
use ctxengine_trust::provenance::collect_tags;
use ctxengine_trust::{AccessPolicy, TrustResolver, rank_sources};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::breaker::{BreakerRegistry, BreakerSettings, CROSS_AGENT, ENTITY_DATA, KB_CHUNKS, RAG_SEARCH};
use crate::budget::{BudgetReport, allocate_budget, trim_to_budget};
use crate::rag::RagPipeline;
use crate::scoper::{DEFAULT_ENTITY_TYPE, ScopingConfig, apply_all_scopes};
use crate::token::{HeuristicCounter, TokenCounter};
use crate::trace::{Stage, StageEvent, StageTrace};

/// Profile used when a contract does not name one.
const DEFAULT_PROFILE: &str = "standard";
/// Source type assumed for a pre-supplied source that does not state one.
const DEFAULT_SOURCE_TYPE: &str = "user_input";

// ── Request & result types ────────────────────────────────────────────────

/// What the calling agent asked for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub entity_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub conversation_history: Vec<Value>,
    #[serde(default)]
    pub few_shot_examples: Vec<Value>,
    #[serde(default)]
    pub tool_schemas: Vec<Value>,
    /// Sources the caller already holds; trust-classified and scoped like
    /// everything else.
    #[serde(default)]
    pub sources: Vec<DataItem>,
}

/// The authenticated caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jurisdiction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Highest classification this caller may be shown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_classification: Option<DataClassification>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetSummary {
    #[serde(flatten)]
    pub report: BudgetReport,
    pub trimmed: bool,
    pub removed_slots: Vec<Slot>,
    pub final_tokens: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssemblyMetadata {
    pub trace_id: String,
    pub archetype: String,
    pub domain: String,
    pub contract_id: String,
    pub stages: Vec<StageEvent>,
    pub budget_report: BudgetSummary,
    pub provenance_tags: Vec<ProvenanceTag>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssembledContext {
    pub context: ContextPackage,
    #[serde(rename = "_metadata")]
    pub metadata: AssemblyMetadata,
}

// ── Assembler ─────────────────────────────────────────────────────────────

pub struct ContextAssembler {
    config: Arc<EngineConfig>,
    contracts: ContractSet,
    resolver: TrustResolver,
    access: AccessPolicy,
    rag: RagPipeline,
    breakers: BreakerRegistry,
    counter: Arc<dyn TokenCounter>,
    adapter_timeout: Duration,
}

impl ContextAssembler {
    /// Build from config, loading contracts from `contracts_dir` when set.
    pub fn new(config: Arc<EngineConfig>) -> Result<Self> {
        let contracts = ContractSet::load(config.contracts_dir.as_deref())?;
        Self::with_contracts(config, contracts)
    }

    pub fn with_contracts(config: Arc<EngineConfig>, contracts: ContractSet) -> Result<Self> {
        let resolver = TrustResolver::new(&config.trust)?;
        Ok(Self {
            access: AccessPolicy::new(&config),
            rag: RagPipeline::new(config.rag.clone()),
            breakers: BreakerRegistry::new(BreakerSettings::from(&config.resilience)),
            counter: Arc::new(HeuristicCounter),
            adapter_timeout: Duration::from_millis(config.resilience.adapter_timeout_ms),
            resolver,
            contracts,
            config,
        })
    }

    pub fn with_token_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.counter = counter;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn contracts(&self) -> &ContractSet {
        &self.contracts
    }

    pub fn breakers(&self) -> &BreakerRegistry {
        &self.breakers
    }

    /// Assemble a context package for one agent call.
    pub async fn assemble(
        &self,
        request: &ContextRequest,
        archetype: &str,
        domain: &str,
        user: Option<&UserContext>,
        adapters: &AdapterBundle,
    ) -> Result<AssembledContext> {
        let mut trace = StageTrace::new();
        let now = Utc::now();
        let default_user = UserContext::default();
        let user = user.unwrap_or(&default_user);
        info!(trace_id = %trace.trace_id(), archetype, domain, "Assembling context");

        // ── Stage 1: Classify ──────────────────────────────────────────
        let started = Instant::now();
        let contract = self.contracts.get(archetype)?;
        let profile = self.profile_for(contract)?;
        let classified = self.classify_sources(&request.sources)?;
        trace.record(
            Stage::Classify,
            started,
            json!({
                "archetype": archetype,
                "contract_id": contract.contract_id,
                "profile": profile.name,
                "sources_classified": classified.len(),
            }),
        );

        // ── Stage 2: Scope ─────────────────────────────────────────────
        let started = Instant::now();
        let scoping = ScopingConfig {
            domain: Some(domain.to_string()),
            entity_ids: request.entity_ids.clone(),
            entity_type: Some(
                request
                    .entity_type
                    .clone()
                    .unwrap_or_else(|| DEFAULT_ENTITY_TYPE.to_string()),
            ),
            jurisdiction: user.jurisdiction.clone(),
            max_classification: user.max_classification,
            user_role: user.role.clone(),
        };
        let before = classified.len();
        let scoped_sources = apply_all_scopes(classified, &scoping, &self.access, now);
        trace.record(
            Stage::Scope,
            started,
            json!({
                "config": scoping,
                "before": before,
                "after": scoped_sources.len(),
            }),
        );

        // ── Stage 3: Retrieve ──────────────────────────────────────────
        let started = Instant::now();
        let query = request.query.as_str();

        let entity_call = async {
            match &adapters.entity_source {
                Some(source) if !request.entity_ids.is_empty() => {
                    self.guarded(ENTITY_DATA, source.get_entity_data(&request.entity_ids, domain))
                        .await
                }
                _ => Ok(Vec::new()),
            }
        };
        let kb_call = async {
            match &adapters.knowledge_source {
                Some(source) if !query.is_empty() => {
                    self.guarded(KB_CHUNKS, source.get_kb_chunks(domain, query)).await
                }
                _ => Ok(Vec::new()),
            }
        };
        let retrieval_query = RetrievalQuery {
            query: query.to_string(),
            domain: domain.to_string(),
            entity_ids: request.entity_ids.clone(),
            agent_id: request.agent_id.clone(),
        };
        let cross_call = async {
            match &adapters.retriever {
                Some(retriever) => {
                    self.guarded(CROSS_AGENT, retriever.retrieve(&retrieval_query)).await
                }
                None => Ok(Vec::new()),
            }
        };
        let rag_call = async {
            match &adapters.knowledge_search {
                Some(search) if !query.is_empty() => {
                    self.guarded(RAG_SEARCH, self.rag.search(search.as_ref(), query, domain))
                        .await
                }
                _ => Ok(Vec::new()),
            }
        };

        let (entity_data, kb_chunks, cross_agent, rag_raw) =
            tokio::join!(entity_call, kb_call, cross_call, rag_call);
        let entity_data = apply_all_scopes(entity_data?, &scoping, &self.access, now);
        let mut kb_chunks = apply_all_scopes(kb_chunks?, &scoping, &self.access, now);
        let cross_agent = apply_all_scopes(cross_agent?, &scoping, &self.access, now);
        let rag_chunks = apply_all_scopes(
            self.rag.refine(query, domain, rag_raw?, now),
            &scoping,
            &self.access,
            now,
        );
        let rag_count = rag_chunks.len();
        kb_chunks.extend(rag_chunks);

        trace.record(
            Stage::Retrieve,
            started,
            json!({
                "entity_data_count": entity_data.len(),
                "kb_chunks_count": kb_chunks.len(),
                "rag_chunks_count": rag_count,
                "cross_agent_count": cross_agent.len(),
            }),
        );

        // ── Stage 4: Rank ──────────────────────────────────────────────
        let started = Instant::now();
        let scoped_sources = rank_sources(scoped_sources);
        let entity_data = rank_sources(entity_data);
        let kb_chunks = rank_sources(kb_chunks);
        let cross_agent = rank_sources(cross_agent);
        let total_sources =
            scoped_sources.len() + entity_data.len() + kb_chunks.len() + cross_agent.len();
        trace.record(Stage::Rank, started, json!({ "total_sources": total_sources }));

        // ── Stage 5: Budget ────────────────────────────────────────────
        let started = Instant::now();
        let mut draft = ContextPackage::new();
        let mut place = |slot: Slot, content: SlotContent| {
            if contract.disposition(slot) != Disposition::Excluded {
                draft.insert(slot, content);
            }
        };
        place(Slot::SystemPromptContext, SlotContent::Text(request.system_prompt.clone()));
        place(Slot::EntityData, SlotContent::structured(&entity_data)?);
        place(Slot::KnowledgeChunks, SlotContent::structured(&kb_chunks)?);
        place(Slot::CrossAgentContext, SlotContent::structured(&cross_agent)?);
        place(Slot::FewShotExamples, SlotContent::structured(&request.few_shot_examples)?);
        place(Slot::ConversationHistory, SlotContent::structured(&request.conversation_history)?);
        place(Slot::ToolSchemas, SlotContent::structured(&request.tool_schemas)?);
        place(Slot::UserContext, SlotContent::structured(user)?);

        let report = allocate_budget(&draft, &profile, self.counter.as_ref());
        let within_budget = report.within_budget;
        let (package, removed_slots, final_tokens) = if within_budget {
            let total = report.total;
            (draft, Vec::new(), total)
        } else {
            let outcome = trim_to_budget(draft, &profile, self.counter.as_ref());
            (outcome.package, outcome.removed_slots, outcome.final_tokens)
        };
        trace.record(
            Stage::Budget,
            started,
            json!({
                "total_tokens": report.total,
                "within_budget": within_budget,
                "profile": profile.name,
                "removed_slots": removed_slots,
            }),
        );
        let budget_report = BudgetSummary {
            trimmed: !within_budget,
            removed_slots,
            final_tokens,
            report,
        };

        // ── Stage 6: Assemble ──────────────────────────────────────────
        let started = Instant::now();
        let slots: Vec<Slot> = package.iter().map(|(slot, _)| slot).collect();
        trace.record(Stage::Assemble, started, json!({ "slots": slots }));

        // ── Stage 7: Tag ───────────────────────────────────────────────
        let started = Instant::now();
        let delivered = |slot: Slot| {
            package.contains(slot) && !budget_report.removed_slots.contains(&slot)
        };
        let mut tagged_items: Vec<&DataItem> = scoped_sources.iter().collect();
        for (slot, items) in [
            (Slot::EntityData, &entity_data),
            (Slot::KnowledgeChunks, &kb_chunks),
            (Slot::CrossAgentContext, &cross_agent),
        ] {
            if delivered(slot) {
                tagged_items.extend(items.iter());
            }
        }
        let tags = collect_tags(tagged_items, now);
        trace.record(
            Stage::Tag,
            started,
            json!({
                "provenance_tags_collected": tags.tags.len(),
                "invalid": tags.invalid,
                "expired": tags.expired,
            }),
        );

        info!(
            trace_id = %trace.trace_id(),
            slots = package.len(),
            tokens = budget_report.final_tokens,
            trimmed = budget_report.trimmed,
            tags = tags.tags.len(),
            duration_ms = trace.total_duration_ms(),
            "Context assembled"
        );

        Ok(AssembledContext {
            context: package,
            metadata: AssemblyMetadata {
                trace_id: trace.trace_id().to_string(),
                archetype: archetype.to_string(),
                domain: domain.to_string(),
                contract_id: contract.contract_id.clone(),
                stages: trace.into_events(),
                budget_report,
                provenance_tags: tags.tags,
            },
        })
    }

    /// Check a package against the archetype's contract.
    pub fn validate(&self, package: &ContextPackage, archetype: &str) -> Result<ContextValidation> {
        let contract = self.contracts.get(archetype)?;
        Ok(validate_context(package, contract))
    }

    fn profile_for(&self, contract: &ArchetypeContract) -> Result<BudgetProfile> {
        let name = contract.budget_profile().unwrap_or(DEFAULT_PROFILE);
        Ok(self.config.budget.profile(name)?)
    }

    /// Stamp each pre-supplied source with its trust class. A deny-listed
    /// source type aborts the run.
    fn classify_sources(&self, sources: &[DataItem]) -> Result<Vec<DataItem>> {
        sources
            .iter()
            .map(|source| {
                let source_type = source.source_type().unwrap_or(DEFAULT_SOURCE_TYPE);
                let trust = self.resolver.classify_trust(Some(source_type))?;
                Ok(DataItem {
                    trust_class: Some(trust.as_str().to_string()),
                    ..source.clone()
                })
            })
            .collect()
    }

    /// Run one adapter call behind its breaker and the adapter timeout.
    /// Only a contract violation escapes; every other failure is an empty
    /// result.
    async fn guarded<F>(&self, site: &'static str, call: F) -> Result<Vec<DataItem>>
    where
        F: Future<Output = std::result::Result<Vec<DataItem>, AdapterError>>,
    {
        let breaker = self.breakers.get(site);
        let timeout = self.adapter_timeout;
        let outcome = breaker
            .call(move || async move {
                tokio::time::timeout(timeout, call)
                    .await
                    .unwrap_or_else(|_| {
                        Err(AdapterError::Timeout {
                            adapter: site.to_string(),
                            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                        })
                    })
            })
            .await;

        match outcome {
            Ok(items) => Ok(items),
            Err(err) if err.is_degradable() => {
                warn!(adapter = site, error = %err, "Adapter unavailable; slot left empty");
                Ok(Vec::new())
            }
            Err(err) => {
                warn!(adapter = site, error = %err, "Adapter violated its contract");
                Err(err.into())
            }
        }
    }
}

impl std::fmt::Debug for ContextAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextAssembler")
            .field("contracts", &self.contracts)
            .field("counter", &self.counter)
            .field("adapter_timeout", &self.adapter_timeout)
            .finish_non_exhaustive()
    }
}
