//! Two-stage retrieval-augmented generation.
//!
//! Stage 1 is a broad search delegated entirely to an injected
//! [`KnowledgeSearch`] adapter. The results are deduplicated on a content
//! prefix, reranked by relevance and source authority (stage 2), and each
//! survivor is stamped with a fresh provenance tag.
//!
//! `final_score = relevance * relevance_weight + authority_boost * authority_weight`
//! where `authority_boost = max(0, (5 - tier) * 0.1)` for chunks that match
//! one of the domain's configured sources.

use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{DateTime, Utc};
use ctxengine_config::{ChunkingStrategy, DomainSource, RagConfig};
use ctxengine_core::provenance::compute_chunk_hash;
use ctxengine_core::{
    AdapterError, DataItem, KnowledgeSearch, ProvenanceFields, ProvenanceTag, TrustClass,
};
use serde_json::Value;
use tracing::{debug, warn};

/// Tier assumed for a chunk that does not carry one.
const UNRANKED_TIER: i64 = 5;

#[derive(Debug, Clone, Default)]
pub struct RagPipeline {
    config: RagConfig,
}

impl RagPipeline {
    pub fn new(config: RagConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn chunking_strategy(&self, doc_type: &str) -> Option<&ChunkingStrategy> {
        self.config.chunking_strategy(doc_type)
    }

    /// Stage 1 only: ask the adapter for `stage1_top_k` candidates.
    pub async fn search(
        &self,
        search: &dyn KnowledgeSearch,
        query: &str,
        domain: &str,
    ) -> Result<Vec<DataItem>, AdapterError> {
        search.search(query, domain, self.config.stage1_top_k).await
    }

    /// The full pipeline. A failing adapter yields no chunks.
    pub async fn retrieve(
        &self,
        search: &dyn KnowledgeSearch,
        query: &str,
        domain: &str,
        now: DateTime<Utc>,
    ) -> Vec<DataItem> {
        match self.search(search, query, domain).await {
            Ok(raw) => self.refine(query, domain, raw, now),
            Err(err) => {
                warn!(domain, error = %err, "Stage 1 retrieval failed; continuing without RAG chunks");
                Vec::new()
            }
        }
    }

    /// Everything after stage 1: dedup, rerank (when enabled), tag.
    pub fn refine(
        &self,
        query: &str,
        domain: &str,
        raw: Vec<DataItem>,
        now: DateTime<Utc>,
    ) -> Vec<DataItem> {
        let candidates = raw.len();
        let unique = self.dedup(raw);
        let ranked = if self.config.reranking_enabled {
            self.rank(query, unique, self.config.stage2_top_k, self.config.sources_for(domain))
        } else {
            unique.into_iter().take(self.config.stage2_top_k).collect()
        };
        let tagged: Vec<DataItem> = ranked
            .into_iter()
            .filter_map(|chunk| tag_chunk(chunk, now))
            .collect();
        debug!(domain, candidates, returned = tagged.len(), "RAG retrieval complete");
        tagged
    }

    /// Stage 2 on its own, for chunks retrieved elsewhere. The domain's
    /// sources are looked up from the first chunk's domain.
    pub fn rerank(&self, query: &str, chunks: Vec<DataItem>, top_k: usize) -> Vec<DataItem> {
        let sources: &[DomainSource] = chunks
            .first()
            .and_then(|c| c.domain.as_deref())
            .map(|domain| self.config.sources_for(domain))
            .unwrap_or(&[]);
        self.rank(query, chunks, top_k, sources)
    }

    fn dedup(&self, chunks: Vec<DataItem>) -> Vec<DataItem> {
        let mut seen = HashSet::new();
        chunks
            .into_iter()
            .filter(|chunk| {
                let prefix: String = chunk.text().chars().take(self.config.dedup_prefix_chars).collect();
                seen.insert(compute_chunk_hash(&prefix))
            })
            .collect()
    }

    fn rank(
        &self,
        query: &str,
        chunks: Vec<DataItem>,
        top_k: usize,
        sources: &[DomainSource],
    ) -> Vec<DataItem> {
        let min = self.config.min_relevance_score;
        let mut scored: Vec<(f64, DataItem)> = chunks
            .into_iter()
            .filter_map(|mut chunk| {
                let relevance = chunk
                    .relevance_score
                    .unwrap_or_else(|| keyword_relevance(query, chunk.text()));
                let boost = authority_boost(&chunk, sources);
                let score = relevance * self.config.relevance_weight + boost * self.config.authority_weight;
                if score < min && relevance < min {
                    return None;
                }
                chunk.extra.insert("_rag_score".into(), Value::from(round4(score)));
                chunk.extra.insert("_relevance_score".into(), Value::from(round4(relevance)));
                chunk.extra.insert("_authority_boost".into(), Value::from(round4(boost)));
                Some((score, chunk))
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
        scored.into_iter().take(top_k).map(|(_, chunk)| chunk).collect()
    }
}

/// Share of distinct query terms that occur in the text.
fn keyword_relevance(query: &str, text: &str) -> f64 {
    let terms: HashSet<String> = query.split_whitespace().map(str::to_lowercase).collect();
    if terms.is_empty() || text.is_empty() {
        return 0.0;
    }
    let text = text.to_lowercase();
    let matched = terms.iter().filter(|t| text.contains(t.as_str())).count();
    matched as f64 / terms.len() as f64
}

fn authority_boost(chunk: &DataItem, sources: &[DomainSource]) -> f64 {
    let source_id = chunk.source_id();
    let source_type = chunk.source_type();
    sources
        .iter()
        .find(|src| {
            (src.source_id.is_some() && src.source_id.as_deref() == source_id)
                || (src.source_type.is_some() && src.source_type.as_deref() == source_type)
        })
        .map_or(0.0, |src| (f64::from(5u8.saturating_sub(src.authority_tier)) * 0.1).max(0.0))
}

/// TRUSTED for tiers 1-4, UNTRUSTED for tier 5 and anything unranked.
fn trust_for_tier(tier: i64) -> TrustClass {
    if (1..=4).contains(&tier) {
        TrustClass::Trusted
    } else {
        TrustClass::Untrusted
    }
}

/// Stamp a chunk with a freshly created tag. Chunks whose tag does not
/// validate are dropped.
fn tag_chunk(mut chunk: DataItem, now: DateTime<Utc>) -> Option<DataItem> {
    let tier = chunk
        .authority_tier
        .or_else(|| chunk.provenance.as_ref().and_then(|p| p.authority_tier))
        .unwrap_or(UNRANKED_TIER);
    let trust = chunk
        .trust_class()
        .map(str::to_string)
        .unwrap_or_else(|| trust_for_tier(tier).as_str().to_string());
    let fields = ProvenanceFields {
        source_id: Some(chunk.source_id().unwrap_or("unknown").to_string()),
        source_type: chunk.source_type().map(str::to_string),
        authority_tier: Some(tier),
        trust_class: Some(trust),
        data_classification: Some(chunk.classification().unwrap_or("INTERNAL").to_string()),
        jurisdiction: chunk.jurisdiction().map(str::to_string),
        effective_date: chunk.effective_date().map(str::to_string),
        expiry_date: chunk.expiry_date().map(str::to_string),
        chunk_hash: chunk.content.as_deref().map(compute_chunk_hash),
        ..Default::default()
    };

    match ProvenanceTag::create(fields, now) {
        Ok(tag) => {
            chunk.provenance = Some(ProvenanceFields::from(&tag));
            Some(chunk)
        }
        Err(err) => {
            warn!(source_id = ?chunk.source_id(), error = %err, "Dropping RAG chunk with invalid provenance");
            None
        }
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
