//! `ctxengine assemble` — build a context package from JSON files.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ctxengine_core::AdapterBundle;
use ctxengine_pipeline::{ContextAssembler, ContextRequest, UserContext};
use tracing::info;

use super::{CmdResult, load_config, read_json};
use crate::adapters::JsonFileAdapter;

/// Optional files backing each adapter.
#[derive(Debug, Default)]
pub struct AdapterFiles {
    pub entities: Option<PathBuf>,
    pub kb: Option<PathBuf>,
    pub cross_agent: Option<PathBuf>,
    pub search: Option<PathBuf>,
}

impl AdapterFiles {
    pub fn bundle(self) -> AdapterBundle {
        let mut bundle = AdapterBundle::new();
        if let Some(path) = self.entities {
            bundle = bundle.with_entity_source(Arc::new(JsonFileAdapter::new("entity_data", path)));
        }
        if let Some(path) = self.kb {
            bundle = bundle.with_knowledge_source(Arc::new(JsonFileAdapter::new("kb_chunks", path)));
        }
        if let Some(path) = self.cross_agent {
            bundle = bundle.with_retriever(Arc::new(JsonFileAdapter::new("cross_agent", path)));
        }
        if let Some(path) = self.search {
            bundle = bundle.with_knowledge_search(Arc::new(JsonFileAdapter::new("rag_search", path)));
        }
        bundle
    }
}

pub async fn run(
    config: Option<&Path>,
    request: &Path,
    archetype: &str,
    domain: &str,
    user: Option<&Path>,
    files: AdapterFiles,
) -> CmdResult {
    let config = load_config(config)?;
    let request: ContextRequest = read_json(request).await?;
    let user: Option<UserContext> = match user {
        Some(path) => Some(read_json(path).await?),
        None => None,
    };

    let assembler = ContextAssembler::new(config)?;
    let assembled = assembler
        .assemble(&request, archetype, domain, user.as_ref(), &files.bundle())
        .await?;
    info!(
        trace_id = %assembled.metadata.trace_id,
        tokens = assembled.metadata.budget_report.final_tokens,
        "Assembly complete"
    );

    println!("{}", serde_json::to_string_pretty(&assembled)?);
    Ok(())
}
