//! Adapter traits — the abstraction over external data backends.
//!
//! The engine owns no storage or index. Entity records, knowledge-base
//! chunks, cross-agent outputs, and broad RAG search all come from adapters
//! injected per request through an [`AdapterBundle`]. Any adapter may be
//! omitted; the stage it feeds then contributes an empty list.
//!
//! Adapters return typed results. A plain failure is absorbed by the
//! pipeline; [`AdapterError::ContractViolation`] is not.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AdapterError;
use crate::item::DataItem;

/// The query handed to the cross-agent retriever.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalQuery {
    pub query: String,
    pub domain: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entity_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
}

/// Retrieves outputs produced by other agents.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &RetrievalQuery) -> Result<Vec<DataItem>, AdapterError>;
}

/// Fetches system-of-record data for the entities a request is about.
#[async_trait]
pub trait EntitySource: Send + Sync {
    async fn get_entity_data(
        &self,
        entity_ids: &[String],
        domain: &str,
    ) -> Result<Vec<DataItem>, AdapterError>;
}

/// Fetches knowledge-base chunks for a domain.
#[async_trait]
pub trait KnowledgeSource: Send + Sync {
    async fn get_kb_chunks(&self, domain: &str, query: &str) -> Result<Vec<DataItem>, AdapterError>;
}

/// Broad first-stage search for retrieval-augmented generation.
#[async_trait]
pub trait KnowledgeSearch: Send + Sync {
    async fn search(
        &self,
        query: &str,
        domain: &str,
        top_k: usize,
    ) -> Result<Vec<DataItem>, AdapterError>;
}

/// The set of adapters available to one assembly run.
#[derive(Clone, Default)]
pub struct AdapterBundle {
    pub retriever: Option<Arc<dyn Retriever>>,
    pub entity_source: Option<Arc<dyn EntitySource>>,
    pub knowledge_source: Option<Arc<dyn KnowledgeSource>>,
    pub knowledge_search: Option<Arc<dyn KnowledgeSearch>>,
}

impl AdapterBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn with_entity_source(mut self, source: Arc<dyn EntitySource>) -> Self {
        self.entity_source = Some(source);
        self
    }

    pub fn with_knowledge_source(mut self, source: Arc<dyn KnowledgeSource>) -> Self {
        self.knowledge_source = Some(source);
        self
    }

    pub fn with_knowledge_search(mut self, search: Arc<dyn KnowledgeSearch>) -> Self {
        self.knowledge_search = Some(search);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.retriever.is_none()
            && self.entity_source.is_none()
            && self.knowledge_source.is_none()
            && self.knowledge_search.is_none()
    }
}

impl std::fmt::Debug for AdapterBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterBundle")
            .field("retriever", &self.retriever.is_some())
            .field("entity_source", &self.entity_source.is_some())
            .field("knowledge_source", &self.knowledge_source.is_some())
            .field("knowledge_search", &self.knowledge_search.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticEntities(Vec<DataItem>);

    #[async_trait]
    impl EntitySource for StaticEntities {
        async fn get_entity_data(
            &self,
            entity_ids: &[String],
            _domain: &str,
        ) -> Result<Vec<DataItem>, AdapterError> {
            Ok(self
                .0
                .iter()
                .filter(|item| {
                    item.entity_id
                        .as_ref()
                        .is_some_and(|id| entity_ids.contains(id))
                })
                .cloned()
                .collect())
        }
    }

    #[tokio::test]
    async fn bundle_dispatches_to_injected_adapter() {
        let item = DataItem {
            entity_id: Some("NPA-1".into()),
            ..DataItem::new("record")
        };
        let bundle = AdapterBundle::new().with_entity_source(Arc::new(StaticEntities(vec![item])));
        assert!(!bundle.is_empty());

        let source = bundle.entity_source.as_ref().unwrap();
        let found = source
            .get_entity_data(&["NPA-1".to_string()], "NPA")
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        let none = source
            .get_entity_data(&["NPA-2".to_string()], "NPA")
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn empty_bundle_debug_shows_absence() {
        let bundle = AdapterBundle::new();
        assert!(bundle.is_empty());
        assert!(format!("{bundle:?}").contains("retriever: false"));
    }
}
