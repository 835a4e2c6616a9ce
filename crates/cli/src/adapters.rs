//! File-backed adapters: each serves the JSON list stored in one file.
//!
//! The file is read on every call so an edit between runs is picked up.
//! An unreadable file is an ordinary adapter failure; a file that is not a
//! list of objects breaks the adapter contract.

use std::path::PathBuf;

use async_trait::async_trait;
use ctxengine_core::{
    AdapterError, DataItem, EntitySource, KnowledgeSearch, KnowledgeSource, RetrievalQuery,
    Retriever,
};
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct JsonFileAdapter {
    name: &'static str,
    path: PathBuf,
}

impl JsonFileAdapter {
    pub fn new(name: &'static str, path: impl Into<PathBuf>) -> Self {
        Self {
            name,
            path: path.into(),
        }
    }

    async fn load(&self) -> Result<Vec<DataItem>, AdapterError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| AdapterError::failed(self.name, format!("{}: {e}", self.path.display())))?;
        let value: Value = serde_json::from_str(&text)
            .map_err(|e| AdapterError::failed(self.name, format!("{}: {e}", self.path.display())))?;

        let Value::Array(entries) = value else {
            return Err(self.violation("expected a JSON list"));
        };
        let items = entries
            .into_iter()
            .enumerate()
            .map(|(i, entry)| {
                if !entry.is_object() {
                    return Err(self.violation(&format!("entry {i} is not an object")));
                }
                serde_json::from_value::<DataItem>(entry)
                    .map_err(|e| self.violation(&format!("entry {i}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(adapter = self.name, count = items.len(), "Loaded items from file");
        Ok(items)
    }

    fn violation(&self, detail: &str) -> AdapterError {
        AdapterError::ContractViolation {
            adapter: self.name.to_string(),
            detail: format!("{}: {detail}", self.path.display()),
        }
    }
}

#[async_trait]
impl EntitySource for JsonFileAdapter {
    /// Items bound to one of `entity_ids`, plus unbound ones.
    async fn get_entity_data(
        &self,
        entity_ids: &[String],
        _domain: &str,
    ) -> Result<Vec<DataItem>, AdapterError> {
        let items = self.load().await?;
        Ok(items
            .into_iter()
            .filter(|item| {
                item.entity_id
                    .as_ref()
                    .is_none_or(|id| entity_ids.contains(id))
            })
            .collect())
    }
}

#[async_trait]
impl KnowledgeSource for JsonFileAdapter {
    async fn get_kb_chunks(&self, _domain: &str, _query: &str) -> Result<Vec<DataItem>, AdapterError> {
        self.load().await
    }
}

#[async_trait]
impl Retriever for JsonFileAdapter {
    async fn retrieve(&self, _query: &RetrievalQuery) -> Result<Vec<DataItem>, AdapterError> {
        self.load().await
    }
}

#[async_trait]
impl KnowledgeSearch for JsonFileAdapter {
    async fn search(
        &self,
        _query: &str,
        _domain: &str,
        top_k: usize,
    ) -> Result<Vec<DataItem>, AdapterError> {
        let mut items = self.load().await?;
        items.truncate(top_k);
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn file_with(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn entity_source_filters_by_id() {
        let file = file_with(
            r#"[
                {"id": "a", "entity_id": "NPA-1"},
                {"id": "b", "entity_id": "NPA-2"},
                {"id": "c"}
            ]"#,
        );
        let adapter = JsonFileAdapter::new("entity_data", file.path());
        let items = adapter
            .get_entity_data(&["NPA-1".to_string()], "NPA")
            .await
            .unwrap();
        let ids: Vec<_> = items.iter().filter_map(|i| i.id.as_deref()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn non_list_file_is_a_contract_violation() {
        let file = file_with(r#"{"id": "a"}"#);
        let adapter = JsonFileAdapter::new("kb_chunks", file.path());
        let err = adapter.get_kb_chunks("NPA", "q").await.unwrap_err();
        assert!(matches!(err, AdapterError::ContractViolation { .. }));
        assert!(!err.is_degradable());
    }

    #[tokio::test]
    async fn missing_file_is_a_plain_failure() {
        let adapter = JsonFileAdapter::new("cross_agent", "/nonexistent/ctxengine/items.json");
        let query = RetrievalQuery {
            query: "q".into(),
            domain: "NPA".into(),
            entity_ids: Vec::new(),
            agent_id: None,
        };
        let err = adapter.retrieve(&query).await.unwrap_err();
        assert!(matches!(err, AdapterError::Failed { .. }));
        assert!(err.is_degradable());
    }

    #[tokio::test]
    async fn search_honours_top_k() {
        let file = file_with(r#"[{"id": "1"}, {"id": "2"}, {"id": "3"}]"#);
        let adapter = JsonFileAdapter::new("rag_search", file.path());
        assert_eq!(adapter.search("q", "NPA", 2).await.unwrap().len(), 2);
    }
}
