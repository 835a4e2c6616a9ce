//! Contract data model and loading.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use ctxengine_core::Slot;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::{ContractError, ContractResult};

/// Keys a contract file must carry.
const REQUIRED_CONTRACT_FIELDS: [&str; 2] = ["contract_id", "archetype"];

/// The agent roles contracts exist for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Archetype {
    Orchestrator,
    Worker,
    Reviewer,
}

impl Archetype {
    pub const ALL: [Archetype; 3] = [Archetype::Orchestrator, Archetype::Worker, Archetype::Reviewer];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Orchestrator => "orchestrator",
            Self::Worker => "worker",
            Self::Reviewer => "reviewer",
        }
    }
}

impl fmt::Display for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Archetype {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| ContractError::UnknownArchetype(s.to_string()))
    }
}

pub fn list_archetypes() -> Vec<&'static str> {
    Archetype::ALL.iter().map(Archetype::as_str).collect()
}

/// The rich form of a required-context entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSpec {
    pub slot: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
}

/// A context entry: a bare slot name or a rich slot spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextRequirement {
    Slot(String),
    Spec(SlotSpec),
}

impl ContextRequirement {
    pub fn slot_name(&self) -> &str {
        match self {
            Self::Slot(name) => name,
            Self::Spec(spec) => &spec.slot,
        }
    }
}

/// Source requirements grouped from rich required-context entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceRequirement {
    pub source: String,
    pub slots: Vec<String>,
    pub priority: String,
    pub fields: Vec<String>,
}

/// How a contract treats one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Required,
    Optional,
    Excluded,
    Unlisted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchetypeContract {
    pub contract_id: String,
    pub archetype: Archetype,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_profile: Option<String>,
    #[serde(default)]
    pub required_context: Vec<ContextRequirement>,
    #[serde(default)]
    pub optional_context: Vec<ContextRequirement>,
    #[serde(default)]
    pub excluded_context: Vec<String>,
}

impl ArchetypeContract {
    /// Parse a contract document. `name` is only used in error messages.
    pub fn from_json(name: &str, text: &str) -> ContractResult<Self> {
        let raw: Value = serde_json::from_str(text).map_err(|e| ContractError::Malformed {
            archetype: name.to_string(),
            detail: e.to_string(),
        })?;

        let missing: Vec<String> = REQUIRED_CONTRACT_FIELDS
            .iter()
            .filter(|field| raw.get(**field).is_none_or(Value::is_null))
            .map(|field| field.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ContractError::MissingFields {
                archetype: name.to_string(),
                fields: missing,
            });
        }

        serde_json::from_value(raw).map_err(|e| ContractError::Malformed {
            archetype: name.to_string(),
            detail: e.to_string(),
        })
    }

    pub fn required_slots(&self) -> Vec<&str> {
        self.required_context.iter().map(ContextRequirement::slot_name).collect()
    }

    pub fn optional_context(&self) -> Vec<&str> {
        self.optional_context.iter().map(ContextRequirement::slot_name).collect()
    }

    pub fn excluded_context(&self) -> Vec<&str> {
        self.excluded_context.iter().map(String::as_str).collect()
    }

    pub fn budget_profile(&self) -> Option<&str> {
        self.budget_profile.as_deref()
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn disposition(&self, slot: Slot) -> Disposition {
        let name = slot.as_str();
        if self.excluded_context.iter().any(|s| s == name) {
            Disposition::Excluded
        } else if self.required_context.iter().any(|r| r.slot_name() == name) {
            Disposition::Required
        } else if self.optional_context.iter().any(|r| r.slot_name() == name) {
            Disposition::Optional
        } else {
            Disposition::Unlisted
        }
    }

    /// Rich required entries grouped by their source. Simple-format
    /// contracts have none.
    pub fn required_sources(&self) -> Vec<SourceRequirement> {
        let mut order: Vec<String> = Vec::new();
        let mut by_source: BTreeMap<String, SourceRequirement> = BTreeMap::new();
        for entry in &self.required_context {
            let ContextRequirement::Spec(spec) = entry else {
                continue;
            };
            let Some(source) = &spec.source else {
                continue;
            };
            let group = by_source.entry(source.clone()).or_insert_with(|| {
                order.push(source.clone());
                SourceRequirement {
                    source: source.clone(),
                    slots: Vec::new(),
                    priority: spec.priority.clone().unwrap_or_else(|| "MEDIUM".into()),
                    fields: Vec::new(),
                }
            });
            group.slots.push(spec.slot.clone());
            group.fields.extend(spec.fields.iter().cloned());
        }
        order
            .into_iter()
            .filter_map(|source| by_source.remove(&source))
            .collect()
    }

    /// The contract shipped with the engine for an archetype.
    pub fn builtin(archetype: Archetype) -> Self {
        let names = |slots: &[Slot]| -> Vec<ContextRequirement> {
            slots
                .iter()
                .map(|s| ContextRequirement::Slot(s.as_str().to_string()))
                .collect()
        };
        let excluded = |slots: &[Slot]| -> Vec<String> {
            slots.iter().map(|s| s.as_str().to_string()).collect()
        };

        match archetype {
            Archetype::Orchestrator => Self {
                contract_id: "ctx-orchestrator-v1".into(),
                archetype,
                version: Some("1.0.0".into()),
                description: Some("Routes requests; sees the user and the conversation, not the knowledge base".into()),
                budget_profile: Some("lightweight".into()),
                required_context: vec![
                    ContextRequirement::Spec(SlotSpec {
                        slot: Slot::SystemPromptContext.as_str().into(),
                        fields: Vec::new(),
                        source: Some("platform".into()),
                        priority: Some("CRITICAL".into()),
                    }),
                    ContextRequirement::Spec(SlotSpec {
                        slot: Slot::UserContext.as_str().into(),
                        fields: ["user_id", "role", "department", "jurisdiction", "session_id"]
                            .iter()
                            .map(|f| f.to_string())
                            .collect(),
                        source: Some("platform".into()),
                        priority: Some("CRITICAL".into()),
                    }),
                ],
                optional_context: names(&[
                    Slot::ConversationHistory,
                    Slot::ToolSchemas,
                    Slot::CrossAgentContext,
                ]),
                excluded_context: excluded(&[Slot::KnowledgeChunks]),
            },
            Archetype::Worker => Self {
                contract_id: "ctx-worker-v1".into(),
                archetype,
                version: Some("1.0.0".into()),
                description: Some("Executes one domain task against entity data and knowledge".into()),
                budget_profile: Some("standard".into()),
                required_context: names(&[
                    Slot::SystemPromptContext,
                    Slot::EntityData,
                    Slot::KnowledgeChunks,
                ]),
                optional_context: names(&[
                    Slot::FewShotExamples,
                    Slot::ToolSchemas,
                    Slot::ConversationHistory,
                    Slot::UserContext,
                ]),
                excluded_context: excluded(&[Slot::CrossAgentContext]),
            },
            Archetype::Reviewer => Self {
                contract_id: "ctx-reviewer-v1".into(),
                archetype,
                version: Some("1.0.0".into()),
                description: Some("Checks another agent's output against its sources".into()),
                budget_profile: Some("compact".into()),
                required_context: names(&[Slot::SystemPromptContext, Slot::CrossAgentContext]),
                optional_context: names(&[Slot::KnowledgeChunks, Slot::EntityData]),
                excluded_context: excluded(&[Slot::ConversationHistory, Slot::FewShotExamples]),
            },
        }
    }
}

/// Load `<dir>/<archetype>.json`.
pub fn load_contract(dir: &Path, archetype: &str) -> ContractResult<ArchetypeContract> {
    let archetype: Archetype = archetype.parse()?;
    let path = dir.join(format!("{archetype}.json"));
    if !path.exists() {
        return Err(ContractError::NotFound { path });
    }
    let text = std::fs::read_to_string(&path)?;
    let contract = ArchetypeContract::from_json(archetype.as_str(), &text)?;
    debug!(archetype = %archetype, contract_id = %contract.contract_id, "Loaded contract");
    Ok(contract)
}

/// One contract per archetype.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractSet {
    contracts: BTreeMap<Archetype, ArchetypeContract>,
}

impl ContractSet {
    /// The built-in contracts.
    pub fn builtin() -> Self {
        Self {
            contracts: Archetype::ALL
                .into_iter()
                .map(|a| (a, ArchetypeContract::builtin(a)))
                .collect(),
        }
    }

    /// Load every archetype's contract from a directory. All three files
    /// must be present.
    pub fn load_dir(dir: &Path) -> ContractResult<Self> {
        let contracts = Archetype::ALL
            .into_iter()
            .map(|a| load_contract(dir, a.as_str()).map(|c| (a, c)))
            .collect::<ContractResult<BTreeMap<_, _>>>()?;
        Ok(Self { contracts })
    }

    /// Directory contracts when a directory is given, built-ins otherwise.
    pub fn load(dir: Option<&Path>) -> ContractResult<Self> {
        match dir {
            Some(dir) => Self::load_dir(dir),
            None => Ok(Self::builtin()),
        }
    }

    pub fn get(&self, archetype: &str) -> ContractResult<&ArchetypeContract> {
        let archetype: Archetype = archetype.parse()?;
        self.contracts
            .get(&archetype)
            .ok_or_else(|| ContractError::UnknownArchetype(archetype.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn archetypes_parse_and_list() {
        assert_eq!("worker".parse::<Archetype>().unwrap(), Archetype::Worker);
        assert!(matches!(
            "janitor".parse::<Archetype>(),
            Err(ContractError::UnknownArchetype(_))
        ));
        assert_eq!(list_archetypes(), vec!["orchestrator", "worker", "reviewer"]);
    }

    #[test]
    fn simple_and_rich_entries_both_parse() {
        let contract = ArchetypeContract::from_json(
            "orchestrator",
            r#"{
                "contract_id": "c1",
                "archetype": "orchestrator",
                "required_context": [
                    {"slot": "user_context", "fields": ["user_id", "role"], "source": "platform", "priority": "CRITICAL"},
                    {"slot": "intent", "source": "platform"},
                    {"slot": "routing_context", "source": "registry"},
                    "system_prompt_context"
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(
            contract.required_slots(),
            vec!["user_context", "intent", "routing_context", "system_prompt_context"]
        );

        let sources = contract.required_sources();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].source, "platform");
        assert_eq!(sources[0].slots, vec!["user_context", "intent"]);
        assert_eq!(sources[0].priority, "CRITICAL");
        assert_eq!(sources[0].fields, vec!["user_id", "role"]);
        assert_eq!(sources[1].priority, "MEDIUM");
    }

    #[test]
    fn missing_structural_fields_are_reported() {
        let err = ArchetypeContract::from_json("worker", r#"{"version": "1"}"#).unwrap_err();
        match err {
            ContractError::MissingFields { fields, .. } => {
                assert_eq!(fields, vec!["contract_id", "archetype"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn malformed_json_is_distinct() {
        let err = ArchetypeContract::from_json("worker", "{not json").unwrap_err();
        assert!(matches!(err, ContractError::Malformed { .. }));
    }

    #[test]
    fn load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        let contract = ArchetypeContract::builtin(Archetype::Reviewer);
        fs::write(
            dir.path().join("reviewer.json"),
            serde_json::to_string_pretty(&contract).unwrap(),
        )
        .unwrap();

        let loaded = load_contract(dir.path(), "reviewer").unwrap();
        assert_eq!(loaded, contract);
        assert_eq!(loaded.budget_profile(), Some("compact"));
        assert_eq!(loaded.version(), Some("1.0.0"));

        assert!(matches!(
            load_contract(dir.path(), "worker"),
            Err(ContractError::NotFound { .. })
        ));
        assert!(matches!(
            load_contract(dir.path(), "janitor"),
            Err(ContractError::UnknownArchetype(_))
        ));
        assert!(ContractSet::load_dir(dir.path()).is_err());
    }

    #[test]
    fn builtin_dispositions() {
        let set = ContractSet::builtin();
        let worker = set.get("worker").unwrap();
        assert_eq!(worker.disposition(Slot::EntityData), Disposition::Required);
        assert_eq!(worker.disposition(Slot::FewShotExamples), Disposition::Optional);
        assert_eq!(worker.disposition(Slot::CrossAgentContext), Disposition::Excluded);

        let orchestrator = set.get("orchestrator").unwrap();
        assert_eq!(orchestrator.disposition(Slot::UserContext), Disposition::Required);
        assert_eq!(orchestrator.disposition(Slot::EntityData), Disposition::Unlisted);
        assert_eq!(orchestrator.required_sources()[0].fields.len(), 5);
    }
}
