//! Context slots and the assembled context package.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named section of an assembled context package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    SystemPromptContext,
    EntityData,
    KnowledgeChunks,
    CrossAgentContext,
    FewShotExamples,
    ConversationHistory,
    ToolSchemas,
    UserContext,
}

impl Slot {
    pub const ALL: [Slot; 8] = [
        Slot::SystemPromptContext,
        Slot::EntityData,
        Slot::KnowledgeChunks,
        Slot::CrossAgentContext,
        Slot::FewShotExamples,
        Slot::ConversationHistory,
        Slot::ToolSchemas,
        Slot::UserContext,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SystemPromptContext => "system_prompt_context",
            Self::EntityData => "entity_data",
            Self::KnowledgeChunks => "knowledge_chunks",
            Self::CrossAgentContext => "cross_agent_context",
            Self::FewShotExamples => "few_shot_examples",
            Self::ConversationHistory => "conversation_history",
            Self::ToolSchemas => "tool_schemas",
            Self::UserContext => "user_context",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Slot {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|slot| slot.as_str() == s)
            .ok_or_else(|| format!("unknown slot: {s}"))
    }
}

/// What a slot holds: plain text, or structured JSON (lists of items,
/// user context objects, tool schemas).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SlotContent {
    Text(String),
    Structured(Value),
}

impl SlotContent {
    /// Build structured content from anything serializable.
    pub fn structured<T: Serialize>(value: &T) -> serde_json::Result<Self> {
        serde_json::to_value(value).map(Self::Structured)
    }

    /// True for JSON null. An empty string is present-but-empty, not null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Structured(Value::Null))
    }

    /// True when the slot carries nothing: "", null, `[]` or `{}`.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.is_empty(),
            Self::Structured(Value::Null) => true,
            Self::Structured(Value::Array(items)) => items.is_empty(),
            Self::Structured(Value::Object(map)) => map.is_empty(),
            Self::Structured(Value::String(s)) => s.is_empty(),
            Self::Structured(_) => false,
        }
    }

    /// The cleared form of this content: text becomes "", structured
    /// content becomes null.
    pub fn cleared(&self) -> SlotContent {
        match self {
            Self::Text(_) => Self::Text(String::new()),
            Self::Structured(_) => Self::Structured(Value::Null),
        }
    }

    /// Structured list items, if this is a JSON array.
    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Self::Structured(Value::Array(items)) => Some(items),
            _ => None,
        }
    }
}

impl From<String> for SlotContent {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for SlotContent {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Value> for SlotContent {
    fn from(value: Value) -> Self {
        Self::Structured(value)
    }
}

/// The named-slot mapping handed to an agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextPackage {
    slots: BTreeMap<Slot, SlotContent>,
}

impl ContextPackage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, slot: Slot, content: impl Into<SlotContent>) -> Self {
        self.insert(slot, content);
        self
    }

    pub fn insert(&mut self, slot: Slot, content: impl Into<SlotContent>) -> Option<SlotContent> {
        self.slots.insert(slot, content.into())
    }

    pub fn get(&self, slot: Slot) -> Option<&SlotContent> {
        self.slots.get(&slot)
    }

    pub fn remove(&mut self, slot: Slot) -> Option<SlotContent> {
        self.slots.remove(&slot)
    }

    pub fn contains(&self, slot: Slot) -> bool {
        self.slots.contains_key(&slot)
    }

    /// Replace a slot's content with its cleared form. Returns false when
    /// the slot was absent or already empty.
    pub fn clear_slot(&mut self, slot: Slot) -> bool {
        match self.slots.get_mut(&slot) {
            Some(content) if !content.is_empty() => {
                *content = content.cleared();
                true
            }
            _ => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Slot, &SlotContent)> {
        self.slots.iter().map(|(slot, content)| (*slot, content))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
