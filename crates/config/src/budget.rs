//! Token budget configuration: base slot allocations, named profiles, and
//! the overflow strategy used when a package does not fit.

use std::collections::BTreeMap;

use ctxengine_core::Slot;
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// How readily a slot gives up its tokens. Ordered from most to least
/// protected; the fallback trim pass removes the highest ordinal first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Fixed,
    High,
    Medium,
    Low,
    Adaptive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotAllocation {
    pub max: usize,
    pub priority: Priority,
}

/// Partial allocation applied on top of the base table by a profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
}

/// One step of the overflow strategy. Each step empties one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowAction {
    CompressConversationHistory,
    ReduceFewShotExamples,
    PruneLowestKbChunks,
    TrimCrossAgentReasoning,
}

impl OverflowAction {
    pub fn target_slot(&self) -> Slot {
        match self {
            Self::CompressConversationHistory => Slot::ConversationHistory,
            Self::ReduceFewShotExamples => Slot::FewShotExamples,
            Self::PruneLowestKbChunks => Slot::KnowledgeChunks,
            Self::TrimCrossAgentReasoning => Slot::CrossAgentContext,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CompressConversationHistory => "compress_conversation_history",
            Self::ReduceFewShotExamples => "reduce_few_shot_examples",
            Self::PruneLowestKbChunks => "prune_lowest_kb_chunks",
            Self::TrimCrossAgentReasoning => "trim_cross_agent_reasoning",
        }
    }
}

/// Tokens reserved for the model's reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseHeadroom {
    pub min: usize,
    pub max: usize,
}

impl Default for ResponseHeadroom {
    fn default() -> Self {
        Self {
            min: 10_000,
            max: 20_000,
        }
    }
}

/// A named profile as written in config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub max_tokens: usize,

    #[serde(default = "default_budget_pct")]
    pub total_budget_pct: f64,

    /// Replaces the global overflow strategy for this profile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overflow_strategy: Option<Vec<OverflowAction>>,

    /// Keep FIXED-priority slots out of the fallback trim pass.
    #[serde(default = "default_true")]
    pub protect_fixed: bool,

    /// Per-slot adjustments to the base allocation table.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub overrides: BTreeMap<Slot, SlotOverride>,
}

fn default_budget_pct() -> f64 {
    1.0
}
fn default_true() -> bool {
    true
}

/// A fully resolved profile: base table merged with overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetProfile {
    pub name: String,
    pub max_tokens: usize,
    pub total_budget_pct: f64,
    pub allocations: BTreeMap<Slot, SlotAllocation>,
    pub overflow_strategy: Vec<OverflowAction>,
    pub never_compress: Vec<Slot>,
    pub response_headroom: ResponseHeadroom,
    pub protect_fixed: bool,
}

impl BudgetProfile {
    /// The total the package must fit in: `max_tokens` minus the minimum
    /// response headroom.
    pub fn limit(&self) -> usize {
        self.max_tokens.saturating_sub(self.response_headroom.min)
    }

    pub fn allocation(&self, slot: Slot) -> Option<&SlotAllocation> {
        self.allocations.get(&slot)
    }

    /// Slots the fallback trim pass must leave alone.
    pub fn is_protected(&self, slot: Slot) -> bool {
        self.never_compress.contains(&slot)
            || (self.protect_fixed
                && self
                    .allocation(slot)
                    .is_some_and(|a| a.priority == Priority::Fixed))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetConfig {
    #[serde(default = "default_overflow_strategy")]
    pub overflow_strategy: Vec<OverflowAction>,

    #[serde(default = "default_never_compress")]
    pub never_compress: Vec<Slot>,

    #[serde(default)]
    pub response_headroom: ResponseHeadroom,

    #[serde(default = "default_slots")]
    pub slots: BTreeMap<Slot, SlotAllocation>,

    #[serde(default = "default_profiles")]
    pub profiles: BTreeMap<String, ProfileConfig>,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            response_headroom: ResponseHeadroom::default(),
            overflow_strategy: default_overflow_strategy(),
            never_compress: default_never_compress(),
            slots: default_slots(),
            profiles: default_profiles(),
        }
    }
}

impl BudgetConfig {
    /// Resolve a named profile against the base allocation table.
    pub fn profile(&self, name: &str) -> Result<BudgetProfile, ConfigError> {
        let profile = self.profiles.get(name).ok_or_else(|| {
            ConfigError::ValidationError(format!(
                "unknown budget profile '{name}' (known: {})",
                self.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
            ))
        })?;

        let mut allocations = self.slots.clone();
        for (slot, over) in &profile.overrides {
            let base = allocations.get(slot).copied();
            let priority = over
                .priority
                .or(base.map(|a| a.priority))
                .unwrap_or(Priority::Low);
            let max = over.max.or(base.map(|a| a.max)).unwrap_or(0);
            allocations.insert(*slot, SlotAllocation { max, priority });
        }

        Ok(BudgetProfile {
            name: name.to_string(),
            max_tokens: profile.max_tokens,
            total_budget_pct: profile.total_budget_pct,
            allocations,
            overflow_strategy: profile
                .overflow_strategy
                .clone()
                .unwrap_or_else(|| self.overflow_strategy.clone()),
            never_compress: self.never_compress.clone(),
            response_headroom: self.response_headroom,
            protect_fixed: profile.protect_fixed,
        })
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.response_headroom.min > self.response_headroom.max {
            return Err(ConfigError::ValidationError(
                "budget.response_headroom.min must not exceed max".into(),
            ));
        }
        for (name, profile) in &self.profiles {
            if profile.max_tokens <= self.response_headroom.min {
                return Err(ConfigError::ValidationError(format!(
                    "budget profile '{name}': max_tokens {} leaves no room after {} tokens of response headroom",
                    profile.max_tokens, self.response_headroom.min
                )));
            }
            if !(profile.total_budget_pct > 0.0 && profile.total_budget_pct <= 1.0) {
                return Err(ConfigError::ValidationError(format!(
                    "budget profile '{name}': total_budget_pct must be in (0, 1]"
                )));
            }
        }
        Ok(())
    }
}

fn default_overflow_strategy() -> Vec<OverflowAction> {
    vec![
        OverflowAction::CompressConversationHistory,
        OverflowAction::ReduceFewShotExamples,
        OverflowAction::PruneLowestKbChunks,
        OverflowAction::TrimCrossAgentReasoning,
    ]
}

fn default_never_compress() -> Vec<Slot> {
    vec![Slot::SystemPromptContext, Slot::EntityData]
}

fn default_slots() -> BTreeMap<Slot, SlotAllocation> {
    let table = [
        (Slot::SystemPromptContext, 5_000, Priority::Fixed),
        (Slot::EntityData, 20_000, Priority::High),
        (Slot::KnowledgeChunks, 30_000, Priority::Medium),
        (Slot::CrossAgentContext, 15_000, Priority::Medium),
        (Slot::FewShotExamples, 10_000, Priority::Low),
        (Slot::ConversationHistory, 20_000, Priority::Adaptive),
        (Slot::ToolSchemas, 10_000, Priority::High),
        (Slot::UserContext, 2_000, Priority::Fixed),
    ];
    table
        .into_iter()
        .map(|(slot, max, priority)| (slot, SlotAllocation { max, priority }))
        .collect()
}

fn default_profiles() -> BTreeMap<String, ProfileConfig> {
    let mut profiles = BTreeMap::new();
    profiles.insert(
        "lightweight".to_string(),
        ProfileConfig {
            max_tokens: 51_200,
            total_budget_pct: 0.40,
            overrides: BTreeMap::from([(
                Slot::EntityData,
                SlotOverride {
                    max: Some(10_000),
                    priority: None,
                },
            )]),
            overflow_strategy: None,
            protect_fixed: true,
        },
    );
    profiles.insert(
        "standard".to_string(),
        ProfileConfig {
            max_tokens: 128_000,
            total_budget_pct: 1.0,
            overrides: BTreeMap::new(),
            overflow_strategy: None,
            protect_fixed: true,
        },
    );
    profiles.insert(
        "compact".to_string(),
        ProfileConfig {
            max_tokens: 64_000,
            total_budget_pct: 0.50,
            overrides: BTreeMap::from([(
                Slot::ConversationHistory,
                SlotOverride {
                    max: Some(3_000),
                    priority: None,
                },
            )]),
            overflow_strategy: None,
            protect_fixed: true,
        },
    );
    profiles
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lightweight_profile_overrides_entity_data() {
        let profile = BudgetConfig::default().profile("lightweight").unwrap();
        assert_eq!(profile.max_tokens, 51_200);
        assert_eq!(profile.allocation(Slot::EntityData).unwrap().max, 10_000);
        assert_eq!(profile.allocation(Slot::EntityData).unwrap().priority, Priority::High);
        assert_eq!(profile.allocation(Slot::KnowledgeChunks).unwrap().max, 30_000);
        assert_eq!(profile.limit(), 41_200);
    }

    #[test]
    fn compact_profile_caps_history() {
        let profile = BudgetConfig::default().profile("compact").unwrap();
        assert_eq!(profile.allocation(Slot::ConversationHistory).unwrap().max, 3_000);
        assert_eq!(profile.overflow_strategy.len(), 4);
    }

    #[test]
    fn unknown_profile_is_an_error() {
        let err = BudgetConfig::default().profile("huge").unwrap_err();
        assert!(err.to_string().contains("huge"));
    }

    #[test]
    fn protection_follows_never_compress_and_fixed_flag() {
        let mut profile = BudgetConfig::default().profile("standard").unwrap();
        assert!(profile.is_protected(Slot::EntityData));
        assert!(profile.is_protected(Slot::UserContext));
        assert!(!profile.is_protected(Slot::FewShotExamples));

        profile.protect_fixed = false;
        assert!(!profile.is_protected(Slot::UserContext));
        assert!(profile.is_protected(Slot::SystemPromptContext));
    }

    #[test]
    fn priorities_order_from_fixed_to_adaptive() {
        assert!(Priority::Fixed < Priority::High);
        assert!(Priority::Low < Priority::Adaptive);
    }

    #[test]
    fn profile_rejects_headroom_larger_than_budget() {
        let mut config = BudgetConfig::default();
        config.profiles.insert(
            "tiny".into(),
            ProfileConfig {
                max_tokens: 5_000,
                total_budget_pct: 1.0,
                overrides: BTreeMap::new(),
                overflow_strategy: None,
                protect_fixed: true,
            },
        );
        assert!(config.validate().is_err());
    }
}
