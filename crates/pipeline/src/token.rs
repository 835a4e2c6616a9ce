//! Token estimation.
//!
//! The default counter uses a character heuristic: ~4 characters per
//! token, rounded up. Structured slot content is counted on its compact
//! JSON serialization.

use std::fmt;

use ctxengine_core::SlotContent;
use serde_json::Value;

/// Measures the token cost of text.
pub trait TokenCounter: Send + Sync + fmt::Debug {
    fn count(&self, text: &str) -> usize;

    /// Cost of a slot's content. Null costs nothing.
    fn count_content(&self, content: &SlotContent) -> usize {
        match content {
            SlotContent::Text(text) => self.count(text),
            SlotContent::Structured(Value::Null) => 0,
            SlotContent::Structured(value) => {
                let json = serde_json::to_string(value).unwrap_or_default();
                self.count(&json)
            }
        }
    }
}

/// 1 token ≈ 4 characters (bytes of UTF-8).
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicCounter;

impl TokenCounter for HeuristicCounter {
    fn count(&self, text: &str) -> usize {
        estimate_tokens(text)
    }
}

/// One token per whitespace-separated word.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceCounter;

impl TokenCounter for WhitespaceCounter {
    fn count(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}

/// Estimate the token count for a string. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Cut `text` so the heuristic counter puts it at no more than
/// `max_tokens`. Never splits a character.
pub fn truncate_to_tokens(text: &str, max_tokens: usize) -> &str {
    let max_bytes = max_tokens.saturating_mul(4);
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::allocate_budget;
    use ctxengine_config::BudgetConfig;
    use ctxengine_core::{ContextPackage, Slot};
    use serde_json::json;

    fn npa_package() -> ContextPackage {
        ContextPackage::new()
            .with(Slot::SystemPromptContext, "You are the NPA worker.")
            .with(Slot::EntityData, json!([{"id": "NPA-1", "note": "two words"}]))
            .with(Slot::KnowledgeChunks, Value::Null)
    }

    #[test]
    fn budget_counts_structured_slots_on_their_json() {
        let profile = BudgetConfig::default().profile("standard").unwrap();
        let report = allocate_budget(&npa_package(), &profile, &HeuristicCounter);

        // [{"id":"NPA-1","note":"two words"}] is 35 bytes
        assert_eq!(report.allocations[&Slot::EntityData].tokens, 9);
        // "You are the NPA worker." is 23 bytes
        assert_eq!(report.allocations[&Slot::SystemPromptContext].tokens, 6);
        assert_eq!(report.allocations[&Slot::KnowledgeChunks].tokens, 0);
        assert_eq!(report.total, 15);
    }

    #[test]
    fn budget_follows_the_chosen_counter() {
        let profile = BudgetConfig::default().profile("standard").unwrap();
        let report = allocate_budget(&npa_package(), &profile, &WhitespaceCounter);

        // the JSON splits once, inside "two words"
        assert_eq!(report.allocations[&Slot::EntityData].tokens, 2);
        assert_eq!(report.allocations[&Slot::SystemPromptContext].tokens, 5);
        assert_eq!(report.allocations[&Slot::KnowledgeChunks].tokens, 0);
        assert_eq!(report.total, 7);
    }

    #[test]
    fn empty_structured_content_still_costs_its_brackets() {
        let profile = BudgetConfig::default().profile("standard").unwrap();
        let package = ContextPackage::new()
            .with(Slot::EntityData, json!([]))
            .with(Slot::UserContext, json!({}));
        let report = allocate_budget(&package, &profile, &HeuristicCounter);
        assert_eq!(report.allocations[&Slot::EntityData].tokens, 1);
        assert_eq!(report.allocations[&Slot::UserContext].tokens, 1);
        assert_eq!(report.remaining, report.limit as i64 - 2);
    }

    #[test]
    fn whitespace_counter_counts_words() {
        assert_eq!(WhitespaceCounter.count("  one two\tthree\n"), 3);
        assert_eq!(WhitespaceCounter.count(""), 0);
    }

    #[test]
    fn structured_content_counts_its_json() {
        let content = SlotContent::Structured(json!({"id": "NPA-1"}));
        // {"id":"NPA-1"} is 14 characters
        assert_eq!(HeuristicCounter.count_content(&content), 4);
        assert_eq!(HeuristicCounter.count_content(&SlotContent::Structured(Value::Null)), 0);
        assert_eq!(HeuristicCounter.count_content(&SlotContent::Text("test".into())), 1);
    }

    #[test]
    fn truncation_respects_the_limit() {
        let text = "a".repeat(50);
        let cut = truncate_to_tokens(&text, 10);
        assert_eq!(cut.len(), 40);
        assert!(estimate_tokens(cut) <= 10);
        assert_eq!(truncate_to_tokens("short", 10), "short");
        assert_eq!(truncate_to_tokens("anything", 0), "");
    }

    #[test]
    fn truncation_keeps_characters_whole() {
        // 'é' is two bytes; a 4-byte cut lands mid-character
        let text = "aaaé!";
        assert_eq!(truncate_to_tokens(text, 1), "aaa");
    }
}
