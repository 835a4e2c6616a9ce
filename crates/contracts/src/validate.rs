//! Checking an assembled package against its archetype's contract.

use ctxengine_core::{ContextPackage, Slot};
use serde::Serialize;
use tracing::warn;

use crate::model::ArchetypeContract;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextValidation {
    pub valid: bool,
    pub missing_required: Vec<String>,
    pub unexpected_included: Vec<String>,
    pub warnings: Vec<String>,
}

/// Required slots that are absent or null make the package invalid.
/// Excluded slots that are present only produce warnings.
pub fn validate_context(package: &ContextPackage, contract: &ArchetypeContract) -> ContextValidation {
    let present = |name: &str| -> bool {
        name.parse::<Slot>()
            .ok()
            .and_then(|slot| package.get(slot))
            .is_some_and(|content| !content.is_null())
    };

    let missing_required: Vec<String> = contract
        .required_slots()
        .into_iter()
        .filter(|name| !present(name))
        .map(str::to_string)
        .collect();

    let mut unexpected_included = Vec::new();
    let mut warnings = Vec::new();
    for name in contract.excluded_context() {
        if present(name) {
            warnings.push(format!(
                "\"{name}\" is present but marked as excluded in the {} contract",
                contract.archetype
            ));
            unexpected_included.push(name.to_string());
        }
    }

    if !missing_required.is_empty() {
        warn!(
            archetype = %contract.archetype,
            missing = ?missing_required,
            "Context package is missing required slots"
        );
    }

    ContextValidation {
        valid: missing_required.is_empty(),
        missing_required,
        unexpected_included,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Archetype;
    use serde_json::json;

    fn worker() -> ArchetypeContract {
        ArchetypeContract::builtin(Archetype::Worker)
    }

    #[test]
    fn complete_package_is_valid() {
        let package = ContextPackage::new()
            .with(Slot::SystemPromptContext, "You are a worker.")
            .with(Slot::EntityData, json!([{"id": "NPA-1"}]))
            .with(Slot::KnowledgeChunks, json!([]));
        let result = validate_context(&package, &worker());
        assert!(result.valid);
        assert!(result.missing_required.is_empty());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn null_or_absent_required_slot_is_missing() {
        let package = ContextPackage::new()
            .with(Slot::SystemPromptContext, "")
            .with(Slot::EntityData, json!(null));
        let result = validate_context(&package, &worker());
        assert!(!result.valid);
        assert_eq!(result.missing_required, vec!["entity_data", "knowledge_chunks"]);
    }

    #[test]
    fn excluded_slot_warns_without_invalidating() {
        let package = ContextPackage::new()
            .with(Slot::SystemPromptContext, "sys")
            .with(Slot::EntityData, json!([]))
            .with(Slot::KnowledgeChunks, json!([]))
            .with(Slot::CrossAgentContext, json!([{"agent": "risk"}]));
        let result = validate_context(&package, &worker());
        assert!(result.valid);
        assert_eq!(result.unexpected_included, vec!["cross_agent_context"]);
        assert!(result.warnings[0].contains("worker contract"));
    }

    #[test]
    fn empty_package_misses_everything_required() {
        let result = validate_context(&ContextPackage::new(), &worker());
        assert!(!result.valid);
        assert_eq!(result.missing_required.len(), 3);
    }

    #[test]
    fn unknown_slot_names_count_as_missing() {
        let contract = ArchetypeContract::from_json(
            "orchestrator",
            r#"{"contract_id": "c", "archetype": "orchestrator", "required_context": ["intent"]}"#,
        )
        .unwrap();
        let package = ContextPackage::new().with(Slot::UserContext, json!({"role": "analyst"}));
        let result = validate_context(&package, &contract);
        assert_eq!(result.missing_required, vec!["intent"]);
    }
}
