//! Data classification lookup and role-based entitlement checks.

use std::collections::BTreeMap;

use ctxengine_config::{ClassificationLevel, EngineConfig};
use ctxengine_core::DataClassification;

/// Role hierarchy and classification taxonomy, read once from config.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    roles: BTreeMap<String, u8>,
    levels: Vec<ClassificationLevel>,
}

impl AccessPolicy {
    pub fn new(config: &EngineConfig) -> Self {
        Self::from_parts(config.trust.roles.clone(), config.classification.clone())
    }

    pub fn from_parts(roles: BTreeMap<String, u8>, levels: Vec<ClassificationLevel>) -> Self {
        Self { roles, levels }
    }

    pub fn role_rank(&self, role: &str) -> Option<u8> {
        self.roles.get(role).copied()
    }

    /// Map a data type name (a level name or one of its configured examples)
    /// to a classification. Unknown or missing types are INTERNAL.
    pub fn classify_data_level(&self, data_type: Option<&str>) -> DataClassification {
        let Some(data_type) = data_type.filter(|s| !s.is_empty()) else {
            return DataClassification::Internal;
        };

        self.levels
            .iter()
            .find(|level| {
                level.level.as_str().eq_ignore_ascii_case(data_type)
                    || level
                        .examples
                        .iter()
                        .any(|example| example.eq_ignore_ascii_case(data_type))
            })
            .map(|level| level.level)
            .unwrap_or(DataClassification::Internal)
    }

    /// Whether `role` may see data at `classification`. Unknown roles see
    /// nothing, not even PUBLIC data; a level with no configured minimum
    /// role is closed to everyone.
    pub fn can_user_access(&self, role: &str, classification: DataClassification) -> bool {
        let Some(rank) = self.role_rank(role) else {
            return false;
        };
        self.levels
            .iter()
            .find(|level| level.level == classification)
            .and_then(|level| self.role_rank(&level.min_role_required))
            .is_some_and(|required| rank >= required)
    }
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_types_map_to_levels() {
        let policy = AccessPolicy::default();
        assert_eq!(policy.classify_data_level(Some("press_release")), DataClassification::Public);
        assert_eq!(policy.classify_data_level(Some("NPA_Project")), DataClassification::Confidential);
        assert_eq!(policy.classify_data_level(Some("customer_pii")), DataClassification::Restricted);
        assert_eq!(policy.classify_data_level(Some("restricted")), DataClassification::Restricted);
    }

    #[test]
    fn unknown_data_type_is_internal() {
        let policy = AccessPolicy::default();
        assert_eq!(policy.classify_data_level(Some("napkin_sketch")), DataClassification::Internal);
        assert_eq!(policy.classify_data_level(None), DataClassification::Internal);
    }

    #[test]
    fn roles_climb_the_hierarchy() {
        let policy = AccessPolicy::default();
        assert!(policy.can_user_access("any", DataClassification::Public));
        assert!(!policy.can_user_access("any", DataClassification::Internal));
        assert!(policy.can_user_access("employee", DataClassification::Internal));
        assert!(!policy.can_user_access("employee", DataClassification::Confidential));
        assert!(policy.can_user_access("analyst", DataClassification::Confidential));
        assert!(!policy.can_user_access("analyst", DataClassification::Restricted));
        assert!(policy.can_user_access("checker", DataClassification::Restricted));
        assert!(policy.can_user_access("admin", DataClassification::Restricted));
    }

    #[test]
    fn unknown_role_is_denied_everything() {
        let policy = AccessPolicy::default();
        assert!(!policy.can_user_access("intern", DataClassification::Public));
    }
}
