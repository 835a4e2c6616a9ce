//! Budget allocation and overflow trimming.
//!
//! A package fits when the sum of its slots' token costs is no more than
//! the profile limit (`max_tokens` minus the minimum response headroom).
//! Per-slot maximums are reported but do not on their own make a package
//! overflow.

use std::collections::BTreeMap;

use ctxengine_config::{BudgetConfig, BudgetProfile, ConfigError, Priority};
use ctxengine_core::{ContextPackage, Slot};
use serde::Serialize;
use tracing::{debug, info};

use crate::token::TokenCounter;

/// Priority assumed for a slot with no allocation in the profile.
const UNLISTED_PRIORITY: Priority = Priority::Medium;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotUsage {
    pub tokens: usize,
    pub max: usize,
    pub priority: Priority,
    pub over: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BudgetReport {
    pub profile: String,
    pub allocations: BTreeMap<Slot, SlotUsage>,
    pub total: usize,
    pub limit: usize,
    /// Negative when over budget.
    pub remaining: i64,
    pub within_budget: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BudgetCheck {
    pub within_budget: bool,
    pub total_tokens: usize,
    pub limit: usize,
    /// Slots over their own maximum.
    pub overflow_slots: Vec<Slot>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrimOutcome {
    pub package: ContextPackage,
    /// Slots emptied, in the order they were emptied.
    pub removed_slots: Vec<Slot>,
    pub final_tokens: usize,
}

/// Resolve a named profile: base allocations merged with its overrides.
pub fn budget_limits(config: &BudgetConfig, profile: &str) -> Result<BudgetProfile, ConfigError> {
    config.profile(profile)
}

/// Measure every slot of `package` against `profile`.
pub fn allocate_budget(
    package: &ContextPackage,
    profile: &BudgetProfile,
    counter: &dyn TokenCounter,
) -> BudgetReport {
    let limit = profile.limit();
    let mut allocations = BTreeMap::new();
    let mut total = 0usize;

    for (slot, content) in package.iter() {
        let tokens = counter.count_content(content);
        let (max, priority) = profile
            .allocation(slot)
            .map_or((limit, UNLISTED_PRIORITY), |a| (a.max, a.priority));
        allocations.insert(
            slot,
            SlotUsage {
                tokens,
                max,
                priority,
                over: tokens.saturating_sub(max),
            },
        );
        total += tokens;
    }

    BudgetReport {
        profile: profile.name.clone(),
        allocations,
        total,
        limit,
        remaining: limit as i64 - total as i64,
        within_budget: total <= limit,
    }
}

pub fn check_budget(
    package: &ContextPackage,
    profile: &BudgetProfile,
    counter: &dyn TokenCounter,
) -> BudgetCheck {
    let report = allocate_budget(package, profile, counter);
    BudgetCheck {
        within_budget: report.within_budget,
        total_tokens: report.total,
        limit: report.limit,
        overflow_slots: report
            .allocations
            .iter()
            .filter(|(_, usage)| usage.over > 0)
            .map(|(slot, _)| *slot)
            .collect(),
    }
}

/// Empty slots until the package fits.
///
/// First the profile's overflow strategy runs in order, skipping
/// `never_compress` slots. If the package still does not fit, the
/// remaining unprotected slots are emptied lowest priority first. Both
/// passes stop as soon as the package fits; a package that already fits
/// comes back untouched.
pub fn trim_to_budget(
    package: ContextPackage,
    profile: &BudgetProfile,
    counter: &dyn TokenCounter,
) -> TrimOutcome {
    let mut package = package;
    let mut removed = Vec::new();
    let mut report = allocate_budget(&package, profile, counter);

    if report.within_budget {
        return TrimOutcome {
            package,
            removed_slots: removed,
            final_tokens: report.total,
        };
    }

    for action in &profile.overflow_strategy {
        let slot = action.target_slot();
        if profile.never_compress.contains(&slot) || !package.clear_slot(slot) {
            continue;
        }
        removed.push(slot);
        report = allocate_budget(&package, profile, counter);
        debug!(slot = %slot, strategy = action.as_str(), total = report.total, "Applied overflow strategy");
        if report.within_budget {
            break;
        }
    }

    if !report.within_budget {
        let mut candidates: Vec<(Slot, Priority)> = package
            .iter()
            .filter(|(slot, content)| {
                !content.is_empty() && !profile.is_protected(*slot) && !removed.contains(slot)
            })
            .map(|(slot, _)| {
                let priority = profile
                    .allocation(slot)
                    .map_or(UNLISTED_PRIORITY, |a| a.priority);
                (slot, priority)
            })
            .collect();
        candidates.sort_by(|a, b| b.1.cmp(&a.1));

        for (slot, priority) in candidates {
            if !package.clear_slot(slot) {
                continue;
            }
            removed.push(slot);
            report = allocate_budget(&package, profile, counter);
            debug!(slot = %slot, ?priority, total = report.total, "Trimmed slot by priority");
            if report.within_budget {
                break;
            }
        }
    }

    info!(
        profile = %profile.name,
        removed = ?removed,
        final_tokens = report.total,
        limit = report.limit,
        within_budget = report.within_budget,
        "Trimmed context to budget"
    );

    TrimOutcome {
        package,
        removed_slots: removed,
        final_tokens: report.total,
    }
}
