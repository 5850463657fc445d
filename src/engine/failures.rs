use crate::engine::task::CheckItem;
use serde::{Deserialize, Serialize};

/// Classification of the latest snapshot's failed items. Fully derived: a
/// later snapshot's report replaces the former, nothing accumulates across
/// polls. Every failed item lands in exactly one of the two buckets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    pub failed_items: Vec<CheckItem>,
    pub has_auto_recoverable: bool,
    pub has_manual_only: bool,
}

impl FailureReport {
    pub fn from_items(items: &[CheckItem]) -> Self {
        let failed_items: Vec<CheckItem> = items
            .iter()
            .filter(|item| item.is_failed())
            .cloned()
            .collect();
        let has_auto_recoverable = failed_items.iter().any(|item| item.recoverable);
        let has_manual_only = failed_items.iter().any(|item| !item.recoverable);
        Self {
            failed_items,
            has_auto_recoverable,
            has_manual_only,
        }
    }

    pub fn auto_recoverable_count(&self) -> usize {
        self.failed_items
            .iter()
            .filter(|item| item.recoverable)
            .count()
    }

    pub fn manual_only_count(&self) -> usize {
        self.failed_items
            .iter()
            .filter(|item| !item.recoverable)
            .count()
    }

    /// Operator-facing view with an optional "show manual-only" toggle.
    pub fn visible(&self, only_manual: bool) -> Vec<&CheckItem> {
        self.failed_items
            .iter()
            .filter(|item| !only_manual || !item.recoverable)
            .collect()
    }
}
