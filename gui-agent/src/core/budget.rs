//! Bounded failure counters for loading waits, rematches and re-decisions.

use serde::Serialize;

/// A counter with a fixed cap. Reaching the cap means the caller must stop retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetryBudget {
    count: u32,
    limit: u32,
}

impl RetryBudget {
    pub fn new(limit: u32) -> Self {
        Self { count: 0, limit }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Record one more failure and report whether the cap is now reached.
    pub fn bump(&mut self) -> bool {
        self.count = self.count.saturating_add(1);
        self.exhausted()
    }

    pub fn exhausted(&self) -> bool {
        self.count >= self.limit
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }
}

/// The three budgets a session carries across ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionBudgets {
    /// Consecutive loading waits.
    pub loading: RetryBudget,
    /// Widget rematches since the last valid effect.
    pub matching: RetryBudget,
    /// Re-decisions since the last valid effect.
    pub deciding: RetryBudget,
}

impl SessionBudgets {
    pub fn new(loading: u32, matching: u32, deciding: u32) -> Self {
        Self {
            loading: RetryBudget::new(loading),
            matching: RetryBudget::new(matching),
            deciding: RetryBudget::new(deciding),
        }
    }

    /// Forget correction failures once an action finally took effect.
    pub fn reset_corrections(&mut self) {
        self.matching.reset();
        self.deciding.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_reports_exhaustion_at_limit() {
        let mut budget = RetryBudget::new(3);
        assert!(!budget.bump());
        assert!(!budget.bump());
        assert!(budget.bump());
        assert_eq!(budget.count(), 3);
        budget.reset();
        assert_eq!(budget.count(), 0);
        assert!(!budget.exhausted());
    }

    #[test]
    fn reset_corrections_leaves_loading_alone() {
        let mut budgets = SessionBudgets::new(3, 3, 3);
        budgets.loading.bump();
        budgets.matching.bump();
        budgets.deciding.bump();
        budgets.reset_corrections();
        assert_eq!(budgets.loading.count(), 1);
        assert_eq!(budgets.matching.count(), 0);
        assert_eq!(budgets.deciding.count(), 0);
    }
}
