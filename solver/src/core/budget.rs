//! Integer retry budgets.

/// Counts down a fixed number of attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    limit: u32,
    used: u32,
}

impl RetryBudget {
    pub fn new(limit: u32) -> Self {
        Self { limit, used: 0 }
    }

    /// Spend one attempt. Returns `false` once the budget is exhausted.
    pub fn try_consume(&mut self) -> bool {
        if self.used >= self.limit {
            return false;
        }
        self.used += 1;
        true
    }

    pub fn remaining(&self) -> u32 {
        self.limit - self.used
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn is_exhausted(&self) -> bool {
        self.used >= self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consumes_up_to_limit() {
        let mut budget = RetryBudget::new(2);
        assert!(budget.try_consume());
        assert_eq!(budget.remaining(), 1);
        assert!(budget.try_consume());
        assert!(!budget.try_consume());
        assert!(budget.is_exhausted());
        assert_eq!(budget.used(), 2);
    }

    #[test]
    fn zero_budget_is_exhausted_immediately() {
        let mut budget = RetryBudget::new(0);
        assert!(budget.is_exhausted());
        assert!(!budget.try_consume());
    }
}
