/// Outcome of charging one transient error against the retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Budget {
    Within,
    Exceeded,
}

/// Transient-failure bookkeeping for one polling cycle. The window is reset
/// whenever a fresh task submission starts a cycle, armed on the first
/// transient error, and cleared again by any successful poll. Escalation is
/// wall-clock based: a fast burst of failures and a slow trickle both get
/// exactly the same budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ErrorWindow {
    first_error_at_ms: Option<i64>,
}

impl ErrorWindow {
    pub fn clear(&mut self) {
        self.first_error_at_ms = None;
    }

    pub fn first_error_at_ms(&self) -> Option<i64> {
        self.first_error_at_ms
    }

    /// Records one transient error observed at `now_ms`.
    pub fn record(&mut self, now_ms: i64, budget_ms: u64) -> Budget {
        let first = *self.first_error_at_ms.get_or_insert(now_ms);
        let elapsed = now_ms.saturating_sub(first);
        if elapsed <= budget_ms as i64 {
            Budget::Within
        } else {
            Budget::Exceeded
        }
    }
}
