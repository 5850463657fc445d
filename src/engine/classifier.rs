use crate::api::ApiError;
use crate::engine::error::EngineError;
use crate::engine::error_window::{Budget, ErrorWindow};

/// What the poller must do with one failed fetch.
#[derive(Debug)]
pub enum Disposition {
    /// Ride it out: schedule another poll after the normal delay and show
    /// nothing to the operator.
    Retry,
    /// Surface the error, stop polling, mark the enclosing step failed.
    Fatal(EngineError),
}

/// Classifies one poll error. Only transient transport conditions (504 or a
/// connection-level failure with no response) are retried, and only while
/// the error window's wall-clock budget holds. Everything else fails fast.
pub fn classify_poll_error(
    err: ApiError,
    window: &mut ErrorWindow,
    now_ms: i64,
    budget_ms: u64,
) -> Disposition {
    match err {
        ApiError::TransientTransport { detail } => match window.record(now_ms, budget_ms) {
            Budget::Within => Disposition::Retry,
            Budget::Exceeded => Disposition::Fatal(EngineError::TransientBudgetExceeded {
                budget_ms,
                detail,
            }),
        },
        other => Disposition::Fatal(other.into()),
    }
}
