use crate::api::ApiError;
use crate::engine::workflow::Phase;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("transient transport failures exceeded the {budget_ms}ms retry budget: {detail}")]
    TransientBudgetExceeded { budget_ms: u64, detail: String },
    #[error("transport failure: {detail}")]
    Transport { detail: String },
    #[error("request failed with status {status}: {message}")]
    Request { status: u16, message: String },
    #[error("failed to decode server response: {detail}")]
    Decode { detail: String },
    #[error("task `{name}` reported failure: {message}")]
    TaskReportedFailure { name: String, message: String },
    #[error("install is unavailable until every precheck item passes")]
    InstallGated,
    #[error("auto repair requires a finished precheck run with recoverable failures")]
    RepairUnavailable,
    #[error("recheck is only available after a failed precheck")]
    RecheckUnavailable,
    #[error("workflow was canceled")]
    Canceled,
    #[error("invalid phase transition from {from} to {to}")]
    Transition { from: Phase, to: Phase },
}

impl From<ApiError> for EngineError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::TransientTransport { detail } => EngineError::Transport { detail },
            ApiError::RequestFailure { status, message } => {
                EngineError::Request { status, message }
            }
            ApiError::Decode { detail } => EngineError::Decode { detail },
        }
    }
}

impl EngineError {
    /// True for errors the operator can act on only by rechecking or
    /// abandoning the workflow, as opposed to gating misuse of a command.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            EngineError::InstallGated
                | EngineError::RepairUnavailable
                | EngineError::RecheckUnavailable
                | EngineError::Canceled
        )
    }
}
