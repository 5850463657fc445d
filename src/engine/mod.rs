pub mod classifier;
pub mod error;
pub mod error_window;
pub mod failures;
pub mod poller;
pub mod progress;
pub mod recovery;
pub mod task;
pub mod workflow;

pub use classifier::{classify_poll_error, Disposition};
pub use error::EngineError;
pub use error_window::{Budget, ErrorWindow};
pub use failures::FailureReport;
pub use poller::{poll_task, Clock, PollOutcome, PollSettings, SystemClock, TaskKind};
pub use progress::ProgressAnimator;
pub use recovery::{auto_repair, merge_retained_secrets, RepairOutcome};
pub use task::{CheckItem, ItemResult, ItemStatus, RecoverAction, TaskSnapshot, TaskStatus};
pub use workflow::{
    load_step_view, persist_step_view, DeployDriver, DriverSettings, Phase, StepView,
};
