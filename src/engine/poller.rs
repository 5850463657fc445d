use crate::api::ClusterApi;
use crate::engine::classifier::{classify_poll_error, Disposition};
use crate::engine::error::EngineError;
use crate::engine::error_window::ErrorWindow;
use crate::engine::task::TaskSnapshot;
use crate::shared::ids::DeploymentName;
use crate::shared::time::now_ms;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1_000);
pub const DEFAULT_TRANSIENT_BUDGET_MS: u64 = 60_000;

/// Which of the two server-side workflows a polling cycle observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Precheck,
    Install,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskKind::Precheck => write!(f, "precheck"),
            TaskKind::Install => write!(f, "install"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub transient_budget_ms: u64,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            transient_budget_ms: DEFAULT_TRANSIENT_BUDGET_MS,
        }
    }
}

/// How one polling cycle ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The task reached a terminal, non-error status.
    Completed(TaskSnapshot),
    /// The fetch succeeded but the task itself reports `FAILED`; the message
    /// comes from the payload, not from transport-level error text.
    ReportedFailure { message: String },
    /// The liveness flag flipped before the task finished.
    Canceled,
}

pub trait Clock {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        now_ms()
    }
}

/// Sleeps `total` in short slices so a flipped stop flag is honored
/// promptly. Returns false when the flag flipped during the wait.
pub fn sleep_with_stop(stop: &AtomicBool, total: Duration) -> bool {
    let mut remaining = total;
    while remaining > Duration::ZERO {
        if stop.load(Ordering::Relaxed) {
            return false;
        }
        let slice = remaining.min(Duration::from_millis(50));
        thread::sleep(slice);
        remaining = remaining.saturating_sub(slice);
    }
    !stop.load(Ordering::Relaxed)
}

/// Drives one polling cycle to a terminal outcome.
///
/// The loop is strictly sequential: the next fetch is issued only after the
/// previous one has completed and its snapshot has been handed to the
/// observer, so at most one request is ever in flight for the task and
/// snapshots are observed in wall-clock order. The stop flag is checked
/// before every fetch and inside every sleep; it is the sole cancellation
/// mechanism.
pub fn poll_task(
    api: &dyn ClusterApi,
    kind: TaskKind,
    name: &DeploymentName,
    settings: &PollSettings,
    stop: &AtomicBool,
    clock: &dyn Clock,
    observer: &mut dyn FnMut(&TaskSnapshot),
) -> Result<PollOutcome, EngineError> {
    let mut window = ErrorWindow::default();
    loop {
        if stop.load(Ordering::Relaxed) {
            return Ok(PollOutcome::Canceled);
        }

        let fetched = match kind {
            TaskKind::Precheck => api.precheck_status(name),
            TaskKind::Install => api.install_status(name),
        };

        match fetched {
            Ok(snapshot) => {
                window.clear();
                if snapshot.status.is_failed() {
                    let message = snapshot
                        .message
                        .filter(|m| !m.trim().is_empty())
                        .unwrap_or_else(|| format!("{kind} task reported failure"));
                    return Ok(PollOutcome::ReportedFailure { message });
                }
                observer(&snapshot);
                if snapshot.status.is_terminal() {
                    return Ok(PollOutcome::Completed(snapshot));
                }
            }
            Err(err) => {
                match classify_poll_error(
                    err,
                    &mut window,
                    clock.now_ms(),
                    settings.transient_budget_ms,
                ) {
                    Disposition::Retry => {}
                    Disposition::Fatal(fatal) => return Err(fatal),
                }
            }
        }

        if !sleep_with_stop(stop, settings.interval) {
            return Ok(PollOutcome::Canceled);
        }
    }
}
