use crate::api::ClusterApi;
use crate::engine::error::EngineError;
use crate::engine::failures::FailureReport;
use crate::engine::poller::{
    poll_task, sleep_with_stop, Clock, PollOutcome, PollSettings, SystemClock, TaskKind,
};
use crate::engine::progress::ProgressAnimator;
use crate::engine::recovery;
use crate::engine::task::{TaskSnapshot, TaskStatus};
use crate::shared::errors::StateError;
use crate::shared::fs_atomic::atomic_write_file;
use crate::shared::ids::DeploymentName;
use crate::shared::logging::append_engine_log;
use crate::shared::state_paths::StatePaths;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Workflow step the driver is in. Repair loops back through configuration
/// submission because a repair can only take effect through a fresh config;
/// there is no resuming a half-finished precheck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    ConfigSubmitting,
    PrecheckRunning,
    PrecheckPassed,
    PrecheckFailed,
    Repairing,
    InstallRunning,
    InstallSucceeded,
    InstallFailed,
}

impl Phase {
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Phase::ConfigSubmitting, Phase::PrecheckRunning)
                | (Phase::ConfigSubmitting, Phase::PrecheckFailed)
                | (Phase::PrecheckRunning, Phase::PrecheckPassed)
                | (Phase::PrecheckRunning, Phase::PrecheckFailed)
                | (Phase::PrecheckFailed, Phase::Repairing)
                | (Phase::PrecheckFailed, Phase::ConfigSubmitting)
                | (Phase::Repairing, Phase::ConfigSubmitting)
                | (Phase::Repairing, Phase::PrecheckFailed)
                | (Phase::PrecheckPassed, Phase::InstallRunning)
                | (Phase::InstallRunning, Phase::InstallSucceeded)
                | (Phase::InstallRunning, Phase::InstallFailed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::InstallSucceeded | Phase::InstallFailed)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::ConfigSubmitting => write!(f, "config_submitting"),
            Phase::PrecheckRunning => write!(f, "precheck_running"),
            Phase::PrecheckPassed => write!(f, "precheck_passed"),
            Phase::PrecheckFailed => write!(f, "precheck_failed"),
            Phase::Repairing => write!(f, "repairing"),
            Phase::InstallRunning => write!(f, "install_running"),
            Phase::InstallSucceeded => write!(f, "install_succeeded"),
            Phase::InstallFailed => write!(f, "install_failed"),
        }
    }
}

/// Read-only snapshot of one step, written by the single orchestration loop
/// and only ever read by the surface around it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepView {
    pub deployment: String,
    pub phase: Phase,
    #[serde(default)]
    pub task_status: Option<TaskStatus>,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub failures: FailureReport,
    #[serde(default)]
    pub is_terminal: bool,
    #[serde(default)]
    pub is_fatal: bool,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl StepView {
    fn new(deployment: &DeploymentName) -> Self {
        Self {
            deployment: deployment.to_string(),
            phase: Phase::ConfigSubmitting,
            task_status: None,
            progress: 0.0,
            failures: FailureReport::default(),
            is_terminal: false,
            is_fatal: false,
            last_error: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverSettings {
    pub poll: PollSettings,
    pub progress_tick: Duration,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            poll: PollSettings::default(),
            progress_tick: Duration::from_millis(crate::config::DEFAULT_PROGRESS_TICK_MS),
        }
    }
}

impl DriverSettings {
    pub fn from_settings(settings: &crate::config::Settings) -> Self {
        Self {
            poll: PollSettings {
                interval: Duration::from_millis(settings.poll_interval_ms),
                transient_budget_ms: settings.transient_budget_ms,
            },
            progress_tick: Duration::from_millis(settings.progress_tick_ms),
        }
    }
}

/// Writes the step view under the state root, atomically.
pub fn persist_step_view(paths: &StatePaths, view: &StepView) -> Result<(), StateError> {
    let path = paths.status_file();
    let encoded = serde_json::to_vec_pretty(view).map_err(|source| StateError::WriteState {
        path: path.display().to_string(),
        source: std::io::Error::other(source),
    })?;
    atomic_write_file(&path, &encoded).map_err(|source| StateError::WriteState {
        path: path.display().to_string(),
        source,
    })
}

/// Reads back the last persisted step view; `None` when nothing ran yet.
pub fn load_step_view(paths: &StatePaths) -> Result<Option<StepView>, StateError> {
    let path = paths.status_file();
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(&path).map_err(|source| StateError::ReadState {
        path: path.display().to_string(),
        source,
    })?;
    let view = serde_json::from_str(&raw).map_err(|source| StateError::ParseState {
        path: path.display().to_string(),
        source,
    })?;
    Ok(Some(view))
}

fn lock_view(view: &Mutex<StepView>) -> MutexGuard<'_, StepView> {
    match view.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Drives one deployment through config-submit, precheck, the optional
/// repair loop, and install. Owns the workflow phase and the shared step
/// view; every long-running loop is gated on the one liveness flag.
pub struct DeployDriver<A: ClusterApi, C: Clock = SystemClock> {
    api: A,
    name: DeploymentName,
    config: Value,
    phase: Phase,
    animator: ProgressAnimator,
    view: Arc<Mutex<StepView>>,
    stop: Arc<AtomicBool>,
    settings: DriverSettings,
    clock: C,
    state_paths: Option<StatePaths>,
}

impl<A: ClusterApi> DeployDriver<A, SystemClock> {
    pub fn new(api: A, name: DeploymentName, config: Value, settings: DriverSettings) -> Self {
        let view = StepView::new(&name);
        Self {
            api,
            name,
            config,
            phase: Phase::ConfigSubmitting,
            animator: ProgressAnimator::default(),
            view: Arc::new(Mutex::new(view)),
            stop: Arc::new(AtomicBool::new(false)),
            settings,
            clock: SystemClock,
            state_paths: None,
        }
    }
}

impl<A: ClusterApi, C: Clock> DeployDriver<A, C> {
    pub fn with_clock<C2: Clock>(self, clock: C2) -> DeployDriver<A, C2> {
        DeployDriver {
            api: self.api,
            name: self.name,
            config: self.config,
            phase: self.phase,
            animator: self.animator,
            view: self.view,
            stop: self.stop,
            settings: self.settings,
            clock,
            state_paths: self.state_paths,
        }
    }

    pub fn with_state_paths(mut self, paths: StatePaths) -> Self {
        self.state_paths = Some(paths);
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn view(&self) -> StepView {
        lock_view(&self.view).clone()
    }

    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Flips the liveness flag. Every scheduled fetch and animation tick
    /// checks it before doing further work; nothing cancels in-flight I/O.
    pub fn cancel(&self) {
        self.stop.store(true, Ordering::Relaxed);
        self.log("info", "workflow.canceled", "operator canceled the step");
    }

    /// Replaces the configuration before a manual recheck.
    pub fn set_config(&mut self, config: Value) {
        self.config = config;
    }

    pub fn config(&self) -> &Value {
        &self.config
    }

    /// Entered when the operator confirms the reviewed configuration:
    /// submits it, starts the precheck workflow, and polls to a terminal
    /// precheck outcome.
    pub fn start(&mut self) -> Result<Phase, EngineError> {
        if self.phase != Phase::ConfigSubmitting {
            return Err(EngineError::Transition {
                from: self.phase,
                to: Phase::ConfigSubmitting,
            });
        }
        self.submit_and_precheck()
    }

    /// Manual path out of a failed precheck: the operator edited the
    /// configuration and asked for a fresh cycle. All failure and progress
    /// state restarts from zero.
    pub fn recheck(&mut self) -> Result<Phase, EngineError> {
        if self.phase != Phase::PrecheckFailed {
            return Err(EngineError::RecheckUnavailable);
        }
        self.transition(Phase::ConfigSubmitting)?;
        self.submit_and_precheck()
    }

    /// Single-shot auto repair, only available once a precheck run finished
    /// with at least one auto-recoverable failure. On success the workflow
    /// re-enters the precheck cycle with the repaired configuration.
    pub fn auto_repair(&mut self) -> Result<Phase, EngineError> {
        let view = self.view();
        let run_finished = view.task_status.map(TaskStatus::is_terminal).unwrap_or(false);
        if self.phase != Phase::PrecheckFailed
            || !view.failures.has_auto_recoverable
            || !run_finished
        {
            return Err(EngineError::RepairUnavailable);
        }

        self.transition(Phase::Repairing)?;
        self.log("info", "repair.started", "requesting remote auto repair");
        match recovery::auto_repair(&self.api, &self.name, &self.config) {
            Ok(outcome) => {
                self.log(
                    "info",
                    "repair.applied",
                    &format!("actions={}", outcome.actions.len()),
                );
                self.config = outcome.config;
                self.transition(Phase::ConfigSubmitting)?;
                self.submit_and_precheck()
            }
            Err(err) => {
                self.record_fatal(&err);
                self.transition(Phase::PrecheckFailed)?;
                Err(err)
            }
        }
    }

    /// Starts the install workflow. Structurally gated: unless the precheck
    /// passed completely this is rejected before any network call is made.
    pub fn install(&mut self) -> Result<Phase, EngineError> {
        let view = self.view();
        let gate_open = self.phase == Phase::PrecheckPassed
            && view.failures.failed_items.is_empty()
            && !view.is_fatal;
        if !gate_open {
            self.log("warn", "install.gated", "install requested before a clean precheck");
            return Err(EngineError::InstallGated);
        }

        self.transition(Phase::InstallRunning)?;
        self.begin_fresh_cycle();
        if let Err(err) = self.api.install_start(&self.name) {
            let fatal: EngineError = err.into();
            self.record_fatal(&fatal);
            self.transition(Phase::InstallFailed)?;
            return Ok(Phase::InstallFailed);
        }
        self.log("info", "install.started", "install workflow started");
        self.run_cycle(TaskKind::Install)
    }

    fn submit_and_precheck(&mut self) -> Result<Phase, EngineError> {
        self.begin_fresh_cycle();
        if let Err(err) = self.api.create_deployment_config(&self.name, &self.config) {
            let fatal: EngineError = err.into();
            self.record_fatal(&fatal);
            self.transition(Phase::PrecheckFailed)?;
            return Ok(Phase::PrecheckFailed);
        }
        self.log("info", "config.submitted", "deployment configuration accepted");

        if let Err(err) = self.api.precheck_start(&self.name) {
            let fatal: EngineError = err.into();
            self.record_fatal(&fatal);
            self.transition(Phase::PrecheckFailed)?;
            return Ok(Phase::PrecheckFailed);
        }
        self.transition(Phase::PrecheckRunning)?;
        self.run_cycle(TaskKind::Precheck)
    }

    fn run_cycle(&mut self, kind: TaskKind) -> Result<Phase, EngineError> {
        let (passed_phase, failed_phase) = match kind {
            TaskKind::Precheck => (Phase::PrecheckPassed, Phase::PrecheckFailed),
            TaskKind::Install => (Phase::InstallSucceeded, Phase::InstallFailed),
        };

        let outcome = {
            let api = &self.api;
            let animator = &mut self.animator;
            let view = &self.view;
            let stop = Arc::clone(&self.stop);
            let tick = self.settings.progress_tick;
            let mut observer = |snapshot: &TaskSnapshot| {
                {
                    let mut guard = lock_view(view);
                    guard.task_status = Some(snapshot.status);
                    guard.failures = FailureReport::from_items(&snapshot.items);
                    guard.is_terminal = snapshot.status.is_terminal();
                }
                for frame in animator.frames(snapshot.finished, snapshot.total) {
                    lock_view(view).progress = frame;
                    if !sleep_with_stop(&stop, tick) {
                        break;
                    }
                }
            };
            poll_task(
                api,
                kind,
                &self.name,
                &self.settings.poll,
                &self.stop,
                &self.clock,
                &mut observer,
            )
        };

        match outcome {
            Ok(PollOutcome::Completed(snapshot)) => {
                let succeeded = match kind {
                    TaskKind::Precheck => snapshot.passed(),
                    TaskKind::Install => {
                        snapshot.status == TaskStatus::Successful || snapshot.passed()
                    }
                };
                let next = if succeeded { passed_phase } else { failed_phase };
                self.transition(next)?;
                self.persist_view();
                Ok(next)
            }
            Ok(PollOutcome::ReportedFailure { message }) => {
                let fatal = EngineError::TaskReportedFailure {
                    name: self.name.to_string(),
                    message,
                };
                self.record_fatal(&fatal);
                self.transition(failed_phase)?;
                Ok(failed_phase)
            }
            Ok(PollOutcome::Canceled) => {
                self.log("info", "poll.canceled", &format!("{kind} polling stopped"));
                Err(EngineError::Canceled)
            }
            Err(fatal) => {
                self.record_fatal(&fatal);
                self.transition(failed_phase)?;
                Ok(failed_phase)
            }
        }
    }

    fn begin_fresh_cycle(&mut self) {
        self.animator.reset();
        {
            let mut guard = lock_view(&self.view);
            guard.task_status = None;
            guard.progress = 0.0;
            guard.failures = FailureReport::default();
            guard.is_terminal = false;
            guard.is_fatal = false;
            guard.last_error = None;
        }
        self.persist_view();
    }

    fn transition(&mut self, next: Phase) -> Result<(), EngineError> {
        if !self.phase.can_transition_to(next) {
            return Err(EngineError::Transition {
                from: self.phase,
                to: next,
            });
        }
        self.phase = next;
        lock_view(&self.view).phase = next;
        self.log(
            "info",
            "workflow.phase",
            &format!("deployment={} phase={next}", self.name),
        );
        self.persist_view();
        Ok(())
    }

    fn record_fatal(&self, err: &EngineError) {
        {
            let mut guard = lock_view(&self.view);
            guard.is_fatal = true;
            guard.last_error = Some(err.to_string());
        }
        self.log("error", "workflow.error", &err.to_string());
        self.persist_view();
    }

    fn persist_view(&self) {
        let Some(paths) = self.state_paths.as_ref() else {
            return;
        };
        let _ = persist_step_view(paths, &self.view());
    }

    fn log(&self, level: &str, event: &str, message: &str) {
        if let Some(paths) = self.state_paths.as_ref() {
            append_engine_log(paths, level, event, message);
        }
    }
}
