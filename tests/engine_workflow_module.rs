use helmsman::api::{ApiError, ClusterApi};
use helmsman::engine::error::EngineError;
use helmsman::engine::poller::{Clock, PollSettings};
use helmsman::engine::task::{
    CheckItem, ItemResult, ItemStatus, RecoverAction, TaskSnapshot, TaskStatus,
};
use helmsman::engine::workflow::{DeployDriver, DriverSettings, Phase, StepView};
use helmsman::shared::ids::DeploymentName;
use helmsman::shared::state_paths::StatePaths;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn test_settings() -> DriverSettings {
    DriverSettings {
        poll: PollSettings {
            interval: Duration::from_millis(1),
            transient_budget_ms: 60_000,
        },
        progress_tick: Duration::ZERO,
    }
}

fn running(finished: u64, total: u64) -> TaskSnapshot {
    TaskSnapshot {
        status: TaskStatus::Running,
        finished,
        total,
        all_passed: None,
        message: None,
        items: Vec::new(),
    }
}

fn precheck_done(all_passed: bool, items: Vec<CheckItem>) -> TaskSnapshot {
    TaskSnapshot {
        status: TaskStatus::Finished,
        finished: 4,
        total: 4,
        all_passed: Some(all_passed),
        message: None,
        items,
    }
}

fn install_done() -> TaskSnapshot {
    TaskSnapshot {
        status: TaskStatus::Successful,
        finished: 4,
        total: 4,
        all_passed: None,
        message: None,
        items: Vec::new(),
    }
}

fn failed_check(name: &str, recoverable: bool) -> CheckItem {
    CheckItem {
        name: name.to_string(),
        server: "10.0.0.1".to_string(),
        status: ItemStatus::Finished,
        result: Some(ItemResult::Failed),
        recoverable,
        code: Some("2001".to_string()),
        description: Some(format!("{name} did not pass")),
        advisement: None,
    }
}

fn transient() -> ApiError {
    ApiError::TransientTransport {
        detail: "504 Gateway Timeout".to_string(),
    }
}

#[derive(Default)]
struct FakeClusterApi {
    precheck_script: Mutex<VecDeque<Result<TaskSnapshot, ApiError>>>,
    install_script: Mutex<VecDeque<Result<TaskSnapshot, ApiError>>>,
    server_config: Mutex<Value>,
    submissions: Mutex<Vec<Value>>,
    precheck_starts: AtomicUsize,
    install_starts: AtomicUsize,
    recover_calls: AtomicUsize,
}

impl FakeClusterApi {
    fn scripted(precheck: Vec<Result<TaskSnapshot, ApiError>>) -> Arc<Self> {
        let api = Self::default();
        *api.precheck_script.lock().expect("precheck script") = precheck.into();
        Arc::new(api)
    }

    fn script_precheck(&self, responses: Vec<Result<TaskSnapshot, ApiError>>) {
        *self.precheck_script.lock().expect("precheck script") = responses.into();
    }

    fn script_install(&self, responses: Vec<Result<TaskSnapshot, ApiError>>) {
        *self.install_script.lock().expect("install script") = responses.into();
    }

    fn set_server_config(&self, config: Value) {
        *self.server_config.lock().expect("server config") = config;
    }

    fn submissions(&self) -> Vec<Value> {
        self.submissions.lock().expect("submissions").clone()
    }
}

impl ClusterApi for FakeClusterApi {
    fn precheck_start(&self, _name: &DeploymentName) -> Result<(), ApiError> {
        self.precheck_starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn precheck_status(&self, _name: &DeploymentName) -> Result<TaskSnapshot, ApiError> {
        self.precheck_script
            .lock()
            .expect("precheck script")
            .pop_front()
            .unwrap_or_else(|| panic!("unscripted precheck_status call"))
    }

    fn recover(&self, _name: &DeploymentName) -> Result<Vec<RecoverAction>, ApiError> {
        self.recover_calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![RecoverAction {
            name: "cluster.port".to_string(),
            old_value: Some("2881".to_string()),
            new_value: Some("2882".to_string()),
        }])
    }

    fn deployment_config(&self, _name: &DeploymentName) -> Result<Value, ApiError> {
        Ok(self.server_config.lock().expect("server config").clone())
    }

    fn create_deployment_config(
        &self,
        _name: &DeploymentName,
        config: &Value,
    ) -> Result<(), ApiError> {
        self.submissions
            .lock()
            .expect("submissions")
            .push(config.clone());
        Ok(())
    }

    fn install_start(&self, _name: &DeploymentName) -> Result<(), ApiError> {
        self.install_starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn install_status(&self, _name: &DeploymentName) -> Result<TaskSnapshot, ApiError> {
        self.install_script
            .lock()
            .expect("install script")
            .pop_front()
            .unwrap_or_else(|| panic!("unscripted install_status call"))
    }
}

// The drivers under test take the api by value; handing them a shared handle
// keeps the fake inspectable from the test after the driver owns its copy.
// (A newtype is needed because the orphan rule forbids implementing the
// crate's trait directly for `Arc<FakeClusterApi>` from this test crate.)
struct SharedApi(Arc<FakeClusterApi>);

impl ClusterApi for SharedApi {
    fn precheck_start(&self, name: &DeploymentName) -> Result<(), ApiError> {
        self.0.precheck_start(name)
    }

    fn precheck_status(&self, name: &DeploymentName) -> Result<TaskSnapshot, ApiError> {
        self.0.precheck_status(name)
    }

    fn recover(&self, name: &DeploymentName) -> Result<Vec<RecoverAction>, ApiError> {
        self.0.recover(name)
    }

    fn deployment_config(&self, name: &DeploymentName) -> Result<Value, ApiError> {
        self.0.deployment_config(name)
    }

    fn create_deployment_config(
        &self,
        name: &DeploymentName,
        config: &Value,
    ) -> Result<(), ApiError> {
        self.0.create_deployment_config(name, config)
    }

    fn install_start(&self, name: &DeploymentName) -> Result<(), ApiError> {
        self.0.install_start(name)
    }

    fn install_status(&self, name: &DeploymentName) -> Result<TaskSnapshot, ApiError> {
        self.0.install_status(name)
    }
}

struct SteppingClock {
    now: AtomicI64,
    step: i64,
}

impl SteppingClock {
    fn new(step: i64) -> Self {
        Self {
            now: AtomicI64::new(0),
            step,
        }
    }
}

impl Clock for SteppingClock {
    fn now_ms(&self) -> i64 {
        self.now.fetch_add(self.step, Ordering::SeqCst)
    }
}

fn new_driver(api: &Arc<FakeClusterApi>, config: Value) -> DeployDriver<SharedApi> {
    let name = DeploymentName::parse("demo").expect("name");
    DeployDriver::new(SharedApi(Arc::clone(api)), name, config, test_settings())
}

#[test]
fn phase_transitions_follow_the_workflow_graph() {
    let allowed = [
        (Phase::ConfigSubmitting, Phase::PrecheckRunning),
        (Phase::PrecheckRunning, Phase::PrecheckPassed),
        (Phase::PrecheckRunning, Phase::PrecheckFailed),
        (Phase::PrecheckFailed, Phase::Repairing),
        (Phase::PrecheckFailed, Phase::ConfigSubmitting),
        (Phase::Repairing, Phase::ConfigSubmitting),
        (Phase::PrecheckPassed, Phase::InstallRunning),
        (Phase::InstallRunning, Phase::InstallSucceeded),
        (Phase::InstallRunning, Phase::InstallFailed),
    ];
    for (from, to) in allowed {
        assert!(from.can_transition_to(to), "{from} -> {to} should be legal");
    }

    let forbidden = [
        (Phase::ConfigSubmitting, Phase::InstallRunning),
        (Phase::PrecheckFailed, Phase::InstallRunning),
        (Phase::PrecheckFailed, Phase::PrecheckPassed),
        (Phase::PrecheckPassed, Phase::PrecheckRunning),
        (Phase::InstallSucceeded, Phase::ConfigSubmitting),
        (Phase::InstallFailed, Phase::InstallRunning),
    ];
    for (from, to) in forbidden {
        assert!(!from.can_transition_to(to), "{from} -> {to} must be rejected");
    }

    assert!(Phase::InstallSucceeded.is_terminal());
    assert!(Phase::InstallFailed.is_terminal());
    assert!(!Phase::PrecheckFailed.is_terminal());
}

#[test]
fn a_clean_precheck_then_install_runs_to_success() {
    let api = FakeClusterApi::scripted(vec![
        Ok(running(1, 4)),
        Ok(running(3, 4)),
        Ok(precheck_done(true, Vec::new())),
    ]);
    api.script_install(vec![Ok(running(2, 4)), Ok(install_done())]);

    let mut driver = new_driver(&api, json!({"cluster": {"port": 2881}}));
    let phase = driver.start().expect("precheck cycle");
    assert_eq!(phase, Phase::PrecheckPassed);

    let view = driver.view();
    assert!(view.failures.failed_items.is_empty());
    assert!(!view.is_fatal);
    assert_eq!(view.progress, 1.0);
    assert_eq!(view.task_status, Some(TaskStatus::Finished));

    let phase = driver.install().expect("install cycle");
    assert_eq!(phase, Phase::InstallSucceeded);
    assert!(driver.view().is_terminal);
    assert_eq!(api.precheck_starts.load(Ordering::SeqCst), 1);
    assert_eq!(api.install_starts.load(Ordering::SeqCst), 1);
    assert_eq!(api.submissions().len(), 1);
}

#[test]
fn transient_gaps_do_not_fail_a_precheck_that_later_finishes() {
    let api = FakeClusterApi::scripted(vec![
        Err(transient()),
        Err(transient()),
        Ok(precheck_done(false, vec![failed_check("port_check", true)])),
    ]);

    let mut driver =
        new_driver(&api, json!({})).with_clock(SteppingClock::new(10_000));
    let phase = driver.start().expect("precheck cycle");
    assert_eq!(phase, Phase::PrecheckFailed);

    let view = driver.view();
    assert!(!view.is_fatal);
    assert!(view.failures.has_auto_recoverable);
    assert_eq!(view.failures.failed_items.len(), 1);
}

#[test]
fn a_transient_outage_past_the_budget_fails_the_cycle() {
    let api = FakeClusterApi::scripted(vec![Err(transient()), Err(transient())]);

    let mut driver =
        new_driver(&api, json!({})).with_clock(SteppingClock::new(61_000));
    let phase = driver.start().expect("fatal outcome is still a phase");
    assert_eq!(phase, Phase::PrecheckFailed);

    let view = driver.view();
    assert!(view.is_fatal);
    let error = view.last_error.expect("recorded error");
    assert!(error.contains("60000"), "unexpected error text: {error}");
}

#[test]
fn install_is_rejected_without_a_clean_precheck() {
    let api = FakeClusterApi::scripted(vec![Ok(precheck_done(
        false,
        vec![failed_check("disk_check", false)],
    ))]);

    let mut driver = new_driver(&api, json!({}));
    assert_eq!(driver.start().expect("precheck cycle"), Phase::PrecheckFailed);

    let err = driver.install().expect_err("gate must hold");
    assert!(matches!(err, EngineError::InstallGated));
    assert_eq!(driver.phase(), Phase::PrecheckFailed);
    assert_eq!(api.install_starts.load(Ordering::SeqCst), 0);
}

#[test]
fn auto_repair_resubmits_and_reruns_the_precheck() {
    let api = FakeClusterApi::scripted(vec![Ok(precheck_done(
        false,
        vec![failed_check("port_check", true)],
    ))]);
    api.set_server_config(json!({"cluster": {"port": 2882, "password": ""}}));

    let mut driver = new_driver(
        &api,
        json!({"cluster": {"port": 2881, "password": "p1"}}),
    );
    assert_eq!(driver.start().expect("first cycle"), Phase::PrecheckFailed);

    api.script_precheck(vec![Ok(precheck_done(true, Vec::new()))]);
    let phase = driver.auto_repair().expect("repair cycle");
    assert_eq!(phase, Phase::PrecheckPassed);
    assert_eq!(api.recover_calls.load(Ordering::SeqCst), 1);

    let submissions = api.submissions();
    assert_eq!(submissions.len(), 3);
    assert_eq!(submissions[1]["cluster"]["port"], json!(2882));
    assert_eq!(submissions[1]["cluster"]["password"], json!("p1"));
    assert_eq!(submissions[2], submissions[1]);

    api.script_install(vec![Ok(install_done())]);
    assert_eq!(driver.install().expect("install cycle"), Phase::InstallSucceeded);
}

#[test]
fn auto_repair_needs_a_finished_run_with_recoverable_failures() {
    let api = FakeClusterApi::scripted(vec![Ok(precheck_done(
        false,
        vec![failed_check("disk_check", false)],
    ))]);

    let mut driver = new_driver(&api, json!({}));
    assert_eq!(driver.start().expect("precheck cycle"), Phase::PrecheckFailed);

    let err = driver.auto_repair().expect_err("nothing is auto-recoverable");
    assert!(matches!(err, EngineError::RepairUnavailable));
    assert_eq!(api.recover_calls.load(Ordering::SeqCst), 0);
    assert_eq!(driver.phase(), Phase::PrecheckFailed);
}

#[test]
fn recheck_reruns_the_cycle_with_the_edited_configuration() {
    let api = FakeClusterApi::scripted(vec![Ok(precheck_done(
        false,
        vec![failed_check("port_check", false)],
    ))]);

    let mut driver = new_driver(&api, json!({"cluster": {"port": 2881}}));
    assert_eq!(driver.start().expect("first cycle"), Phase::PrecheckFailed);

    api.script_precheck(vec![Ok(precheck_done(true, Vec::new()))]);
    driver.set_config(json!({"cluster": {"port": 2886}}));
    let phase = driver.recheck().expect("second cycle");
    assert_eq!(phase, Phase::PrecheckPassed);

    let submissions = api.submissions();
    assert_eq!(submissions.len(), 2);
    assert_eq!(submissions[1]["cluster"]["port"], json!(2886));
    // the failure list restarts with the fresh cycle
    assert!(driver.view().failures.failed_items.is_empty());
}

#[test]
fn recheck_is_only_offered_after_a_failed_precheck() {
    let api = FakeClusterApi::scripted(Vec::new());
    let mut driver = new_driver(&api, json!({}));
    let err = driver.recheck().expect_err("nothing failed yet");
    assert!(matches!(err, EngineError::RecheckUnavailable));
}

#[test]
fn start_is_rejected_once_the_workflow_has_moved_on() {
    let api = FakeClusterApi::scripted(vec![Ok(precheck_done(true, Vec::new()))]);
    let mut driver = new_driver(&api, json!({}));
    assert_eq!(driver.start().expect("first cycle"), Phase::PrecheckPassed);

    let err = driver.start().expect_err("already past submission");
    assert!(matches!(err, EngineError::Transition { .. }));
}

#[test]
fn a_task_reported_failure_is_fatal_with_the_payload_message() {
    let api = FakeClusterApi::scripted(vec![Ok(TaskSnapshot {
        status: TaskStatus::Failed,
        finished: 1,
        total: 4,
        all_passed: None,
        message: Some("boom".to_string()),
        items: Vec::new(),
    })]);

    let mut driver = new_driver(&api, json!({}));
    assert_eq!(driver.start().expect("cycle ends"), Phase::PrecheckFailed);

    let view = driver.view();
    assert!(view.is_fatal);
    assert!(view.last_error.expect("recorded error").contains("boom"));
}

#[test]
fn a_request_failure_during_polling_is_fatal() {
    let api = FakeClusterApi::scripted(vec![Err(ApiError::RequestFailure {
        status: 400,
        message: "invalid server list".to_string(),
    })]);

    let mut driver = new_driver(&api, json!({}));
    assert_eq!(driver.start().expect("cycle ends"), Phase::PrecheckFailed);

    let view = driver.view();
    assert!(view.is_fatal);
    assert!(view
        .last_error
        .expect("recorded error")
        .contains("invalid server list"));
}

#[test]
fn the_step_view_is_persisted_across_the_cycle() {
    let dir = tempfile::tempdir().expect("tempdir");
    let paths = StatePaths::new(dir.path());
    helmsman::shared::state_paths::bootstrap_state_root(&paths).expect("bootstrap");

    let api = FakeClusterApi::scripted(vec![
        Ok(running(2, 4)),
        Ok(precheck_done(true, Vec::new())),
    ]);
    let mut driver = new_driver(&api, json!({})).with_state_paths(paths.clone());
    driver.start().expect("precheck cycle");

    let raw = std::fs::read_to_string(paths.status_file()).expect("status file");
    let persisted: StepView = serde_json::from_str(&raw).expect("parses");
    assert_eq!(persisted.phase, Phase::PrecheckPassed);
    assert_eq!(persisted.deployment, "demo");
    assert_eq!(persisted.progress, 1.0);
}
