use crate::api::HttpClusterApi;
use crate::config::{load_deploy_plan, load_settings, DeployPlan, Settings};
use crate::engine::workflow::{
    load_step_view, DeployDriver, DriverSettings, Phase, StepView,
};
use crate::shared::state_paths::{bootstrap_state_root, default_state_root_path, StatePaths};
use std::path::PathBuf;

pub fn help_lines() -> Vec<&'static str> {
    vec![
        "usage: helmsman <command> [options]",
        "",
        "commands:",
        "  precheck --plan <file>      submit the plan and run the precheck workflow",
        "  deploy   --plan <file>      run precheck and, when it passes, install",
        "           [--auto-repair]    attempt one auto repair if recoverable checks fail",
        "  status                      show the persisted state of the last run",
        "  help                        show this message",
        "",
        "options:",
        "  --state-root <dir>          state directory (default: ~/.helmsman)",
    ]
}

#[derive(Debug, Default)]
struct CliOptions {
    plan: Option<String>,
    state_root: Option<String>,
    auto_repair: bool,
}

fn parse_options(args: &[String]) -> Result<CliOptions, String> {
    let mut options = CliOptions::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--plan" => {
                options.plan = Some(
                    iter.next()
                        .ok_or_else(|| "--plan requires a file path".to_string())?
                        .clone(),
                );
            }
            "--state-root" => {
                options.state_root = Some(
                    iter.next()
                        .ok_or_else(|| "--state-root requires a directory".to_string())?
                        .clone(),
                );
            }
            "--auto-repair" => options.auto_repair = true,
            other => return Err(format!("unknown option `{other}`")),
        }
    }
    Ok(options)
}

pub fn run_cli(args: Vec<String>) -> Result<String, String> {
    let Some((verb, rest)) = args.split_first() else {
        return Ok(help_lines().join("\n"));
    };
    match verb.as_str() {
        "help" | "--help" | "-h" => Ok(help_lines().join("\n")),
        "status" => cmd_status(parse_options(rest)?),
        "precheck" => cmd_precheck(parse_options(rest)?),
        "deploy" => cmd_deploy(parse_options(rest)?),
        other => Err(format!(
            "unknown command `{other}`; run `helmsman help` for usage"
        )),
    }
}

fn resolve_state_paths(options: &CliOptions) -> Result<StatePaths, String> {
    let root = match options.state_root.as_ref() {
        Some(path) => PathBuf::from(path),
        None => default_state_root_path().map_err(|e| e.to_string())?,
    };
    Ok(StatePaths::new(root))
}

fn load_runtime_settings(paths: &StatePaths) -> Result<Settings, String> {
    let settings = load_settings(&paths.settings_file())
        .map_err(|e| e.to_string())?
        .with_env_overrides();
    settings.validate().map_err(|e| e.to_string())?;
    Ok(settings)
}

fn load_plan(options: &CliOptions) -> Result<DeployPlan, String> {
    let path = options
        .plan
        .as_ref()
        .ok_or_else(|| "--plan <file> is required".to_string())?;
    load_deploy_plan(&PathBuf::from(path)).map_err(|e| e.to_string())
}

fn cmd_status(options: CliOptions) -> Result<String, String> {
    let paths = resolve_state_paths(&options)?;
    match load_step_view(&paths).map_err(|e| e.to_string())? {
        Some(view) => Ok(render_view(&view)),
        None => Ok("no recorded deployment run".to_string()),
    }
}

fn cmd_precheck(options: CliOptions) -> Result<String, String> {
    let mut driver = build_driver(&options)?;
    let phase = driver.start().map_err(|e| e.to_string())?;
    let view = driver.view();
    let mut output = render_view(&view);
    if phase == Phase::PrecheckFailed && view.failures.has_auto_recoverable {
        output.push_str("\nhint: re-run `deploy --auto-repair` to repair recoverable checks");
    }
    Ok(output)
}

fn cmd_deploy(options: CliOptions) -> Result<String, String> {
    let auto_repair = options.auto_repair;
    let mut driver = build_driver(&options)?;
    let mut phase = driver.start().map_err(|e| e.to_string())?;

    if phase == Phase::PrecheckFailed && auto_repair && driver.view().failures.has_auto_recoverable
    {
        phase = driver.auto_repair().map_err(|e| e.to_string())?;
    }
    if phase == Phase::PrecheckPassed {
        phase = driver.install().map_err(|e| e.to_string())?;
    }
    Ok(render_view(&driver.view()))
}

fn build_driver(options: &CliOptions) -> Result<DeployDriver<HttpClusterApi>, String> {
    let paths = resolve_state_paths(options)?;
    bootstrap_state_root(&paths).map_err(|e| e.to_string())?;
    let settings = load_runtime_settings(&paths)?;
    let plan = load_plan(options)?;
    let api_base = plan
        .api_base
        .clone()
        .unwrap_or_else(|| settings.api_base.clone());
    let api = HttpClusterApi::new(api_base);
    let driver = DeployDriver::new(
        api,
        plan.name,
        plan.config,
        DriverSettings::from_settings(&settings),
    )
    .with_state_paths(paths);
    Ok(driver)
}

fn render_view(view: &StepView) -> String {
    let mut lines = vec![
        format!("deployment: {}", view.deployment),
        format!("phase: {}", view.phase),
        format!(
            "task: {}",
            view.task_status
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string())
        ),
        format!("progress: {:.0}%", view.progress * 100.0),
    ];
    if !view.failures.failed_items.is_empty() {
        lines.push(format!(
            "failed checks: {} ({} auto-recoverable, {} manual)",
            view.failures.failed_items.len(),
            view.failures.auto_recoverable_count(),
            view.failures.manual_only_count(),
        ));
        for item in &view.failures.failed_items {
            let bucket = if item.recoverable { "auto" } else { "manual" };
            let detail = item
                .description
                .as_deref()
                .or(item.code.as_deref())
                .unwrap_or("no detail");
            lines.push(format!(
                "  FAILED {}@{} [{bucket}] {detail}",
                item.name, item.server
            ));
        }
    }
    if let Some(error) = view.last_error.as_ref() {
        lines.push(format!("error: {error}"));
    }
    lines.join("\n")
}
