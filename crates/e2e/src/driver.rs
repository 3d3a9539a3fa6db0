//! Executes scenarios against the engine, one fresh context per scenario

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::arch::Arch;
use crate::config::HarnessConfig;
use crate::context::TestContext;
use crate::error::{AssertionFailure, CleanupFailure, HarnessError, HarnessResult};
use crate::fixture::FixtureKind;
use crate::process::RunResult;
use crate::scenario::{Expect, Scenario, ScenarioStep, StepAction, Variables};
use crate::version;

/// Outcome of one step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    pub name: String,
    /// Rendered command line, empty for skipped steps
    pub command: String,
    pub exit_code: Option<i32>,
    pub success: bool,
    pub skipped: bool,
    pub duration_ms: u64,
    /// Trimmed stdout
    pub output: String,
    pub failure: Option<AssertionFailure>,
    pub error: Option<String>,
}

impl StepReport {
    fn skipped(name: &str) -> Self {
        Self {
            name: name.to_string(),
            command: String::new(),
            exit_code: None,
            success: true,
            skipped: true,
            duration_ms: 0,
            output: String::new(),
            failure: None,
            error: None,
        }
    }
}

/// Outcome of one scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub name: String,
    pub success: bool,
    pub skipped: bool,
    pub duration_ms: u64,
    pub steps: Vec<StepReport>,
    pub error: Option<String>,
    pub cleanup_failures: Vec<CleanupFailure>,
}

impl ScenarioReport {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            success: false,
            skipped: false,
            duration_ms: 0,
            steps: Vec::new(),
            error: None,
            cleanup_failures: Vec::new(),
        }
    }

    /// First assertion failure, if any step failed an expectation
    pub fn assertion_failure(&self) -> Option<&AssertionFailure> {
        self.steps.iter().find_map(|s| s.failure.as_ref())
    }
}

/// Runs scenarios with a shared configuration
pub struct ScenarioDriver {
    config: HarnessConfig,
}

impl ScenarioDriver {
    pub fn new(config: HarnessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Variables every scenario starts with.
    pub fn base_variables(&self) -> Variables {
        let mut vars = Variables::new();
        vars.set("image", self.config.test_image.clone());

        match Arch::native() {
            Ok(native) => {
                let target = native.cross_target();
                vars.set("platform", target.platform);
                vars.set("arch", target.expected_label);
            }
            Err(e) => warn!("No cross-arch target: {}", e),
        }

        if let Some(raw) = &self.config.podman_version {
            let normalized = version::normalize_version(raw);
            vars.set("image_version", version::image_version(&normalized));
            vars.set("image_reference", version::expected_image_reference(raw));
            vars.set("podman_version", normalized);
        }
        vars
    }

    /// Run one scenario in a fresh [`TestContext`].
    ///
    /// Steps stop at the first failure; cleanup always runs and its failures
    /// fail the scenario too.
    pub fn run(&self, scenario: &Scenario) -> ScenarioReport {
        let start = Instant::now();
        let mut report = ScenarioReport::new(&scenario.name);

        let mut vars = self.base_variables();
        for (name, value) in &scenario.vars {
            vars.set(name.clone(), value.clone());
        }

        if let Some(missing) = scenario.requires.iter().find(|v| !vars.is_defined(v)) {
            info!("Skipping {}: '{}' is not set", scenario.name, missing);
            report.skipped = true;
            report.success = true;
            return report;
        }

        let mut ctx = match TestContext::new(&self.config) {
            Ok(ctx) => ctx,
            Err(e) => {
                report.error = Some(e.to_string());
                report.duration_ms = start.elapsed().as_millis() as u64;
                return report;
            }
        };

        if let Err(e) = self.run_steps(&mut ctx, scenario, &mut vars, &mut report) {
            error!("{}: {}", scenario.name, e);
            report.error = Some(e.to_string());
        }

        let cleanup = ctx.run_cleanup();
        if !cleanup.is_clean() && report.error.is_none() {
            report.error = Some(format!("{} cleanup action(s) failed", cleanup.failures.len()));
        }
        report.cleanup_failures = cleanup.failures;

        report.success = report.error.is_none();
        report.duration_ms = start.elapsed().as_millis() as u64;
        report
    }

    fn run_steps(
        &self,
        ctx: &mut TestContext,
        scenario: &Scenario,
        vars: &mut Variables,
        report: &mut ScenarioReport,
    ) -> HarnessResult<()> {
        if scenario.machine {
            let started = Instant::now();
            let (name, result) = ctx.init_machine()?;
            let command = ctx.command(ctx.machine_init_args(&name)).to_string();
            vars.set("machine", name);

            let check = Expect::default().check("machine init", &result, vars)?;
            let step = finish_step("machine init", command, &result, started, check);
            let failure = step.failure.clone();
            report.steps.push(step);
            if let Some(failure) = failure {
                return Err(HarnessError::Assertion(failure));
            }
        }

        for step in &scenario.steps {
            if let Some(var) = &step.when {
                if !vars.is_defined(var) {
                    debug!("Skipping step '{}': '{}' is not set", step.name, var);
                    report.steps.push(StepReport::skipped(&step.name));
                    continue;
                }
            }

            let started = Instant::now();
            let (command, result) = match self.execute(ctx, step, vars) {
                Ok(done) => done,
                Err(e) => {
                    let mut failed = StepReport::skipped(&step.name);
                    failed.skipped = false;
                    failed.success = false;
                    failed.error = Some(e.to_string());
                    failed.duration_ms = started.elapsed().as_millis() as u64;
                    report.steps.push(failed);
                    return Err(e);
                }
            };

            let check = step.expect.check(&step.name, &result, vars)?;
            let report_step = finish_step(&step.name, command, &result, started, check);
            let failure = report_step.failure.clone();
            report.steps.push(report_step);
            if let Some(failure) = failure {
                return Err(HarnessError::Assertion(failure));
            }
        }
        Ok(())
    }

    fn execute(
        &self,
        ctx: &mut TestContext,
        step: &ScenarioStep,
        vars: &Variables,
    ) -> HarnessResult<(String, RunResult)> {
        match step.action {
            StepAction::Command => {
                let args = step
                    .args
                    .iter()
                    .map(|a| vars.substitute(a))
                    .collect::<HarnessResult<Vec<String>>>()?;
                let command = ctx.command(&args).to_string();
                Ok((command, ctx.run(&args)?))
            }
            StepAction::StopMachine => {
                let machine = machine_of(step, vars)?;
                let command = ctx.command(FixtureKind::Machine.stop_args(&machine)).to_string();
                Ok((command, ctx.stop_machine(&machine)?))
            }
            StepAction::StartMachine => {
                let machine = machine_of(step, vars)?;
                let command = ctx.command(["machine", "start", machine.as_str()]).to_string();
                Ok((command, ctx.start_machine(&machine)?))
            }
            StepAction::RemoveMachine => {
                let machine = machine_of(step, vars)?;
                let command = ctx.command(FixtureKind::Machine.remove_args(&machine)).to_string();
                Ok((command, ctx.remove_machine(&machine)?))
            }
        }
    }
}

fn machine_of(step: &ScenarioStep, vars: &Variables) -> HarnessResult<String> {
    vars.get("machine").map(str::to_string).ok_or_else(|| {
        HarnessError::ScenarioParse(format!("step '{}' needs a machine", step.name))
    })
}

fn finish_step(
    name: &str,
    command: String,
    result: &RunResult,
    started: Instant,
    check: Result<(), AssertionFailure>,
) -> StepReport {
    let failure = check.err();
    if let Some(f) = &failure {
        warn!("{}", f);
    } else {
        debug!("Step '{}' passed", name);
    }
    StepReport {
        name: name.to_string(),
        command,
        exit_code: Some(result.exit_code),
        success: failure.is_none(),
        skipped: false,
        duration_ms: started.elapsed().as_millis() as u64,
        output: result.output_to_string(),
        failure,
        error: None,
    }
}
