//! Per-test isolation unit: working directory, environment, fixtures and
//! the cleanup registry

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::cleanup::{CleanupAction, CleanupRegistry, CleanupReport};
use crate::command::{BaseInvocation, CommandSpec};
use crate::config::HarnessConfig;
use crate::error::{HarnessError, HarnessResult};
use crate::fixture::{self, Fixture, FixtureKind, FixtureState};
use crate::process::{ProcessRunner, RunResult};

/// One isolated test environment.
///
/// Every command runs with `HOME` (and the XDG config/data dirs) pointed at a
/// fresh directory, so concurrently running tests never see each other's
/// machines. Fixtures get unique names and a cleanup action is registered
/// before the fixture is created.
///
/// Teardown happens in [`TestContext::run_cleanup`]. If the context is dropped
/// without it (a panicking test), `Drop` runs the remaining actions.
pub struct TestContext {
    config: HarnessConfig,
    base: BaseInvocation,
    runner: ProcessRunner,
    work_dir: PathBuf,
    home_dir: PathBuf,
    original_home: Option<PathBuf>,
    registry: CleanupRegistry,
    fixtures: Vec<Fixture>,
    reset_registered: bool,
}

impl TestContext {
    pub fn new(config: &HarnessConfig) -> HarnessResult<Self> {
        config.validate()?;

        let work_dir = config
            .work_root()
            .join(fixture::unique_name("machine-verify"));
        let home_dir = work_dir.join("home");

        // Nothing on disk until every fallible setup step has succeeded
        let runner = ProcessRunner::new(config.step_timeout())?;
        std::fs::create_dir_all(&home_dir)?;

        let mut registry = CleanupRegistry::new();
        registry.register(CleanupAction::RemoveDir {
            path: work_dir.clone(),
        });

        let mut base = BaseInvocation::new(config.binary.as_os_str())
            .global_args(&config.global_args)
            .cwd(&work_dir)
            .env("HOME", &home_dir)
            .env("XDG_CONFIG_HOME", home_dir.join(".config"))
            .env("XDG_DATA_HOME", home_dir.join(".local").join("share"));
        for (key, value) in &config.env {
            base = base.env(key, value);
        }

        info!("Test context at {}", work_dir.display());

        Ok(Self {
            config: config.clone(),
            base,
            runner,
            work_dir,
            home_dir,
            original_home: std::env::var_os("HOME").map(PathBuf::from),
            registry,
            fixtures: Vec::new(),
            reset_registered: false,
        })
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn base(&self) -> &BaseInvocation {
        &self.base
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// The isolated `HOME` every command runs with
    pub fn home_dir(&self) -> &Path {
        &self.home_dir
    }

    /// `HOME` of the harness process when the context was created
    pub fn original_home(&self) -> Option<&Path> {
        self.original_home.as_deref()
    }

    pub fn fixtures(&self) -> &[Fixture] {
        &self.fixtures
    }

    pub fn fixture(&self, kind: FixtureKind, name: &str) -> Option<&Fixture> {
        self.fixtures
            .iter()
            .find(|f| f.kind == kind && f.name == name)
    }

    pub fn pending_cleanup(&self) -> usize {
        self.registry.len()
    }

    /// Build the full command line for `args`.
    pub fn command<I, S>(&self, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.base.build(args)
    }

    /// Run the engine with `args` and wait for it.
    pub fn run<I, S>(&self, args: I) -> HarnessResult<RunResult>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.runner.run(&self.command(args))
    }

    pub fn register_cleanup(&mut self, action: CleanupAction) {
        self.registry.register(action);
    }

    /// `machine init --now` a uniquely named machine.
    ///
    /// The machine's removal is registered before the init command runs, so a
    /// failure anywhere later still tears it down. A non-zero exit is returned
    /// as a result for the caller to assert on.
    pub fn init_machine(&mut self) -> HarnessResult<(String, RunResult)> {
        let name = fixture::unique_name(&self.config.name_prefix);

        if !self.reset_registered {
            self.register_cleanup(CleanupAction::Engine {
                label: "machine reset".to_string(),
                args: vec!["machine".into(), "reset".into(), "-f".into()],
            });
            self.reset_registered = true;
        }
        self.track(FixtureKind::Machine, &name, FixtureState::Initializing);

        let args = self.machine_init_args(&name);
        info!("Creating machine {}", name);
        let result = self.run(&args)?;
        let state = if result.success() {
            FixtureState::Running
        } else {
            warn!(
                "machine init {} exited {}: {}",
                name,
                result.exit_code,
                result.error_to_string()
            );
            FixtureState::Absent
        };
        self.set_state(FixtureKind::Machine, &name, state);
        Ok((name, result))
    }

    /// Arguments `init_machine` uses to create `name`
    pub fn machine_init_args(&self, name: &str) -> Vec<String> {
        let mut args: Vec<String> = vec!["machine".into(), "init".into(), "--now".into()];
        if let Some(image) = &self.config.machine_image {
            args.push("--image".into());
            args.push(image.clone());
        }
        args.extend(self.config.machine_init_args.iter().cloned());
        args.push(name.to_string());
        args
    }

    /// `run --name <generated> <run_args...>`, with removal registered first.
    pub fn run_container<I, S>(&mut self, run_args: I) -> HarnessResult<(String, RunResult)>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = fixture::unique_name(&self.config.name_prefix);
        self.track(FixtureKind::Container, &name, FixtureState::Initializing);

        let mut args: Vec<String> = vec!["run".into(), "--name".into(), name.clone()];
        args.extend(run_args.into_iter().map(Into::into));

        let result = self.run(&args)?;
        let state = if result.success() {
            FixtureState::Running
        } else {
            FixtureState::Absent
        };
        self.set_state(FixtureKind::Container, &name, state);
        Ok((name, result))
    }

    pub fn stop_machine(&mut self, name: &str) -> HarnessResult<RunResult> {
        self.stop_fixture(FixtureKind::Machine, name)
    }

    pub fn start_machine(&mut self, name: &str) -> HarnessResult<RunResult> {
        let result = self.run(["machine", "start", name])?;
        if result.success() {
            self.set_state(FixtureKind::Machine, name, FixtureState::Running);
        }
        Ok(result)
    }

    pub fn stop_fixture(&mut self, kind: FixtureKind, name: &str) -> HarnessResult<RunResult> {
        let result = self.run(kind.stop_args(name))?;
        if result.success() {
            self.set_state(kind, name, FixtureState::Stopped);
        } else if fixture::is_not_found(&result, kind, name) {
            self.set_state(kind, name, FixtureState::Removed);
            return Err(HarnessError::FixtureNotFound {
                kind: kind.to_string(),
                name: name.to_string(),
            });
        }
        Ok(result)
    }

    pub fn remove_machine(&mut self, name: &str) -> HarnessResult<RunResult> {
        self.remove_fixture(FixtureKind::Machine, name)
    }

    /// Force-remove a fixture.
    ///
    /// Removing a name the engine no longer knows is
    /// [`HarnessError::FixtureNotFound`], neither success nor a crash.
    pub fn remove_fixture(&mut self, kind: FixtureKind, name: &str) -> HarnessResult<RunResult> {
        let result = self.run(kind.remove_args(name))?;
        if result.success() {
            self.set_state(kind, name, FixtureState::Removed);
            info!("Removed {} {}", kind, name);
        } else if fixture::is_not_found(&result, kind, name) {
            self.set_state(kind, name, FixtureState::Removed);
            return Err(HarnessError::FixtureNotFound {
                kind: kind.to_string(),
                name: name.to_string(),
            });
        }
        Ok(result)
    }

    /// Ask the engine for the fixture's current state.
    pub fn query_state(&mut self, kind: FixtureKind, name: &str) -> HarnessResult<FixtureState> {
        let result = self.run(kind.inspect_args(name))?;
        let state = if result.success() {
            FixtureState::from_engine(&result.output_to_string())
        } else if fixture::is_not_found(&result, kind, name) {
            FixtureState::Absent
        } else {
            return Err(HarnessError::Fixture(format!(
                "inspect {} {} exited {}: {}",
                kind,
                name,
                result.exit_code,
                result.error_to_string()
            )));
        };
        if self.fixture(kind, name).is_some() {
            let tracked = if state == FixtureState::Absent {
                FixtureState::Removed
            } else {
                state
            };
            self.set_state(kind, name, tracked);
        }
        Ok(state)
    }

    /// Run every registered cleanup action: fixtures first, then directories.
    pub fn run_cleanup(&mut self) -> CleanupReport {
        let mut registry = std::mem::take(&mut self.registry);
        let report = registry.run_with(|action| self.execute_cleanup(action));
        if report.is_clean() {
            debug!("Cleanup complete ({} actions)", report.executed.len());
        }
        report
    }

    fn execute_cleanup(&mut self, action: CleanupAction) -> Result<(), String> {
        match action {
            CleanupAction::RemoveFixture { kind, name } => {
                if let Some(f) = self.fixture(kind, &name) {
                    if f.state == FixtureState::Removed {
                        debug!("{} {} already removed", kind, name);
                        return Ok(());
                    }
                }
                match self.remove_fixture(kind, &name) {
                    Ok(result) if result.success() => Ok(()),
                    Ok(result) => Err(format!(
                        "exit {}: {}",
                        result.exit_code,
                        result.error_to_string()
                    )),
                    Err(HarnessError::FixtureNotFound { .. }) => {
                        warn!("{} {} was already gone at cleanup", kind, name);
                        Ok(())
                    }
                    Err(e) => Err(e.to_string()),
                }
            }
            CleanupAction::Engine { label, args } => {
                let result = self.run(&args).map_err(|e| e.to_string())?;
                if !result.success() {
                    return Err(format!(
                        "{} exited {}: {}",
                        label,
                        result.exit_code,
                        result.error_to_string()
                    ));
                }
                if args.first().map(String::as_str) == Some("machine")
                    && args.get(1).map(String::as_str) == Some("reset")
                {
                    for f in self
                        .fixtures
                        .iter_mut()
                        .filter(|f| f.kind == FixtureKind::Machine)
                    {
                        f.state = FixtureState::Removed;
                    }
                }
                Ok(())
            }
            CleanupAction::RemoveDir { path } => {
                if !path.exists() {
                    return Ok(());
                }
                std::fs::remove_dir_all(&path)
                    .map_err(|e| format!("{}: {}", path.display(), e))
            }
            CleanupAction::Custom { callback, .. } => callback(),
        }
    }

    /// Record a fixture and register its removal before anything uses it.
    fn track(&mut self, kind: FixtureKind, name: &str, state: FixtureState) {
        self.register_cleanup(CleanupAction::RemoveFixture {
            kind,
            name: name.to_string(),
        });
        let mut fixture = Fixture::new(kind, name);
        fixture.state = state;
        self.fixtures.push(fixture);
    }

    fn set_state(&mut self, kind: FixtureKind, name: &str, state: FixtureState) {
        if let Some(f) = self
            .fixtures
            .iter_mut()
            .find(|f| f.kind == kind && f.name == name)
        {
            debug!("{} {}: {} -> {}", kind, name, f.state, state);
            f.state = state;
        }
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        if self.registry.is_empty() {
            return;
        }
        warn!(
            "Test context dropped with {} pending cleanup actions; running them now",
            self.registry.len()
        );
        let report = self.run_cleanup();
        for failure in &report.failures {
            error!("{}", failure);
        }
    }
}
