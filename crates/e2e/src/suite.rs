//! Suite runner: selects scenarios, runs them in order and writes the results

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::config::HarnessConfig;
use crate::driver::{ScenarioDriver, ScenarioReport};
use crate::error::{HarnessError, HarnessResult};
use crate::scenario::Scenario;

/// File written by [`SuiteRunner::write_results`]
pub const RESULTS_FILE: &str = "verify-results.json";

/// Result of running a set of scenarios
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
    pub results: Vec<ScenarioReport>,
}

impl SuiteReport {
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

/// Where scenarios come from and where results go
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub harness: HarnessConfig,
    /// Scenario directory; the built-in scenarios when unset
    pub scenarios_dir: Option<PathBuf>,
    pub output_dir: PathBuf,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            harness: HarnessConfig::default(),
            scenarios_dir: None,
            output_dir: PathBuf::from("verify-results"),
        }
    }
}

pub struct SuiteRunner {
    driver: ScenarioDriver,
    scenarios_dir: Option<PathBuf>,
    output_dir: PathBuf,
}

impl SuiteRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            driver: ScenarioDriver::new(config.harness),
            scenarios_dir: config.scenarios_dir,
            output_dir: config.output_dir,
        }
    }

    pub fn driver(&self) -> &ScenarioDriver {
        &self.driver
    }

    /// Scenarios from the configured directory, or the built-in set
    pub fn scenarios(&self) -> HarnessResult<Vec<Scenario>> {
        match &self.scenarios_dir {
            Some(dir) => Scenario::load_all(dir),
            None => Scenario::builtin(),
        }
    }

    pub fn run_all(&self) -> HarnessResult<SuiteReport> {
        let scenarios = self.scenarios()?;
        Ok(self.run_scenarios(&scenarios))
    }

    /// Run scenarios carrying `tag`
    pub fn run_tagged(&self, tag: &str) -> HarnessResult<SuiteReport> {
        let scenarios: Vec<Scenario> = Scenario::filter_by_tag(&self.scenarios()?, tag)
            .into_iter()
            .cloned()
            .collect();
        Ok(self.run_scenarios(&scenarios))
    }

    /// Run a specific scenario by name
    pub fn run_named(&self, name: &str) -> HarnessResult<ScenarioReport> {
        let scenario = self
            .scenarios()?
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| HarnessError::ScenarioParse(format!("Scenario not found: {}", name)))?;
        Ok(self.driver.run(&scenario))
    }

    /// Run `scenarios` sequentially, each in its own context.
    pub fn run_scenarios(&self, scenarios: &[Scenario]) -> SuiteReport {
        let started_at = Utc::now();
        let start = Instant::now();
        let mut results = Vec::new();
        let mut passed = 0;
        let mut failed = 0;
        let mut skipped = 0;

        info!("Running {} scenario(s)...", scenarios.len());

        for scenario in scenarios {
            let result = self.driver.run(scenario);
            if result.skipped {
                skipped += 1;
                info!("- {} (skipped)", result.name);
            } else if result.success {
                passed += 1;
                info!("✓ {} ({} ms)", result.name, result.duration_ms);
            } else {
                failed += 1;
                error!(
                    "✗ {} - {}",
                    result.name,
                    result.error.as_deref().unwrap_or("unknown error")
                );
                for failure in &result.cleanup_failures {
                    error!("  {}", failure);
                }
            }
            results.push(result);
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Results: {} passed, {} failed, {} skipped ({} ms)",
            passed, failed, skipped, duration_ms
        );

        SuiteReport {
            total: scenarios.len(),
            passed,
            failed,
            skipped,
            duration_ms,
            started_at,
            results,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write results to `<output_dir>/verify-results.json`
    pub fn write_results(&self, report: &SuiteReport) -> HarnessResult<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)?;

        let path = self.output_dir.join(RESULTS_FILE);
        let json = serde_json::to_string_pretty(report)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}
