//! Run scenarios and write the results file

use std::path::{Path, PathBuf};

use clap::Args;
use tracing::info;

use machine_verify_e2e::{RunnerConfig, SuiteRunner};

use crate::output::{print_report, OutputFormat};

#[derive(Args)]
pub struct RunArgs {
    /// Scenario directory (built-in scenarios if omitted)
    #[arg(short, long, env = "MACHINE_VERIFY_SCENARIOS")]
    pub scenarios: Option<PathBuf>,

    /// Run only scenarios matching this tag
    #[arg(short, long, conflicts_with = "name")]
    pub tag: Option<String>,

    /// Run only a specific scenario by name
    #[arg(short, long)]
    pub name: Option<String>,

    /// Engine binary
    #[arg(long)]
    pub binary: Option<PathBuf>,

    /// Per-command timeout in seconds (0 = unbounded)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Machine image for `machine init --image`
    #[arg(long)]
    pub image: Option<String>,

    /// Parent directory for per-scenario working directories
    #[arg(long)]
    pub work_root: Option<PathBuf>,

    /// Output directory for results
    #[arg(short, long, default_value = "verify-results")]
    pub output: PathBuf,
}

pub fn execute(args: RunArgs, config_path: &Path, format: OutputFormat) -> anyhow::Result<bool> {
    let mut harness = super::load_config(config_path)?;
    if let Some(binary) = args.binary {
        harness.binary = binary;
    }
    if let Some(timeout) = args.timeout {
        harness.step_timeout_secs = Some(timeout);
    }
    if let Some(image) = args.image {
        harness.machine_image = Some(image);
    }
    if let Some(work_root) = args.work_root {
        harness.work_root = Some(work_root);
    }
    harness.validate()?;

    info!("Engine: {}", harness.binary.display());

    let runner = SuiteRunner::new(RunnerConfig {
        harness,
        scenarios_dir: args.scenarios,
        output_dir: args.output,
    });

    let report = match (&args.tag, &args.name) {
        (Some(tag), _) => runner.run_tagged(tag)?,
        (None, Some(name)) => {
            let scenario = runner
                .scenarios()?
                .into_iter()
                .find(|s| s.name == *name)
                .ok_or_else(|| anyhow::anyhow!("Scenario not found: {}", name))?;
            runner.run_scenarios(std::slice::from_ref(&scenario))
        }
        (None, None) => runner.run_all()?,
    };

    runner.write_results(&report)?;
    print_report(&report, format);
    Ok(report.all_passed())
}
