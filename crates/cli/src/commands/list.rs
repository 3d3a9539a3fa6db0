//! List available scenarios

use std::path::PathBuf;

use clap::Args;
use machine_verify_e2e::Scenario;

use crate::output::{print_list, OutputFormat};

#[derive(Args)]
pub struct ListArgs {
    /// Scenario directory (built-in scenarios if omitted)
    #[arg(short, long, env = "MACHINE_VERIFY_SCENARIOS")]
    pub scenarios: Option<PathBuf>,

    /// Only scenarios with this tag
    #[arg(short, long)]
    pub tag: Option<String>,
}

pub fn execute(args: ListArgs, format: OutputFormat) -> anyhow::Result<bool> {
    let scenarios = match &args.scenarios {
        Some(dir) => Scenario::load_all(dir)?,
        None => Scenario::builtin()?,
    };
    let selected: Vec<Scenario> = match &args.tag {
        Some(tag) => Scenario::filter_by_tag(&scenarios, tag)
            .into_iter()
            .cloned()
            .collect(),
        None => scenarios,
    };
    print_list(&selected, format);
    Ok(true)
}
