//! Show the effective harness configuration

use std::path::Path;

use crate::output::OutputFormat;

pub fn execute(config_path: &Path, format: OutputFormat) -> anyhow::Result<bool> {
    let config = super::load_config(config_path)?;
    match format {
        OutputFormat::Table => print!("{}", toml::to_string_pretty(&config)?),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(&config)?),
    }
    Ok(true)
}
