//! Output formatting for CLI

use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

use machine_verify_e2e::{Scenario, ScenarioReport, SuiteReport};

/// Output format
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
    /// YAML format
    Yaml,
}

/// Trait for items that can be displayed in a table
pub trait TableDisplay {
    fn headers() -> Vec<&'static str>;
    fn row(&self) -> Vec<String>;
}

impl TableDisplay for Scenario {
    fn headers() -> Vec<&'static str> {
        vec!["Name", "Tags", "Machine", "Steps", "Description"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.tags.join(", "),
            if self.machine { "yes" } else { "no" }.to_string(),
            self.steps.len().to_string(),
            self.description.clone(),
        ]
    }
}

impl TableDisplay for ScenarioReport {
    fn headers() -> Vec<&'static str> {
        vec!["Scenario", "Result", "Duration", "Detail"]
    }

    fn row(&self) -> Vec<String> {
        let result = if self.skipped {
            "skipped"
        } else if self.success {
            "passed"
        } else {
            "FAILED"
        };
        let mut detail = self.error.clone().unwrap_or_default();
        for failure in &self.cleanup_failures {
            if !detail.is_empty() {
                detail.push('\n');
            }
            detail.push_str(&failure.to_string());
        }
        vec![
            self.name.clone(),
            result.to_string(),
            format!("{:.1}s", self.duration_ms as f64 / 1000.0),
            detail,
        ]
    }
}

/// Print a list of items
pub fn print_list<T: Serialize + TableDisplay>(items: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                println!("No items found.");
                return;
            }
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic);

            table.set_header(T::headers());
            for item in items {
                table.add_row(item.row());
            }

            println!("{table}");
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(items).unwrap_or_default());
        }
        OutputFormat::Yaml => {
            println!("{}", serde_yaml::to_string(items).unwrap_or_default());
        }
    }
}

/// Print a suite report with a one-line summary
pub fn print_report(report: &SuiteReport, format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            print_list(&report.results, format);
            let summary = format!(
                "{} passed, {} failed, {} skipped in {:.1}s",
                report.passed,
                report.failed,
                report.skipped,
                report.duration_ms as f64 / 1000.0
            );
            if report.all_passed() {
                print_success(&summary);
            } else {
                print_error(&summary);
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report).unwrap_or_default());
        }
        OutputFormat::Yaml => {
            println!("{}", serde_yaml::to_string(report).unwrap_or_default());
        }
    }
}

/// Print success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "Error:".red().bold(), message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use machine_verify_e2e::CleanupFailure;

    fn report(success: bool, skipped: bool) -> ScenarioReport {
        ScenarioReport {
            name: "basic-ops".to_string(),
            success,
            skipped,
            duration_ms: 1500,
            steps: Vec::new(),
            error: None,
            cleanup_failures: Vec::new(),
        }
    }

    #[test]
    fn test_report_row_result_column() {
        assert_eq!(report(true, false).row()[1], "passed");
        assert_eq!(report(true, true).row()[1], "skipped");
        assert_eq!(report(false, false).row()[1], "FAILED");
        assert_eq!(report(true, false).row()[2], "1.5s");
    }

    #[test]
    fn test_report_row_lists_cleanup_failures() {
        let mut failed = report(false, false);
        failed.error = Some("1 cleanup action(s) failed".to_string());
        failed.cleanup_failures.push(CleanupFailure {
            action: "remove machine verify-0123abcd".to_string(),
            reason: "exit 125".to_string(),
        });
        let detail = &failed.row()[3];
        assert!(detail.starts_with("1 cleanup action(s) failed\n"));
        assert!(detail.contains("remove machine verify-0123abcd"));
    }
}
