//! Output normalization for assertions

use crate::process::RunResult;

/// Stdout with leading and trailing whitespace removed.
pub fn as_trimmed_string(result: &RunResult) -> String {
    String::from_utf8_lossy(&result.stdout).trim().to_string()
}

/// Stdout split into lines, with empty lines dropped.
///
/// A trailing newline never yields a phantom empty last entry, and empty
/// output yields an empty vector. `\r\n` endings are accepted.
pub fn as_line_sequence(result: &RunResult) -> Vec<String> {
    String::from_utf8_lossy(&result.stdout)
        .lines()
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

impl RunResult {
    pub fn output_to_string(&self) -> String {
        as_trimmed_string(self)
    }

    pub fn output_lines(&self) -> Vec<String> {
        as_line_sequence(self)
    }

    /// Trimmed stderr, for error messages and "not found" detection.
    pub fn error_to_string(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }
}
