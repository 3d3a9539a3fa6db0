//! Ephemeral fixtures (machines and containers) referenced by name only

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::process::RunResult;

/// Stderr fragments the engine prints when a named machine does not exist
const MACHINE_NOT_FOUND: &[&str] = &["vm does not exist", "no such vm"];

/// Stderr fragments the engine prints when a named container does not exist
const CONTAINER_NOT_FOUND: &[&str] = &[
    "no such container",
    "no container with name or id",
    "no such object",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixtureKind {
    Machine,
    Container,
}

impl FixtureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FixtureKind::Machine => "machine",
            FixtureKind::Container => "container",
        }
    }

    fn not_found_markers(&self) -> &'static [&'static str] {
        match self {
            FixtureKind::Machine => MACHINE_NOT_FOUND,
            FixtureKind::Container => CONTAINER_NOT_FOUND,
        }
    }

    /// Arguments that stop a fixture of this kind
    pub fn stop_args(&self, name: &str) -> Vec<String> {
        match self {
            FixtureKind::Machine => vec!["machine".into(), "stop".into(), name.into()],
            FixtureKind::Container => vec!["stop".into(), name.into()],
        }
    }

    /// Arguments that force-remove a fixture of this kind
    pub fn remove_args(&self, name: &str) -> Vec<String> {
        match self {
            FixtureKind::Machine => {
                vec!["machine".into(), "rm".into(), "-f".into(), name.into()]
            }
            FixtureKind::Container => vec!["rm".into(), "-f".into(), name.into()],
        }
    }

    /// Arguments that print the fixture's state on one line
    pub fn inspect_args(&self, name: &str) -> Vec<String> {
        match self {
            FixtureKind::Machine => vec![
                "machine".into(),
                "inspect".into(),
                "--format".into(),
                "{{.State}}".into(),
                name.into(),
            ],
            FixtureKind::Container => vec![
                "inspect".into(),
                "--format".into(),
                "{{.State.Status}}".into(),
                name.into(),
            ],
        }
    }
}

impl fmt::Display for FixtureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixtureState {
    Absent,
    Initializing,
    Running,
    Stopped,
    Removed,
}

impl FixtureState {
    /// Parse the engine's own state word.
    pub fn from_engine(state: &str) -> Self {
        match state.trim().to_ascii_lowercase().as_str() {
            "running" | "up" => FixtureState::Running,
            "starting" | "initializing" | "created" | "configured" => FixtureState::Initializing,
            "stopped" | "exited" | "stopping" => FixtureState::Stopped,
            "removed" => FixtureState::Removed,
            _ => FixtureState::Absent,
        }
    }

    /// Whether teardown still has something to do
    pub fn needs_teardown(&self) -> bool {
        !matches!(self, FixtureState::Absent | FixtureState::Removed)
    }
}

impl fmt::Display for FixtureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FixtureState::Absent => "absent",
            FixtureState::Initializing => "initializing",
            FixtureState::Running => "running",
            FixtureState::Stopped => "stopped",
            FixtureState::Removed => "removed",
        };
        f.write_str(s)
    }
}

/// Last known view of a fixture. The harness never holds a handle to the
/// underlying resource; [`crate::TestContext::query_state`] re-asks the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fixture {
    pub kind: FixtureKind,
    pub name: String,
    pub state: FixtureState,
}

impl Fixture {
    pub fn new(kind: FixtureKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            state: FixtureState::Absent,
        }
    }
}

/// Generate a fixture name unique across concurrently running tests.
pub fn unique_name(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, &id[..8])
}

/// Whether a failed command reported that the fixture `name` of `kind` does
/// not exist.
///
/// The stderr must carry one of the engine's resource-specific phrases and
/// mention the fixture by name. Anything else, such as a missing provider
/// binary, is a real failure.
pub fn is_not_found(result: &RunResult, kind: FixtureKind, name: &str) -> bool {
    if result.success() {
        return false;
    }
    let stderr = result.error_to_string().to_ascii_lowercase();
    stderr.contains(&name.to_ascii_lowercase())
        && kind
            .not_found_markers()
            .iter()
            .any(|marker| stderr.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;

    fn failed(stderr: &str) -> RunResult {
        RunResult::new(125, Vec::new(), stderr.as_bytes().to_vec(), Duration::ZERO)
    }

    #[test]
    fn test_unique_names_do_not_collide() {
        let names: HashSet<String> = (0..256).map(|_| unique_name("verify")).collect();
        assert_eq!(names.len(), 256);
        assert!(names.iter().all(|n| n.starts_with("verify-") && n.len() == 15));
    }

    #[test]
    fn test_not_found_detection() {
        let machine = FixtureKind::Machine;
        let container = FixtureKind::Container;
        assert!(is_not_found(
            &failed("Error: verify-1234abcd: VM does not exist\n"),
            machine,
            "verify-1234abcd"
        ));
        assert!(is_not_found(
            &failed("Error: no container with name or ID \"c1\" found: no such container"),
            container,
            "c1"
        ));
        assert!(!is_not_found(&failed("Error: permission denied"), machine, "m1"));

        let ok = RunResult::new(0, Vec::new(), b"m1: VM does not exist".to_vec(), Duration::ZERO);
        assert!(!is_not_found(&ok, machine, "m1"));
    }

    #[test]
    fn test_unrelated_not_found_is_a_real_failure() {
        let missing_provider =
            failed("Error: exec: \"vfkit\": executable file not found in $PATH\n");
        assert!(!is_not_found(&missing_provider, FixtureKind::Machine, "verify-1234abcd"));
        assert!(!is_not_found(&missing_provider, FixtureKind::Container, "vfkit"));
    }

    #[test]
    fn test_not_found_must_name_the_fixture() {
        let other = failed("Error: verify-ffffffff: VM does not exist");
        assert!(!is_not_found(&other, FixtureKind::Machine, "verify-1234abcd"));

        // A machine phrase says nothing about containers
        let machine_gone = failed("Error: c1: VM does not exist");
        assert!(!is_not_found(&machine_gone, FixtureKind::Container, "c1"));
    }

    #[test]
    fn test_state_from_engine() {
        assert_eq!(FixtureState::from_engine("running\n"), FixtureState::Running);
        assert_eq!(FixtureState::from_engine("Stopped"), FixtureState::Stopped);
        assert_eq!(FixtureState::from_engine("exited"), FixtureState::Stopped);
        assert_eq!(FixtureState::from_engine("starting"), FixtureState::Initializing);
        assert_eq!(FixtureState::from_engine("???"), FixtureState::Absent);
    }

    #[test]
    fn test_machine_commands() {
        let kind = FixtureKind::Machine;
        assert_eq!(kind.stop_args("m1"), vec!["machine", "stop", "m1"]);
        assert_eq!(kind.remove_args("m1"), vec!["machine", "rm", "-f", "m1"]);
    }

    #[test]
    fn test_container_commands() {
        let kind = FixtureKind::Container;
        assert_eq!(kind.stop_args("c1"), vec!["stop", "c1"]);
        assert_eq!(kind.remove_args("c1"), vec!["rm", "-f", "c1"]);
    }

    #[test]
    fn test_needs_teardown() {
        assert!(FixtureState::Running.needs_teardown());
        assert!(FixtureState::Stopped.needs_teardown());
        assert!(FixtureState::Initializing.needs_teardown());
        assert!(!FixtureState::Removed.needs_teardown());
        assert!(!FixtureState::Absent.needs_teardown());
    }
}
