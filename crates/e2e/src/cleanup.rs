//! Cleanup registry with a fixed two-phase teardown order
//!
//! Actions run in reverse registration order inside each phase, and every
//! fixture action runs before any directory action. Removing the isolated
//! home before machines are gone strands live VMs, so the phase rule wins
//! over registration order.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::CleanupFailure;
use crate::fixture::FixtureKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanupPhase {
    Fixtures,
    Directories,
}

pub type CleanupCallback = Box<dyn FnOnce() -> Result<(), String> + Send>;

/// A deferred teardown step
pub enum CleanupAction {
    /// Force-remove a named fixture. Already gone counts as done.
    RemoveFixture { kind: FixtureKind, name: String },

    /// Run an engine command that must exit 0, e.g. `machine reset -f`.
    Engine { label: String, args: Vec<String> },

    /// Delete a directory tree.
    RemoveDir { path: PathBuf },

    /// Anything else, in an explicit phase.
    Custom {
        label: String,
        phase: CleanupPhase,
        callback: CleanupCallback,
    },
}

impl CleanupAction {
    pub fn phase(&self) -> CleanupPhase {
        match self {
            CleanupAction::RemoveFixture { .. } | CleanupAction::Engine { .. } => {
                CleanupPhase::Fixtures
            }
            CleanupAction::RemoveDir { .. } => CleanupPhase::Directories,
            CleanupAction::Custom { phase, .. } => *phase,
        }
    }

    pub fn label(&self) -> String {
        match self {
            CleanupAction::RemoveFixture { kind, name } => format!("remove {} {}", kind, name),
            CleanupAction::Engine { label, .. } => label.clone(),
            CleanupAction::RemoveDir { path } => format!("remove dir {}", path.display()),
            CleanupAction::Custom { label, .. } => label.clone(),
        }
    }

    pub fn custom<F>(label: impl Into<String>, phase: CleanupPhase, callback: F) -> Self
    where
        F: FnOnce() -> Result<(), String> + Send + 'static,
    {
        CleanupAction::Custom {
            label: label.into(),
            phase,
            callback: Box::new(callback),
        }
    }
}

impl fmt::Debug for CleanupAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanupAction")
            .field("phase", &self.phase())
            .field("label", &self.label())
            .finish()
    }
}

/// Outcome of a teardown pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    /// Labels in execution order
    pub executed: Vec<String>,
    pub failures: Vec<CleanupFailure>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn merge(&mut self, other: CleanupReport) {
        self.executed.extend(other.executed);
        self.failures.extend(other.failures);
    }
}

/// Ordered list of pending cleanup actions for one test
#[derive(Debug, Default)]
pub struct CleanupRegistry {
    actions: Vec<CleanupAction>,
}

impl CleanupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, action: CleanupAction) {
        debug!("Registered cleanup: {}", action.label());
        self.actions.push(action);
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Take every pending action in execution order, leaving the registry empty.
    pub fn drain_ordered(&mut self) -> Vec<CleanupAction> {
        let mut actions: Vec<CleanupAction> = self.actions.drain(..).rev().collect();
        // Stable: reverse registration order is kept within a phase.
        actions.sort_by_key(CleanupAction::phase);
        actions
    }

    /// Execute every pending action with `execute`, best effort.
    ///
    /// A failing action is recorded and the remaining ones still run.
    pub fn run_with<F>(&mut self, mut execute: F) -> CleanupReport
    where
        F: FnMut(CleanupAction) -> Result<(), String>,
    {
        let mut report = CleanupReport::default();
        for action in self.drain_ordered() {
            let label = action.label();
            debug!("Cleanup: {}", label);
            if let Err(reason) = execute(action) {
                error!("Cleanup '{}' failed: {}", label, reason);
                report.failures.push(CleanupFailure {
                    action: label.clone(),
                    reason,
                });
            }
            report.executed.push(label);
        }
        report
    }
}
