//! machine-verify harness
//!
//! Drives a container engine CLI that manages VM-backed machines, runs
//! declarative scenarios against it and guarantees fixture teardown:
//! - Runs engine commands as subprocesses with captured output and a timeout
//! - Isolates every test under its own `HOME`
//! - Tracks machines and containers by generated name
//! - Tears down fixtures before the directories that hold their state
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     SuiteRunner                             │
//! │    ├── run_all() / run_tagged() / run_named()               │
//! │    └── write_results() -> verify-results.json               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ScenarioDriver                                             │
//! │    ├── Scenario (YAML): steps { args, when, expect }        │
//! │    └── TestContext per scenario                             │
//! │          ├── BaseInvocation -> CommandSpec                  │
//! │          ├── ProcessRunner::run() -> RunResult              │
//! │          ├── fixtures: [Fixture { kind, name, state }]      │
//! │          └── CleanupRegistry                                │
//! │                ├── phase 1: fixtures (reverse order)        │
//! │                └── phase 2: directories (reverse order)     │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod arch;
pub mod cleanup;
pub mod command;
pub mod config;
pub mod context;
pub mod driver;
pub mod error;
pub mod fixture;
pub mod output;
pub mod process;
pub mod scenario;
pub mod suite;
pub mod version;

pub use arch::{Arch, CrossTarget};
pub use cleanup::{CleanupAction, CleanupPhase, CleanupRegistry, CleanupReport};
pub use command::{BaseInvocation, CommandSpec};
pub use config::HarnessConfig;
pub use context::TestContext;
pub use driver::{ScenarioDriver, ScenarioReport, StepReport};
pub use error::{AssertionFailure, CleanupFailure, HarnessError, HarnessResult};
pub use fixture::{Fixture, FixtureKind, FixtureState};
pub use process::{ProcessRunner, RunResult};
pub use scenario::{Expect, Scenario, ScenarioStep, StepAction, Variables};
pub use suite::{RunnerConfig, SuiteReport, SuiteRunner};
