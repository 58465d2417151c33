//! kbqa E2E Test Framework
//!
//! This crate drives the admin console through a real browser:
//! - Parses declarative YAML scenarios (login, signup, org/KB/dataset CRUD)
//! - Runs each scenario in its own browser session
//! - Captures transient toast notifications as screenshot attachments
//! - Writes a JSON summary of every run with its artifacts
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Scenario Runner (Rust)                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ScenarioRunner<L: BrowserLauncher>                         │
//! │    ├── run_scenario(spec) -> TestResult                     │
//! │    │     ├── launch() -> BrowserSession (one per scenario)  │
//! │    │     ├── execute_step(page, step, run)                  │
//! │    │     └── ToastWatcher::capture(page, run)               │
//! │    └── write_results(suite) -> test-results.json            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  RunContext: per-scenario artifact directory + attachments  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod artifact;
pub mod error;
pub mod harness;
pub mod runner;
pub mod spec;
pub mod toast;

pub use artifact::{Attachment, RunContext};
pub use error::{E2eError, E2eResult};
pub use harness::HarnessArgs;
pub use runner::ScenarioRunner;
pub use spec::{Scenario, ScenarioStep};
pub use toast::{capture_toast_screenshot, ToastWatcher};
