//! Presentation of run progress and outcomes.
//!
//! The session loop reports to a [`Presenter`]; which one is chosen at entry:
//!
//! - [`InteractivePresenter`] renders a spinner, a dot per passing attempt and
//!   a final banner on a terminal.
//! - [`ToolPresenter`] stays silent and keeps only the terminal outcome, as a
//!   [`FlakeReport`] for the MCP tool result.

mod interactive;
mod report;

pub use interactive::{InteractivePresenter, SPINNER_FRAMES};
pub use report::{FlakeReport, ToolPresenter};

use async_trait::async_trait;

use crate::error::Result;
use crate::session::RunOutcome;

/// Receives per-run and per-attempt events from the session loop.
///
/// Calls arrive in a fixed order: `run_started`, then for each attempt
/// `attempt_started` / `attempt_finished` (followed by `attempt_passed` when
/// it passed), and finally exactly one `run_finished`.
#[async_trait]
pub trait Presenter: Send {
    /// Called once before the first attempt.
    async fn run_started(&mut self, command: &str, attempts: u32) -> Result<()>;

    /// Called right before the child for `attempt` is spawned.
    async fn attempt_started(&mut self, attempt: u32) -> Result<()>;

    /// Called right after the child for `attempt` has exited.
    async fn attempt_finished(&mut self, attempt: u32) -> Result<()>;

    /// Called after `attempt` exited successfully.
    async fn attempt_passed(&mut self, attempt: u32) -> Result<()>;

    /// Called once with the terminal outcome.
    async fn run_finished(&mut self, outcome: &RunOutcome) -> Result<()>;
}
