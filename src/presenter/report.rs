//! Structured run report for the MCP tool.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::Presenter;
use crate::error::Result;
use crate::session::RunOutcome;

/// Result object returned by `run_flake_tests`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlakeReport {
    /// True iff every attempt passed.
    pub success: bool,
    /// Attempts reported by the outcome.
    pub attempts: u32,
    /// Human-readable summary; the captured test output on failure.
    pub output: String,
    /// Present (and true) only for interrupted runs.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub interrupted: bool,
    /// Present only for failed runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl FlakeReport {
    #[must_use]
    pub fn from_outcome(outcome: &RunOutcome) -> Self {
        match outcome {
            RunOutcome::Passed { attempts } => Self {
                success: true,
                attempts: *attempts,
                output: outcome.summary(),
                interrupted: false,
                error_message: None,
            },
            RunOutcome::Failed { attempt, output } => Self {
                success: false,
                attempts: *attempt,
                output: String::from_utf8_lossy(output).into_owned(),
                interrupted: false,
                error_message: Some(outcome.summary()),
            },
            RunOutcome::Interrupted { completed } => Self {
                success: false,
                attempts: *completed,
                output: outcome.summary(),
                interrupted: true,
                error_message: None,
            },
        }
    }

    /// Text shown to the agent alongside the structured result.
    #[must_use]
    pub fn message(&self, directory: &Path) -> String {
        if let Some(error_message) = &self.error_message {
            format!(
                "Tests failed after {} attempts in directory: {}\n\nOutput:\n{}\n\nError: {}",
                self.attempts,
                directory.display(),
                self.output,
                error_message
            )
        } else if self.interrupted {
            format!(
                "Tests interrupted after {} attempts in directory: {}",
                self.attempts,
                directory.display()
            )
        } else {
            format!(
                "All {} test attempts passed successfully in directory: {}",
                self.attempts,
                directory.display()
            )
        }
    }
}

/// Silent presenter that keeps only the terminal outcome.
#[derive(Debug, Default)]
pub struct ToolPresenter {
    report: Option<FlakeReport>,
}

impl ToolPresenter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The report, once the run has finished.
    #[must_use]
    pub fn report(&self) -> Option<&FlakeReport> {
        self.report.as_ref()
    }

    #[must_use]
    pub fn into_report(self) -> Option<FlakeReport> {
        self.report
    }
}

#[async_trait]
impl Presenter for ToolPresenter {
    async fn run_started(&mut self, _command: &str, _attempts: u32) -> Result<()> {
        Ok(())
    }

    async fn attempt_started(&mut self, _attempt: u32) -> Result<()> {
        Ok(())
    }

    async fn attempt_finished(&mut self, _attempt: u32) -> Result<()> {
        Ok(())
    }

    async fn attempt_passed(&mut self, _attempt: u32) -> Result<()> {
        Ok(())
    }

    async fn run_finished(&mut self, outcome: &RunOutcome) -> Result<()> {
        self.report = Some(FlakeReport::from_outcome(outcome));
        Ok(())
    }
}
