//! Child process runner.
//!
//! A [`TestRunner`] executes one attempt of the external test command in a
//! working directory and reports how it ended. Runners never return errors:
//! a command that cannot even be spawned is reported as a failed attempt whose
//! captured output is the spawn error, so the session loop treats it exactly
//! like a failing test run.

mod go;

pub use go::{GoTestRunner, GO_PROGRAM, GO_TEST_ARGS};

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How a single attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptResult {
    /// Whether the command exited with a success status.
    pub success: bool,
    /// Combined stdout and stderr in arrival order.
    pub output: Vec<u8>,
    /// Whether the cancellation token was armed when the attempt ended.
    ///
    /// Derived from the token, never from the exit status.
    pub cancelled: bool,
    /// Exit code, if the process exited normally.
    pub exit_code: Option<i32>,
    /// Wall-clock time from spawn to exit.
    pub elapsed: Duration,
}

impl AttemptResult {
    /// A successful attempt.
    #[must_use]
    pub fn passed(output: impl Into<Vec<u8>>) -> Self {
        Self {
            success: true,
            output: output.into(),
            cancelled: false,
            exit_code: Some(0),
            elapsed: Duration::ZERO,
        }
    }

    /// An attempt that exited with a non-success status.
    #[must_use]
    pub fn failed(exit_code: Option<i32>, output: impl Into<Vec<u8>>) -> Self {
        Self {
            success: false,
            output: output.into(),
            cancelled: false,
            exit_code,
            elapsed: Duration::ZERO,
        }
    }

    /// An attempt whose command could not be started.
    #[must_use]
    pub fn spawn_failed(message: impl std::fmt::Display) -> Self {
        Self::failed(None, format!("{}\n", message))
    }

    /// Mark whether the token was armed when the attempt ended.
    #[must_use]
    pub fn with_cancelled(mut self, cancelled: bool) -> Self {
        self.cancelled = cancelled;
        self
    }

    /// Record the attempt's wall-clock duration.
    #[must_use]
    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }
}

/// Executes single attempts of the external test command.
#[async_trait]
pub trait TestRunner: Send + Sync {
    /// Human-readable command line, used in the interactive preamble.
    fn command_line(&self) -> String;

    /// Run one attempt in `directory`.
    ///
    /// Arming `cancel` must terminate the child; the call returns only once
    /// the child is gone.
    async fn run_attempt(&self, directory: &Path, cancel: &CancellationToken) -> AttemptResult;
}

#[async_trait]
impl<T: TestRunner + ?Sized> TestRunner for Arc<T> {
    fn command_line(&self) -> String {
        (**self).command_line()
    }

    async fn run_attempt(&self, directory: &Path, cancel: &CancellationToken) -> AttemptResult {
        (**self).run_attempt(directory, cancel).await
    }
}
