//! Mock implementations for the runner and presenter seams.
//!
//! These mocks provide controllable test doubles for the external test
//! command and the terminal, enabling deterministic unit tests of the loop.

use async_trait::async_trait;
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::presenter::Presenter;
use crate::runner::{AttemptResult, TestRunner};
use crate::session::RunOutcome;

/// Scripted behaviour of one mock attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockAttempt {
    /// Exit successfully.
    Pass,
    /// Exit with status 1 and the given output.
    Fail(Vec<u8>),
    /// Arm the cancellation token mid-attempt, as a signal would, then die.
    Interrupt,
    /// Report death by cancellation without touching the token.
    Killed,
    /// Block until the cancellation token is armed.
    Hang,
}

/// Mock implementation of the test runner.
///
/// # Example
///
/// ```rust,ignore
/// let runner = MockTestRunner::new()
///     .with_script(vec![MockAttempt::Pass, MockAttempt::Fail(b"boom\n".to_vec())]);
///
/// let result = runner.run_attempt(Path::new("."), &CancellationToken::new()).await;
/// assert!(result.success);
/// assert_eq!(runner.call_count(), 1);
/// ```
#[derive(Debug)]
pub struct MockTestRunner {
    script: Vec<MockAttempt>,
    fallback: MockAttempt,
    delay: Duration,
    calls: AtomicU32,
    running: AtomicU32,
    max_running: AtomicU32,
}

impl Default for MockTestRunner {
    fn default() -> Self {
        Self {
            script: Vec::new(),
            fallback: MockAttempt::Pass,
            delay: Duration::ZERO,
            calls: AtomicU32::new(0),
            running: AtomicU32::new(0),
            max_running: AtomicU32::new(0),
        }
    }
}

impl MockTestRunner {
    /// Create a mock whose attempts always pass.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Behaviour of the first attempts, in order.
    #[must_use]
    pub fn with_script(mut self, script: Vec<MockAttempt>) -> Self {
        self.script = script;
        self
    }

    /// Behaviour once the script is exhausted.
    #[must_use]
    pub fn with_fallback(mut self, attempt: MockAttempt) -> Self {
        self.fallback = attempt;
        self
    }

    /// Simulated duration of every attempt.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of attempts started so far.
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of attempts observed running at the same time.
    pub fn max_concurrent(&self) -> u32 {
        self.max_running.load(Ordering::SeqCst)
    }

    async fn perform(&self, attempt: &MockAttempt, number: u32, cancel: &CancellationToken) -> AttemptResult {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match attempt {
            MockAttempt::Pass => AttemptResult::passed(format!("ok attempt {}\n", number)),
            MockAttempt::Fail(output) => AttemptResult::failed(Some(1), output.clone()),
            MockAttempt::Interrupt => {
                cancel.cancel();
                AttemptResult::failed(None, "signal: interrupt\n")
            }
            MockAttempt::Killed => AttemptResult::failed(None, "signal: killed\n").with_cancelled(true),
            MockAttempt::Hang => {
                cancel.cancelled().await;
                AttemptResult::failed(None, "signal: killed\n")
            }
        }
    }
}

#[async_trait]
impl TestRunner for MockTestRunner {
    fn command_line(&self) -> String {
        "mock test".to_string()
    }

    async fn run_attempt(&self, _directory: &Path, cancel: &CancellationToken) -> AttemptResult {
        let number = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(running, Ordering::SeqCst);

        let attempt = self
            .script
            .get(number as usize - 1)
            .unwrap_or(&self.fallback)
            .clone();
        let result = self.perform(&attempt, number, cancel).await;

        self.running.fetch_sub(1, Ordering::SeqCst);
        let cancelled = result.cancelled || cancel.is_cancelled();
        result.with_cancelled(cancelled)
    }
}

/// Event recorded by [`RecordingPresenter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenterEvent {
    RunStarted { command: String, attempts: u32 },
    AttemptStarted(u32),
    AttemptFinished(u32),
    AttemptPassed(u32),
    RunFinished(RunOutcome),
}

/// Presenter that records every call it receives.
#[derive(Debug, Clone, Default)]
pub struct RecordingPresenter {
    events: Vec<PresenterEvent>,
}

impl RecordingPresenter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[PresenterEvent] {
        &self.events
    }

    /// Attempts that received a success pulse, in order.
    pub fn passed_attempts(&self) -> Vec<u32> {
        self.events
            .iter()
            .filter_map(|event| match event {
                PresenterEvent::AttemptPassed(attempt) => Some(*attempt),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Presenter for RecordingPresenter {
    async fn run_started(&mut self, command: &str, attempts: u32) -> Result<()> {
        self.events.push(PresenterEvent::RunStarted {
            command: command.to_string(),
            attempts,
        });
        Ok(())
    }

    async fn attempt_started(&mut self, attempt: u32) -> Result<()> {
        self.events.push(PresenterEvent::AttemptStarted(attempt));
        Ok(())
    }

    async fn attempt_finished(&mut self, attempt: u32) -> Result<()> {
        self.events.push(PresenterEvent::AttemptFinished(attempt));
        Ok(())
    }

    async fn attempt_passed(&mut self, attempt: u32) -> Result<()> {
        self.events.push(PresenterEvent::AttemptPassed(attempt));
        Ok(())
    }

    async fn run_finished(&mut self, outcome: &RunOutcome) -> Result<()> {
        self.events.push(PresenterEvent::RunFinished(outcome.clone()));
        Ok(())
    }
}

/// In-memory terminal shared between clones.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Vec<u8> {
        self.bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn contents_string(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
