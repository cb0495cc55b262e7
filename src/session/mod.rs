//! The repetition loop.
//!
//! [`FlakeSession`] drives up to N attempts of a [`TestRunner`], stopping at
//! the first failure. Both presentation modes go through the same loop, so
//! the interactive terminal and the MCP tool agree on every outcome.
//!
//! # Decision order
//!
//! ```text
//! for attempt in 1..=N
//!    │
//!    ├─ token armed? ──────────────────────► Interrupted(attempt - 1)
//!    │
//!    ├─ presenter.attempt_started
//!    ├─ runner.run_attempt
//!    ├─ presenter.attempt_finished
//!    │
//!    ├─ non-success and (token armed or child cancelled) ► Interrupted(attempt - 1)
//!    ├─ non-success ───────────────────────► Failed(attempt, output)
//!    └─ presenter.attempt_passed, continue
//!
//! Passed(N)
//! ```
//!
//! Cancellation is checked before the exit status is interpreted: a child that
//! died because the user asked to stop is never reported as a test failure.

mod outcome;

pub use outcome::RunOutcome;

use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::FlakeConfig;
use crate::error::Result;
use crate::presenter::Presenter;
use crate::runner::TestRunner;

/// One flake run over a directory.
#[derive(Debug, Clone)]
pub struct FlakeSession<R> {
    runner: R,
    config: FlakeConfig,
}

impl<R: TestRunner> FlakeSession<R> {
    #[must_use]
    pub fn new(runner: R, config: FlakeConfig) -> Self {
        Self { runner, config }
    }

    #[must_use]
    pub fn config(&self) -> &FlakeConfig {
        &self.config
    }

    #[must_use]
    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Run the loop in `directory`, reporting progress to `presenter`.
    ///
    /// # Errors
    ///
    /// Returns an error only if the presenter cannot write its output. Test
    /// failures and interruptions are outcomes, not errors.
    pub async fn run<P>(
        &self,
        directory: &Path,
        presenter: &mut P,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome>
    where
        P: Presenter + ?Sized,
    {
        info!(
            "Running '{}' up to {} times in {}",
            self.runner.command_line(),
            self.config.attempts,
            directory.display()
        );
        presenter
            .run_started(&self.runner.command_line(), self.config.attempts)
            .await?;

        let outcome = self.repeat(directory, presenter, cancel).await?;

        info!("Run finished: {}", outcome.summary());
        presenter.run_finished(&outcome).await?;
        Ok(outcome)
    }

    async fn repeat<P>(
        &self,
        directory: &Path,
        presenter: &mut P,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome>
    where
        P: Presenter + ?Sized,
    {
        for attempt in 1..=self.config.attempts {
            if cancel.is_cancelled() {
                return Ok(RunOutcome::Interrupted {
                    completed: attempt - 1,
                });
            }

            presenter.attempt_started(attempt).await?;
            let result = self.runner.run_attempt(directory, cancel).await;
            presenter.attempt_finished(attempt).await?;

            debug!(
                "Attempt {}/{}: success={} exit={:?} elapsed={:?}",
                attempt, self.config.attempts, result.success, result.exit_code, result.elapsed
            );

            if !result.success {
                if cancel.is_cancelled() || result.cancelled {
                    return Ok(RunOutcome::Interrupted {
                        completed: attempt - 1,
                    });
                }
                return Ok(RunOutcome::Failed {
                    attempt,
                    output: result.output,
                });
            }

            presenter.attempt_passed(attempt).await?;
        }

        Ok(RunOutcome::Passed {
            attempts: self.config.attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockAttempt, MockTestRunner, PresenterEvent, RecordingPresenter};
    use std::sync::Arc;
    use std::time::Duration;

    fn session(runner: MockTestRunner, attempts: u32) -> FlakeSession<Arc<MockTestRunner>> {
        FlakeSession::new(Arc::new(runner), FlakeConfig::new().with_attempts(attempts))
    }

    async fn run(session: &FlakeSession<Arc<MockTestRunner>>) -> (RunOutcome, RecordingPresenter) {
        let mut presenter = RecordingPresenter::new();
        let outcome = session
            .run(Path::new("."), &mut presenter, &CancellationToken::new())
            .await
            .expect("run");
        (outcome, presenter)
    }

    #[tokio::test]
    async fn test_all_attempts_pass() {
        let session = session(MockTestRunner::new(), 5);

        let (outcome, presenter) = run(&session).await;

        assert_eq!(outcome, RunOutcome::Passed { attempts: 5 });
        assert_eq!(session.runner().call_count(), 5);
        assert_eq!(presenter.passed_attempts(), vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_zero_attempts_never_spawns() {
        let session = session(MockTestRunner::new(), 0);

        let (outcome, presenter) = run(&session).await;

        assert_eq!(outcome, RunOutcome::Passed { attempts: 0 });
        assert_eq!(session.runner().call_count(), 0);
        assert_eq!(
            presenter.events(),
            &[
                PresenterEvent::RunStarted {
                    command: "mock test".to_string(),
                    attempts: 0
                },
                PresenterEvent::RunFinished(RunOutcome::Passed { attempts: 0 }),
            ]
        );
    }

    #[tokio::test]
    async fn test_stops_at_first_failure() {
        let runner = MockTestRunner::new().with_script(vec![
            MockAttempt::Pass,
            MockAttempt::Pass,
            MockAttempt::Fail(b"boom\n".to_vec()),
        ]);
        let session = session(runner, 10);

        let (outcome, presenter) = run(&session).await;

        assert_eq!(
            outcome,
            RunOutcome::Failed {
                attempt: 3,
                output: b"boom\n".to_vec()
            }
        );
        assert_eq!(session.runner().call_count(), 3);
        assert_eq!(presenter.passed_attempts(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_failure_with_no_output() {
        let runner = MockTestRunner::new().with_fallback(MockAttempt::Fail(Vec::new()));
        let session = session(runner, 4);

        let (outcome, _) = run(&session).await;

        assert_eq!(
            outcome,
            RunOutcome::Failed {
                attempt: 1,
                output: Vec::new()
            }
        );
    }

    #[tokio::test]
    async fn test_interruption_during_attempt_is_not_a_failure() {
        let runner = MockTestRunner::new().with_script(vec![
            MockAttempt::Pass,
            MockAttempt::Pass,
            MockAttempt::Pass,
            MockAttempt::Interrupt,
        ]);
        let session = session(runner, 10);

        let (outcome, presenter) = run(&session).await;

        assert_eq!(outcome, RunOutcome::Interrupted { completed: 3 });
        assert_eq!(session.runner().call_count(), 4);
        assert_eq!(presenter.passed_attempts(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_token_armed_before_first_attempt() {
        let session = session(MockTestRunner::new(), 10);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut presenter = RecordingPresenter::new();
        let outcome = session
            .run(Path::new("."), &mut presenter, &cancel)
            .await
            .expect("run");

        assert_eq!(outcome, RunOutcome::Interrupted { completed: 0 });
        assert_eq!(session.runner().call_count(), 0);
    }

    #[tokio::test]
    async fn test_hanging_attempt_is_interrupted_by_token() {
        let runner = MockTestRunner::new().with_script(vec![
            MockAttempt::Pass,
            MockAttempt::Pass,
            MockAttempt::Pass,
            MockAttempt::Hang,
        ]);
        let session = session(runner, 10);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let mut presenter = RecordingPresenter::new();
        let outcome = session
            .run(Path::new("."), &mut presenter, &cancel)
            .await
            .expect("run");

        assert_eq!(outcome, RunOutcome::Interrupted { completed: 3 });
    }

    #[tokio::test]
    async fn test_cancelled_flag_alone_means_interrupted() {
        // The child reports it was killed by cancellation even though the
        // token observed by the loop is a different one.
        let runner = MockTestRunner::new().with_fallback(MockAttempt::Killed);
        let session = session(runner, 3);

        let (outcome, _) = run(&session).await;

        assert_eq!(outcome, RunOutcome::Interrupted { completed: 0 });
    }

    #[tokio::test]
    async fn test_cancelling_twice_matches_cancelling_once() {
        let session = session(MockTestRunner::new(), 3);

        let once = CancellationToken::new();
        once.cancel();
        let twice = CancellationToken::new();
        twice.cancel();
        twice.cancel();

        let mut presenter = RecordingPresenter::new();
        let first = session.run(Path::new("."), &mut presenter, &once).await.unwrap();
        let second = session.run(Path::new("."), &mut presenter, &twice).await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_deterministic_runner_gives_identical_outcomes() {
        let script = vec![MockAttempt::Pass, MockAttempt::Fail(b"x".to_vec())];
        let first = session(MockTestRunner::new().with_script(script.clone()), 5);
        let second = session(MockTestRunner::new().with_script(script), 5);

        assert_eq!(run(&first).await.0, run(&second).await.0);
    }

    #[tokio::test]
    async fn test_attempts_never_overlap() {
        let runner = MockTestRunner::new().with_delay(Duration::from_millis(5));
        let session = session(runner, 8);

        run(&session).await;

        assert_eq!(session.runner().max_concurrent(), 1);
    }

    #[tokio::test]
    async fn test_presenter_event_order() {
        let runner = MockTestRunner::new()
            .with_script(vec![MockAttempt::Pass, MockAttempt::Fail(b"f".to_vec())]);
        let session = session(runner, 5);

        let (outcome, presenter) = run(&session).await;

        assert_eq!(
            presenter.events(),
            &[
                PresenterEvent::RunStarted {
                    command: "mock test".to_string(),
                    attempts: 5
                },
                PresenterEvent::AttemptStarted(1),
                PresenterEvent::AttemptFinished(1),
                PresenterEvent::AttemptPassed(1),
                PresenterEvent::AttemptStarted(2),
                PresenterEvent::AttemptFinished(2),
                PresenterEvent::RunFinished(outcome),
            ]
        );
    }
}
