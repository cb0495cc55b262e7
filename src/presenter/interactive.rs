//! Terminal presenter: spinner, dot stream and final banner.

use async_trait::async_trait;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::Presenter;
use crate::error::Result;
use crate::session::RunOutcome;

/// Spinner glyphs, cycled while an attempt runs.
pub const SPINNER_FRAMES: [&str; 4] = ["|", "/", "-", "\\"];

const BACKSPACE: &str = "\x08";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

/// Writes human-readable progress to a terminal.
///
/// The writer is shared with the spinner task, which is always stopped and
/// joined before anything else is written, so frames never interleave with
/// dots or banners.
pub struct InteractivePresenter<W: Write + Send + 'static> {
    out: Arc<Mutex<W>>,
    spinner_interval: Duration,
    spinner: Option<Spinner>,
}

struct Spinner {
    stop: CancellationToken,
    handle: JoinHandle<()>,
}

impl InteractivePresenter<io::Stdout> {
    /// Presenter writing to the process's standard output.
    #[must_use]
    pub fn stdout(spinner_interval: Duration) -> Self {
        Self::new(io::stdout(), spinner_interval)
    }
}

impl<W: Write + Send + 'static> InteractivePresenter<W> {
    #[must_use]
    pub fn new(out: W, spinner_interval: Duration) -> Self {
        Self {
            out: Arc::new(Mutex::new(out)),
            spinner_interval,
            spinner: None,
        }
    }

    fn write(&self, text: &[u8]) -> io::Result<()> {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        out.write_all(text)?;
        out.flush()
    }

    fn start_spinner(&mut self) {
        let stop = CancellationToken::new();
        let out = Arc::clone(&self.out);
        let interval = self.spinner_interval;
        let stopped = stop.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            for frame in SPINNER_FRAMES.iter().cycle() {
                tokio::select! {
                    biased;
                    () = stopped.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                if let Err(e) = write_frame(&out, frame) {
                    debug!("Spinner stopped: {}", e);
                    break;
                }
            }
        });

        self.spinner = Some(Spinner { stop, handle });
    }

    async fn stop_spinner(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.stop.cancel();
            if let Err(e) = spinner.handle.await {
                debug!("Spinner task ended abnormally: {}", e);
            }
        }
    }
}

/// Draw one frame and step back over it.
fn write_frame<W: Write>(out: &Mutex<W>, frame: &str) -> io::Result<()> {
    let mut out = out.lock().unwrap_or_else(PoisonError::into_inner);
    out.write_all(frame.as_bytes())?;
    out.write_all(BACKSPACE.as_bytes())?;
    out.flush()
}

impl<W: Write + Send + 'static> Drop for InteractivePresenter<W> {
    fn drop(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.stop.cancel();
            spinner.handle.abort();
        }
    }
}

#[async_trait]
impl<W: Write + Send + 'static> Presenter for InteractivePresenter<W> {
    async fn run_started(&mut self, command: &str, attempts: u32) -> Result<()> {
        let line = format!(
            "Running '{}' up to {} times (use -h for help)\n",
            command, attempts
        );
        self.write(line.as_bytes())?;
        Ok(())
    }

    async fn attempt_started(&mut self, _attempt: u32) -> Result<()> {
        self.stop_spinner().await;
        self.start_spinner();
        Ok(())
    }

    async fn attempt_finished(&mut self, _attempt: u32) -> Result<()> {
        self.stop_spinner().await;
        self.write(format!(" {}", BACKSPACE).as_bytes())?;
        Ok(())
    }

    async fn attempt_passed(&mut self, _attempt: u32) -> Result<()> {
        self.write(b".")?;
        Ok(())
    }

    async fn run_finished(&mut self, outcome: &RunOutcome) -> Result<()> {
        self.stop_spinner().await;

        let mut text = Vec::new();
        match outcome {
            RunOutcome::Failed { attempt, output } => {
                text.extend_from_slice(format!("\n{}:\n", outcome.summary()).as_bytes());
                text.extend_from_slice(output);
                text.extend_from_slice(
                    format!("{}Test failed after {} attempts{}\n", RED, attempt, RESET).as_bytes(),
                );
            }
            RunOutcome::Interrupted { .. } | RunOutcome::Passed { .. } => {
                text.extend_from_slice(format!("\n{}\n", outcome.summary()).as_bytes());
            }
        }
        self.write(&text)?;
        Ok(())
    }
}
