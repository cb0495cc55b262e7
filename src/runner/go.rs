//! `go test` runner.
//!
//! Spawns `go test -race -count=1 -v ./...` with stdout and stderr attached to
//! the write end of a single pipe, so the captured bytes interleave exactly as
//! the child wrote them.

use async_trait::async_trait;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::process::Command as AsyncCommand;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{AttemptResult, TestRunner};
use crate::config::DEFAULT_DRAIN_TIMEOUT;

/// Test runner executable, resolved on `PATH`.
pub const GO_PROGRAM: &str = "go";

/// Fixed argument vector: verbose, race detector on, test cache off, every package.
pub const GO_TEST_ARGS: [&str; 5] = ["test", "-race", "-count=1", "-v", "./..."];

const READ_CHUNK: usize = 8 * 1024;

/// Runs the Go test suite of a directory once per attempt.
#[derive(Debug, Clone)]
pub struct GoTestRunner {
    program: PathBuf,
    drain_timeout: Duration,
}

impl Default for GoTestRunner {
    fn default() -> Self {
        Self {
            program: PathBuf::from(GO_PROGRAM),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

impl GoTestRunner {
    /// Create a runner for `go` on `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set how long to keep reading output after the child exits.
    #[must_use]
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    #[cfg(test)]
    fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    async fn execute(&self, directory: &Path, cancel: &CancellationToken) -> io::Result<AttemptResult> {
        let program = which::which(&self.program).map_err(|e| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("failed to run '{}': {}", self.program.display(), e),
            )
        })?;

        let (reader, writer) = io::pipe()?;
        let stderr_writer = writer.try_clone()?;

        let mut command = AsyncCommand::new(&program);
        command
            .args(GO_TEST_ARGS)
            .current_dir(directory)
            .stdin(Stdio::null())
            .stdout(writer)
            .stderr(stderr_writer)
            .kill_on_drop(true);
        // The child leads its own process group so that cancellation reaches
        // the compiled test binaries `go test` spawns, not just `go` itself.
        #[cfg(unix)]
        command.process_group(0);

        let started = Instant::now();
        let spawned = command.spawn();
        // The command still owns our copies of the write end; release them so
        // the reader sees EOF once the child (and its descendants) close theirs.
        drop(command);
        let mut child = spawned.map_err(|e| {
            io::Error::new(
                e.kind(),
                format!("failed to run '{}': {}", program.display(), e),
            )
        })?;

        let group = child.id();
        debug!(
            "Spawned {} (pid {:?}) in {}",
            program.display(),
            group,
            directory.display()
        );

        // A plain thread rather than spawn_blocking: a descendant that keeps the
        // pipe open must not hold up runtime shutdown.
        let captured = Arc::new(Mutex::new(Vec::new()));
        let (drained_tx, mut drained) = tokio::sync::oneshot::channel();
        {
            let captured = Arc::clone(&captured);
            std::thread::Builder::new()
                .name("flake-output".to_string())
                .spawn(move || {
                    drain_pipe(reader, &captured);
                    let _ = drained_tx.send(());
                })?;
        }

        let status: ExitStatus = tokio::select! {
            status = child.wait() => status?,
            () = cancel.cancelled() => {
                debug!("Cancellation armed, killing process group of pid {:?}", group);
                kill_group(group);
                if let Err(e) = child.start_kill() {
                    debug!("Kill failed (child already exited?): {}", e);
                }
                child.wait().await?
            }
        };
        let elapsed = started.elapsed();

        if cancel.is_cancelled() {
            // A signal may arrive between the child's exit and the select.
            kill_group(group);
        }

        if tokio::time::timeout(self.drain_timeout, &mut drained).await.is_err() {
            warn!(
                "Output pipe still open {:?} after exit; killing leftover processes",
                self.drain_timeout
            );
            kill_group(group);
            if tokio::time::timeout(self.drain_timeout, &mut drained).await.is_err() {
                warn!("Output pipe still open after killing the process group");
            }
        }

        let output = std::mem::take(&mut *captured.lock().unwrap_or_else(PoisonError::into_inner));

        debug!(
            "Attempt exited with {:?} after {:?} ({} bytes captured)",
            status.code(),
            elapsed,
            output.len()
        );

        let result = if status.success() {
            AttemptResult::passed(output)
        } else {
            AttemptResult::failed(status.code(), output)
        };
        Ok(result
            .with_cancelled(cancel.is_cancelled())
            .with_elapsed(elapsed))
    }
}

/// SIGKILL every process in the group led by `leader`.
#[cfg(unix)]
fn kill_group(leader: Option<u32>) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = leader.and_then(|pid| i32::try_from(pid).ok()) else {
        return;
    };
    match killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        Ok(()) => debug!("Killed process group {}", pid),
        // ESRCH: every member has already exited.
        Err(e) => debug!("killpg({}) failed: {}", pid, e),
    }
}

#[cfg(not(unix))]
fn kill_group(_leader: Option<u32>) {}

/// Copy everything from the pipe into `captured` until EOF.
fn drain_pipe(mut reader: io::PipeReader, captured: &Mutex<Vec<u8>>) {
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => captured
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!("Stopped reading test output: {}", e);
                break;
            }
        }
    }
}

#[async_trait]
impl TestRunner for GoTestRunner {
    fn command_line(&self) -> String {
        format!("{} {}", GO_PROGRAM, GO_TEST_ARGS.join(" "))
    }

    async fn run_attempt(&self, directory: &Path, cancel: &CancellationToken) -> AttemptResult {
        match self.execute(directory, cancel).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Attempt could not be started: {}", e);
                AttemptResult::spawn_failed(e).with_cancelled(cancel.is_cancelled())
            }
        }
    }
}
