//! Cancellation channel armed by OS signals.
//!
//! A run owns exactly one [`CancellationToken`]. A [`CancellationScope`]
//! subscribes to SIGINT and SIGTERM (Ctrl+C on Windows) for the lifetime of
//! the run and arms the token when one arrives. Dropping the scope removes the
//! subscription, so a long-lived MCP server does not accumulate listeners
//! across successive runs.
//!
//! ```text
//! SIGINT / SIGTERM
//!    │
//!    ▼
//! SignalListener::recv()
//!    │
//!    ▼
//! token.cancel() ──► session loop (top of iteration, after child exit)
//!                └─► runner (kills the in-flight child)
//! ```

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{FlakeError, Result};

/// Stream of termination signals delivered to the process.
#[derive(Debug)]
pub struct SignalListener {
    #[cfg(unix)]
    sigint: tokio::signal::unix::Signal,
    #[cfg(unix)]
    sigterm: tokio::signal::unix::Signal,
    #[cfg(windows)]
    ctrl_c: tokio::signal::windows::CtrlC,
}

impl SignalListener {
    /// Subscribes to the termination signals.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`FlakeError::Signal`] if the OS refuses the subscription.
    pub fn new() -> Result<Self> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let sigint = signal(SignalKind::interrupt()).map_err(|source| FlakeError::Signal {
                signal: "SIGINT",
                source,
            })?;
            let sigterm =
                signal(SignalKind::terminate()).map_err(|source| FlakeError::Signal {
                    signal: "SIGTERM",
                    source,
                })?;
            Ok(Self { sigint, sigterm })
        }

        #[cfg(windows)]
        {
            let ctrl_c = tokio::signal::windows::ctrl_c().map_err(|source| FlakeError::Signal {
                signal: "CTRL_C",
                source,
            })?;
            Ok(Self { ctrl_c })
        }
    }

    /// Waits for the next termination signal and returns its name.
    pub async fn recv(&mut self) -> &'static str {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = self.sigint.recv() => "SIGINT",
                _ = self.sigterm.recv() => "SIGTERM",
            }
        }

        #[cfg(windows)]
        {
            self.ctrl_c.recv().await;
            "CTRL_C"
        }
    }
}

/// Run-scoped cancellation token armed by termination signals.
///
/// Arming is idempotent and permanent: once cancelled, the token stays
/// cancelled for the rest of the run.
#[derive(Debug)]
pub struct CancellationScope {
    token: CancellationToken,
    listener: JoinHandle<()>,
}

impl CancellationScope {
    /// Installs a scope with a fresh token.
    ///
    /// # Errors
    ///
    /// Returns an error if signal registration fails.
    pub fn install() -> Result<Self> {
        Self::arm_on_signal(CancellationToken::new())
    }

    /// Installs a scope whose token is also armed when `parent` is cancelled.
    ///
    /// Used by the MCP server so that a client-side cancellation and a local
    /// signal both interrupt the same run. Arming the scope never propagates
    /// back to the parent.
    ///
    /// # Errors
    ///
    /// Returns an error if signal registration fails.
    pub fn with_parent(parent: &CancellationToken) -> Result<Self> {
        Self::arm_on_signal(parent.child_token())
    }

    fn arm_on_signal(token: CancellationToken) -> Result<Self> {
        let mut signals = SignalListener::new()?;
        let armed = token.clone();

        let listener = tokio::spawn(async move {
            tokio::select! {
                name = signals.recv() => {
                    info!("Received {}, interrupting run", name);
                    armed.cancel();
                }
                () = armed.cancelled() => {
                    debug!("Run cancelled before any signal arrived");
                }
            }
        });

        Ok(Self { token, listener })
    }

    /// The token consulted by the session loop and the runner.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Whether the token has been armed.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Arms the token without a signal.
    pub fn arm(&self) {
        self.token.cancel();
    }
}

impl Drop for CancellationScope {
    fn drop(&mut self) {
        self.listener.abort();
    }
}
