//! flake - run Go tests repeatedly until they fail
//!
//! Flaky tests pass most of the time and fail now and then. flake runs
//! `go test -race -count=1 -v ./...` over and over, stops at the first
//! failing attempt and shows that attempt's output.
//!
//! # Architecture
//!
//! - [`session`] - The repetition loop and its outcome
//! - [`runner`] - Running one attempt of the external test command
//! - [`presenter`] - Terminal rendering and structured tool reports
//! - [`cancel`] - Signal-driven cancellation
//! - [`mcp`] - Model Context Protocol server exposing `run_flake_tests`
//! - [`config`] - Attempt counts and timing knobs
//! - [`error`] - Custom error types and handling
//! - [`testing`] - Testing infrastructure (mocks)
//!
//! # Example
//!
//! ```rust,ignore
//! use flake::{CancellationScope, FlakeConfig, FlakeSession, GoTestRunner, InteractivePresenter};
//!
//! let config = FlakeConfig::new().with_attempts(20);
//! let session = FlakeSession::new(GoTestRunner::new(), config.clone());
//! let scope = CancellationScope::install()?;
//! let mut presenter = InteractivePresenter::stdout(config.spinner_interval);
//!
//! let outcome = session.run(&std::env::current_dir()?, &mut presenter, scope.token()).await?;
//! std::process::exit(outcome.exit_code());
//! ```

pub mod cancel;
pub mod config;
pub mod error;
pub mod mcp;
pub mod presenter;
pub mod runner;
pub mod session;
pub mod testing;

// Re-export commonly used types
pub use error::{FlakeError, Result};

pub use cancel::{CancellationScope, SignalListener};
pub use config::{normalize_attempts, FlakeConfig, DEFAULT_ATTEMPTS};
pub use mcp::McpServer;
pub use presenter::{FlakeReport, InteractivePresenter, Presenter, ToolPresenter};
pub use runner::{AttemptResult, GoTestRunner, TestRunner};
pub use session::{FlakeSession, RunOutcome};
