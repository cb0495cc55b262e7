//! flake - run Go tests repeatedly until they fail
//!
//! Interactive mode runs the test command in the current directory and draws
//! progress on the terminal. `--mcp` serves the same loop as a tool over
//! standard input/output.

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use flake::{
    CancellationScope, FlakeConfig, FlakeError, FlakeSession, GoTestRunner, InteractivePresenter,
    McpServer, DEFAULT_ATTEMPTS,
};

#[derive(Parser)]
#[command(name = "flake")]
#[command(version = "1.0.0")]
#[command(about = "flake - Run Go tests repeatedly until they fail", long_about = None)]
struct Cli {
    /// Maximum number of test attempts
    #[arg(long, default_value_t = DEFAULT_ATTEMPTS, value_name = "N")]
    attempts: u32,

    /// Run as an MCP server on stdin/stdout instead of running tests directly
    #[arg(long)]
    mcp: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.mcp);

    let result = if cli.mcp {
        serve_mcp().await.map(|()| 0)
    } else {
        run_interactive(cli.attempts).await
    };

    // Exit explicitly: the stdin reader thread of the MCP server may still be
    // blocked, and the runtime would wait for it on shutdown.
    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(exit_code(&e));
        }
    }
}

/// Exit status for an error, classified by the underlying [`FlakeError`].
fn exit_code(error: &anyhow::Error) -> i32 {
    error
        .downcast_ref::<FlakeError>()
        .map_or(1, FlakeError::exit_code)
}

/// Logs always go to stderr; stdout belongs to the dot stream or JSON-RPC.
fn init_tracing(mcp: bool) {
    let default = if mcp { "flake=info" } else { "flake=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run_interactive(attempts: u32) -> Result<i32> {
    let config = FlakeConfig::new().with_attempts(attempts);
    let directory =
        std::env::current_dir().context("Failed to determine the current directory")?;

    let scope = CancellationScope::install().context("Failed to install signal handlers")?;
    let runner = GoTestRunner::new().with_drain_timeout(config.drain_timeout);
    let mut presenter = InteractivePresenter::stdout(config.spinner_interval);
    let session = FlakeSession::new(runner, config);

    let outcome = session
        .run(&directory, &mut presenter, scope.token())
        .await
        .context("Failed to write progress to the terminal")?;
    Ok(outcome.exit_code())
}

async fn serve_mcp() -> Result<()> {
    let config = FlakeConfig::new();
    let runner = GoTestRunner::new().with_drain_timeout(config.drain_timeout);
    McpServer::with_config(runner, config)
        .serve_stdio()
        .await
        .context("MCP server stopped")
}
