//! The `run_flake_tests` tool.

use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::protocol::{CallToolResult, ToolDefinition};
use crate::cancel::CancellationScope;
use crate::config::{normalize_attempts, FlakeConfig};
use crate::error::{FlakeError, Result};
use crate::presenter::{FlakeReport, ToolPresenter};
use crate::runner::TestRunner;
use crate::session::FlakeSession;

pub const TOOL_NAME: &str = "run_flake_tests";

const TOOL_DESCRIPTION: &str =
    "Run Go tests repeatedly using flake to detect flaky tests in any directory";

/// Arguments of `run_flake_tests`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FlakeTestParams {
    /// Working directory where tests should be run.
    #[serde(default)]
    pub directory: Option<String>,
    /// Maximum number of test attempts; non-positive means the default.
    #[serde(default)]
    pub attempts: Option<i64>,
}

/// Validate the `directory` argument and make it absolute.
///
/// The error is the exact text returned to the agent.
pub fn resolve_directory(raw: Option<&str>) -> std::result::Result<PathBuf, String> {
    let trimmed = raw.map(str::trim).unwrap_or_default();
    if trimmed.is_empty() {
        return Err("Error: directory parameter is required".to_string());
    }

    let directory = std::path::absolute(trimmed)
        .map_err(|e| format!("Error: invalid directory path: {}", e))?;

    if !directory.exists() {
        return Err(format!(
            "Error: directory does not exist: {}",
            directory.display()
        ));
    }
    if !directory.is_dir() {
        return Err(format!("Error: not a directory: {}", directory.display()));
    }
    Ok(directory)
}

/// Runs flake sessions on behalf of MCP clients.
///
/// Calls may arrive concurrently; runs are serialized so that at most one
/// test process exists at any time.
pub struct FlakeTool<R> {
    runner: Arc<R>,
    config: FlakeConfig,
    run_lock: Mutex<()>,
}

impl<R: TestRunner> FlakeTool<R> {
    pub fn new(runner: R, config: FlakeConfig) -> Self {
        Self {
            runner: Arc::new(runner),
            config,
            run_lock: Mutex::new(()),
        }
    }

    /// Entry for `tools/list`.
    pub fn definition() -> ToolDefinition {
        ToolDefinition {
            name: TOOL_NAME.to_string(),
            description: TOOL_DESCRIPTION.to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "directory": {
                        "type": "string",
                        "description": "Working directory where tests should be run"
                    },
                    "attempts": {
                        "type": "integer",
                        "description": "Maximum number of test attempts (default: 100)"
                    }
                },
                "required": ["directory"]
            }),
            output_schema: json!({
                "type": "object",
                "properties": {
                    "success": {"type": "boolean"},
                    "attempts": {"type": "integer"},
                    "output": {"type": "string"},
                    "interrupted": {"type": "boolean"},
                    "error_message": {"type": "string"}
                },
                "required": ["success", "attempts", "output"]
            }),
        }
    }

    /// Whether no run is in progress.
    pub fn is_idle(&self) -> bool {
        self.run_lock.try_lock().is_ok()
    }

    /// Handle a `tools/call` for this tool.
    ///
    /// Invalid directories produce an error result without running anything.
    /// Arming `cancel` (client cancellation) or a local SIGINT/SIGTERM
    /// interrupts the run.
    ///
    /// # Errors
    ///
    /// Returns [`FlakeError::InvalidArguments`] when the arguments do not have
    /// the expected shape, and a fatal error if signal registration fails.
    pub async fn call(&self, arguments: Option<Value>, cancel: &CancellationToken) -> Result<CallToolResult> {
        let params: FlakeTestParams = match arguments {
            None | Some(Value::Null) => FlakeTestParams::default(),
            Some(value) => serde_json::from_value(value)
                .map_err(|e| FlakeError::invalid_arguments(e.to_string()))?,
        };

        let attempts = normalize_attempts(params.attempts.unwrap_or(0));
        let directory = match resolve_directory(params.directory.as_deref()) {
            Ok(directory) => directory,
            Err(message) => return Ok(CallToolResult::error(message)),
        };

        let _running = self.run_lock.lock().await;
        let scope = CancellationScope::with_parent(cancel)?;

        info!(
            "Tool run: up to {} attempts in {}",
            attempts,
            directory.display()
        );

        let session = FlakeSession::new(
            Arc::clone(&self.runner),
            self.config.clone().with_attempts(attempts),
        );
        let mut presenter = ToolPresenter::new();
        let outcome = session.run(&directory, &mut presenter, scope.token()).await?;

        let report = presenter
            .into_report()
            .unwrap_or_else(|| FlakeReport::from_outcome(&outcome));
        let message = report.message(&directory);
        Ok(CallToolResult::structured(message, serde_json::to_value(&report)?))
    }
}
