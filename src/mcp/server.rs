//! Newline-delimited JSON-RPC server over standard input/output.
//!
//! Requests are read one line at a time. `tools/call` requests run on their
//! own tasks so the reader can keep receiving `notifications/cancelled` and
//! `ping` while a run is in progress; responses funnel through a single
//! writer task so lines are never interleaved.

use serde_json::{json, Value};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::protocol::{
    negotiate_protocol_version, CallToolParams, CancelledParams, Implementation,
    InitializeResult, Message, Response, RpcError, JSONRPC_VERSION,
};
use super::tools::{FlakeTool, TOOL_NAME};
use super::{SERVER_NAME, SERVER_VERSION};
use crate::cancel::SignalListener;
use crate::config::FlakeConfig;
use crate::error::{FlakeError, Result};
use crate::runner::TestRunner;

/// Cancellation tokens of in-flight `tools/call` requests, keyed by the
/// serialized request id.
type InFlight = Arc<Mutex<HashMap<String, CancellationToken>>>;

/// MCP server exposing `run_flake_tests`.
pub struct McpServer<R> {
    tool: Arc<FlakeTool<R>>,
}

impl<R: TestRunner + 'static> McpServer<R> {
    pub fn new(runner: R) -> Self {
        Self::with_config(runner, FlakeConfig::default())
    }

    pub fn with_config(runner: R, config: FlakeConfig) -> Self {
        Self {
            tool: Arc::new(FlakeTool::new(runner, config)),
        }
    }

    /// Serve on the process's standard input and output until input closes.
    ///
    /// # Errors
    ///
    /// Returns an error if reading input fails, signal registration fails,
    /// or a run fails unexpectedly.
    pub async fn serve_stdio(self) -> Result<()> {
        self.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }

    /// Serve on arbitrary streams.
    ///
    /// # Errors
    ///
    /// See [`McpServer::serve_stdio`].
    pub async fn serve<I, O>(self, input: I, output: O) -> Result<()>
    where
        I: AsyncBufRead + Unpin,
        O: AsyncWrite + Unpin + Send + 'static,
    {
        info!("MCP server {} {} listening on stdio", SERVER_NAME, SERVER_VERSION);

        let (tx, rx) = mpsc::channel::<Response>(64);
        let writer = tokio::spawn(write_responses(output, rx));
        let in_flight: InFlight = Arc::new(Mutex::new(HashMap::new()));
        let mut tasks: JoinSet<Result<()>> = JoinSet::new();
        let mut signals = SignalListener::new()?;
        let mut lines = input.lines();

        let served = loop {
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) => self.handle_line(&line, &tx, &in_flight, &mut tasks).await,
                    Ok(None) => {
                        info!("Input closed, shutting down");
                        break Ok(());
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                        break Err(FlakeError::protocol(format!("input is not UTF-8: {}", e)));
                    }
                    Err(e) => break Err(FlakeError::from(e)),
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = task_result(joined) {
                        error!("Tool call failed fatally: {}", e);
                        break Err(e);
                    }
                }
                name = signals.recv() => {
                    if self.tool.is_idle() {
                        info!("Received {}, shutting down", name);
                        break Ok(());
                    }
                    debug!("Received {} during a run; the run handles it", name);
                }
            }
        };

        for token in in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
        {
            token.cancel();
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = task_result(joined) {
                warn!("Tool call failed during shutdown: {}", e);
            }
        }

        drop(tx);
        match writer.await {
            Ok(Err(e)) => warn!("Response writer stopped: {}", e),
            Err(e) => warn!("Response writer task failed: {}", e),
            Ok(Ok(())) => {}
        }

        served
    }

    async fn handle_line(
        &self,
        line: &str,
        tx: &mpsc::Sender<Response>,
        in_flight: &InFlight,
        tasks: &mut JoinSet<Result<()>>,
    ) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                warn!("Malformed JSON on input: {}", e);
                send(tx, Response::failure(Value::Null, RpcError::parse_error(e))).await;
                return;
            }
        };

        if !value.is_object() {
            send(
                tx,
                Response::failure(Value::Null, RpcError::invalid_request("expected an object")),
            )
            .await;
            return;
        }

        let message: Message = match serde_json::from_value(value) {
            Ok(message) => message,
            Err(e) => {
                send(tx, Response::failure(Value::Null, RpcError::invalid_request(e))).await;
                return;
            }
        };

        if message.jsonrpc.as_deref() != Some(JSONRPC_VERSION) {
            debug!("Message without jsonrpc 2.0 marker: {:?}", message.jsonrpc);
        }

        let Some(method) = message.method else {
            debug!("Ignoring client response for id {:?}", message.id);
            return;
        };

        let Some(id) = message.id else {
            handle_notification(&method, message.params, in_flight);
            return;
        };

        debug!("Request {} {}", id, method);
        let response = match method.as_str() {
            "initialize" => Response::success(id, initialize(message.params.as_ref())),
            "ping" => Response::success(id, json!({})),
            "tools/list" => Response::success(
                id,
                json!({ "tools": [FlakeTool::<R>::definition()] }),
            ),
            "tools/call" => match self.start_call(id.clone(), message.params, tx, in_flight, tasks) {
                Ok(()) => return,
                Err(error) => Response::failure(id, error),
            },
            _ => Response::failure(id, RpcError::method_not_found(&method)),
        };
        send(tx, response).await;
    }

    fn start_call(
        &self,
        id: Value,
        params: Option<Value>,
        tx: &mpsc::Sender<Response>,
        in_flight: &InFlight,
        tasks: &mut JoinSet<Result<()>>,
    ) -> std::result::Result<(), RpcError> {
        let params: CallToolParams = params
            .map(serde_json::from_value)
            .transpose()
            .map_err(RpcError::invalid_params)?
            .ok_or_else(|| RpcError::invalid_params("missing tool name"))?;

        if params.name != TOOL_NAME {
            return Err(RpcError::invalid_params(format!(
                "Unknown tool: {}",
                params.name
            )));
        }

        let key = id.to_string();
        let cancel = CancellationToken::new();
        match in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.clone())
        {
            Entry::Occupied(_) => {
                return Err(RpcError::invalid_request(format!(
                    "request id {} is already in flight",
                    key
                )));
            }
            Entry::Vacant(slot) => {
                slot.insert(cancel.clone());
            }
        }

        let tool = Arc::clone(&self.tool);
        let tx = tx.clone();
        let in_flight = Arc::clone(in_flight);

        tasks.spawn(async move {
            let result = tool.call(params.arguments, &cancel).await;
            in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&key);

            if cancel.is_cancelled() {
                info!("Request {} was cancelled; not responding", key);
                return match result {
                    Err(e) if e.is_fatal() => Err(e),
                    _ => Ok(()),
                };
            }

            match result {
                Ok(call_result) => {
                    let value = serde_json::to_value(&call_result)?;
                    send(&tx, Response::success(id, value)).await;
                    Ok(())
                }
                Err(FlakeError::InvalidArguments { message }) => {
                    send(&tx, Response::failure(id, RpcError::invalid_params(message))).await;
                    Ok(())
                }
                Err(e) => {
                    send(&tx, Response::failure(id, RpcError::internal(&e))).await;
                    Err(e)
                }
            }
        });
        Ok(())
    }
}

fn initialize(params: Option<&Value>) -> Value {
    let requested = params
        .and_then(|p| p.get("protocolVersion"))
        .and_then(Value::as_str);
    let version = negotiate_protocol_version(requested);
    info!("Client initialized with protocol {}", version);

    let result = InitializeResult {
        protocol_version: version.to_string(),
        capabilities: json!({ "tools": { "listChanged": false } }),
        server_info: Implementation {
            name: SERVER_NAME.to_string(),
            version: SERVER_VERSION.to_string(),
        },
        instructions: Some(format!(
            "Call {} with an absolute Go module directory to run its tests repeatedly until one fails.",
            TOOL_NAME
        )),
    };
    serde_json::to_value(result).unwrap_or_else(|_| json!({}))
}

fn handle_notification(method: &str, params: Option<Value>, in_flight: &InFlight) {
    match method {
        "notifications/initialized" => debug!("Client finished initialization"),
        "notifications/cancelled" => {
            let Some(params) = params.and_then(|p| serde_json::from_value::<CancelledParams>(p).ok())
            else {
                warn!("notifications/cancelled without a usable requestId");
                return;
            };
            let key = params.request_id.to_string();
            match in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&key)
            {
                Some(token) => {
                    info!(
                        "Cancelling request {} ({})",
                        key,
                        params.reason.as_deref().unwrap_or("no reason given")
                    );
                    token.cancel();
                }
                None => debug!("Cancellation for unknown or finished request {}", key),
            }
        }
        other => debug!("Ignoring notification {}", other),
    }
}

fn task_result(joined: std::result::Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    match joined {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(FlakeError::task(format!("tool call panicked: {}", e))),
        Err(e) => Err(FlakeError::task(format!("tool call aborted: {}", e))),
    }
}

async fn send(tx: &mpsc::Sender<Response>, response: Response) {
    if tx.send(response).await.is_err() {
        debug!("Response dropped: writer has stopped");
    }
}

async fn write_responses<O>(mut output: O, mut rx: mpsc::Receiver<Response>) -> Result<()>
where
    O: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let mut line = serde_json::to_vec(&response)?;
        line.push(b'\n');
        output.write_all(&line).await?;
        output.flush().await?;
    }
    Ok(())
}
