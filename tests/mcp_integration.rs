//! Integration tests for `flake --mcp`
//!
//! Each test drives the compiled server over its standard input/output, one
//! JSON-RPC line at a time.

use assert_cmd::cargo;
use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use tempfile::TempDir;

struct Server {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
}

impl Server {
    fn spawn(configure: impl FnOnce(&mut Command)) -> Self {
        let mut command = Command::new(cargo::cargo_bin!("flake"));
        command
            .arg("--mcp")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        configure(&mut command);

        let mut child = command.spawn().unwrap();
        let stdin = child.stdin.take();
        let stdout = BufReader::new(child.stdout.take().unwrap());
        Self {
            child,
            stdin,
            stdout,
        }
    }

    fn send(&mut self, message: Value) {
        let stdin = self.stdin.as_mut().unwrap();
        writeln!(stdin, "{}", message).unwrap();
        stdin.flush().unwrap();
    }

    fn recv(&mut self) -> Value {
        let mut line = String::new();
        self.stdout.read_line(&mut line).unwrap();
        serde_json::from_str(&line).unwrap()
    }

    fn request(&mut self, message: Value) -> Value {
        self.send(message);
        self.recv()
    }

    #[cfg(unix)]
    fn signal(&self, signal: &str) {
        let status = Command::new("kill")
            .args([signal, &self.child.id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());
    }

    fn initialize(&mut self) -> Value {
        let response = self.request(json!({
            "jsonrpc": "2.0",
            "id": 0,
            "method": "initialize",
            "params": {
                "protocolVersion": "2025-06-18",
                "capabilities": {},
                "clientInfo": {"name": "integration", "version": "0.0.0"}
            }
        }));
        let stdin = self.stdin.as_mut().unwrap();
        writeln!(
            stdin,
            "{}",
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"})
        )
        .unwrap();
        response
    }

    fn call(&mut self, id: u64, arguments: Value) -> Value {
        self.request(json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "tools/call",
            "params": {"name": "run_flake_tests", "arguments": arguments}
        }))
    }

    /// Close stdin and return the exit code.
    fn shutdown(mut self) -> Option<i32> {
        self.stdin.take();
        self.child.wait().unwrap().code()
    }
}

#[cfg(unix)]
#[test]
fn test_signal_while_idle_stops_server() {
    let mut server = Server::spawn(|_| {});
    server.initialize();

    server.signal("-INT");

    // stdin stays open: only the signal can end the server.
    assert_eq!(server.child.wait().unwrap().code(), Some(0));
}

#[test]
fn test_initialize_and_list_tools() {
    let mut server = Server::spawn(|_| {});

    let init = server.initialize();
    assert_eq!(init["id"], json!(0));
    assert_eq!(init["result"]["serverInfo"], json!({"name": "flake", "version": "1.0.0"}));
    assert_eq!(init["result"]["protocolVersion"], "2025-06-18");

    let list = server.request(json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}));
    let tool = &list["result"]["tools"][0];
    assert_eq!(tool["name"], "run_flake_tests");
    assert_eq!(tool["inputSchema"]["properties"]["attempts"]["type"], "integer");

    assert_eq!(server.shutdown(), Some(0));
}

#[test]
fn test_nonexistent_directory_is_error_content() {
    let mut server = Server::spawn(|_| {});
    server.initialize();

    let response = server.call(2, json!({"directory": "/nonexistent/flake/dir", "attempts": 5}));

    assert_eq!(response["id"], json!(2));
    assert!(response.get("error").is_none());
    assert_eq!(response["result"]["isError"], json!(true));
    assert_eq!(
        response["result"]["content"][0]["text"],
        "Error: directory does not exist: /nonexistent/flake/dir"
    );
    assert_eq!(server.shutdown(), Some(0));
}

#[test]
fn test_empty_directory_is_error_content() {
    let mut server = Server::spawn(|_| {});
    server.initialize();

    let response = server.call(3, json!({"directory": ""}));

    assert_eq!(
        response["result"]["content"][0]["text"],
        "Error: directory parameter is required"
    );
    assert_eq!(server.shutdown(), Some(0));
}

#[test]
fn test_malformed_line_gets_parse_error() {
    let mut server = Server::spawn(|_| {});

    let stdin = server.stdin.as_mut().unwrap();
    writeln!(stdin, "this is not json").unwrap();
    let mut line = String::new();
    server.stdout.read_line(&mut line).unwrap();
    let response: Value = serde_json::from_str(&line).unwrap();

    assert_eq!(response["error"]["code"], json!(-32700));
    assert_eq!(response["id"], Value::Null);

    let pong = server.request(json!({"jsonrpc": "2.0", "id": 9, "method": "ping"}));
    assert_eq!(pong["result"], json!({}));
    assert_eq!(server.shutdown(), Some(0));
}

#[cfg(unix)]
mod with_fake_go {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use std::time::{Duration, Instant};

    fn fake_go(body: &str) -> TempDir {
        let bin = TempDir::new().unwrap();
        let script = format!(
            "#!/bin/sh\nn=$(cat \"$FLAKE_COUNTER\" 2>/dev/null || echo 0)\nn=$((n+1))\necho $n > \"$FLAKE_COUNTER\"\n{}\n",
            body
        );
        let path = bin.path().join("go");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        bin
    }

    fn spawn_with(bin: &Path) -> Server {
        let path = format!(
            "{}:{}",
            bin.display(),
            std::env::var("PATH").unwrap_or_default()
        );
        let counter = bin.join("count");
        Server::spawn(move |command| {
            command.env("PATH", path).env("FLAKE_COUNTER", counter);
        })
    }

    fn invocations(bin: &Path) -> u32 {
        std::fs::read_to_string(bin.join("count"))
            .map(|text| text.trim().parse().unwrap())
            .unwrap_or(0)
    }

    #[test]
    fn test_zero_attempts_means_default() {
        let bin = fake_go("echo ok");
        let work = TempDir::new().unwrap();
        let mut server = spawn_with(bin.path());
        server.initialize();

        let response = server.call(4, json!({"directory": work.path(), "attempts": 0}));

        assert_eq!(
            response["result"]["structuredContent"],
            json!({
                "success": true,
                "attempts": 100,
                "output": "All 100 test attempts passed successfully!"
            })
        );
        assert_eq!(invocations(bin.path()), 100);
        assert_eq!(server.shutdown(), Some(0));
    }

    #[test]
    fn test_signal_during_run_interrupts_only_the_run() {
        let bin = fake_go(
            "if [ \"$n\" -eq 2 ]; then touch \"$FLAKE_COUNTER.hang\"; exec sleep 30; fi\necho ok",
        );
        let marker = bin.path().join("count.hang");
        let work = TempDir::new().unwrap();
        let mut server = spawn_with(bin.path());
        server.initialize();

        server.send(json!({
            "jsonrpc": "2.0",
            "id": 6,
            "method": "tools/call",
            "params": {"name": "run_flake_tests", "arguments": {"directory": work.path(), "attempts": 10}}
        }));

        let deadline = Instant::now() + Duration::from_secs(20);
        while !marker.exists() {
            assert!(Instant::now() < deadline, "second attempt never started");
            std::thread::sleep(Duration::from_millis(20));
        }
        server.signal("-TERM");

        let response = server.recv();
        assert_eq!(response["id"], json!(6));
        assert_eq!(
            response["result"]["structuredContent"],
            json!({
                "success": false,
                "attempts": 1,
                "output": "Interrupted after 1 attempts",
                "interrupted": true
            })
        );

        let pong = server.request(json!({"jsonrpc": "2.0", "id": 7, "method": "ping"}));
        assert_eq!(pong["id"], json!(7));
        assert_eq!(pong["result"], json!({}));
        assert_eq!(invocations(bin.path()), 2);
        assert_eq!(server.shutdown(), Some(0));
    }

    #[test]
    fn test_failure_returns_captured_output() {
        let bin = fake_go("if [ \"$n\" -eq 2 ]; then echo '--- FAIL: TestFlaky (0.00s)'; exit 1; fi\necho ok");
        let work = TempDir::new().unwrap();
        let mut server = spawn_with(bin.path());
        server.initialize();

        let response = server.call(5, json!({"directory": work.path(), "attempts": 10}));

        let report = &response["result"]["structuredContent"];
        assert_eq!(report["success"], json!(false));
        assert_eq!(report["attempts"], json!(2));
        assert_eq!(report["output"], "--- FAIL: TestFlaky (0.00s)\n");
        assert_eq!(report["error_message"], "Test failed on attempt 2");
        assert!(response["result"]["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("--- FAIL: TestFlaky"));
        assert_eq!(invocations(bin.path()), 2);
        assert_eq!(server.shutdown(), Some(0));
    }
}
