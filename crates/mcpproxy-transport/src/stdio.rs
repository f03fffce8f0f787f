//! Stdio core-layer connection: spawns the upstream as a child process in
//! its own process group and frames JSON-RPC as newline-delimited JSON
use async_trait::async_trait;
use mcpproxy_protocol::jsonrpc::{Request, RequestId};
use mcpproxy_protocol::Error as ProtocolError;
use mcpproxy_protocol::Tool;
use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Mutex as TokioMutex};
use tracing::{debug, info, warn};

use crate::connection::{ConnectionError, ConnectionResult, ToolsChangedCallback, UpstreamConnection};

/// Configuration for spawning a stdio upstream.
#[derive(Debug, Clone, Default)]
pub struct StdioConfig {
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub working_dir: Option<String>,
    /// Wrap the command in `docker run` when isolation is requested
    pub docker_isolated: bool,
}

struct Inner {
    child: TokioMutex<Child>,
    stdin: TokioMutex<tokio::process::ChildStdin>,
    pending: TokioMutex<HashMap<i64, oneshot::Sender<Result<Value, ProtocolError>>>>,
    next_id: AtomicI64,
    on_tools_changed: TokioMutex<Option<Arc<dyn ToolsChangedCallback>>>,
}

/// A running stdio upstream child process.
pub struct StdioConnection {
    inner: Arc<Inner>,
}

fn docker_wrap(config: &StdioConfig) -> (String, Vec<String>) {
    if !config.docker_isolated {
        return (config.command.clone(), config.args.clone());
    }
    let mut args = vec!["run".to_string(), "--rm".to_string(), "-i".to_string()];
    for (k, v) in &config.env {
        args.push("-e".to_string());
        args.push(format!("{k}={v}"));
    }
    args.push(config.command.clone());
    args.extend(config.args.clone());
    ("docker".to_string(), args)
}

impl StdioConnection {
    /// Spawns the child process in its own process group so the whole
    /// tree can be torn down with one signal.
    pub async fn spawn(config: StdioConfig) -> ConnectionResult<Self> {
        let (program, args) = docker_wrap(&config);
        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(dir) = &config.working_dir {
            cmd.current_dir(dir);
        }
        for (k, v) in &config.env {
            cmd.env(k, v);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // SAFETY: setsid() is async-signal-safe and runs in the
            // freshly forked child before exec, making it a session (and
            // process-group) leader so the whole tree can be torn down
            // with one signal.
            unsafe {
                cmd.pre_exec(|| {
                    libc::setsid();
                    Ok(())
                });
            }
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| ConnectionError::Startup(format!("spawn '{program}' failed: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ConnectionError::Startup("child has no stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ConnectionError::Startup("child has no stdout".to_string()))?;

        let inner = Arc::new(Inner {
            child: TokioMutex::new(child),
            stdin: TokioMutex::new(stdin),
            pending: TokioMutex::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            on_tools_changed: TokioMutex::new(None),
        });

        spawn_reader(inner.clone(), stdout);

        info!(command = %program, "stdio upstream spawned");
        Ok(Self { inner })
    }

    async fn request(&self, method: &str, params: Option<Value>) -> ConnectionResult<Value> {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().await.insert(id, tx);

        let req = Request::new(method, params, RequestId::Number(id));
        let mut line = serde_json::to_string(&req).map_err(|e| ConnectionError::Startup(e.to_string()))?;
        line.push('\n');

        {
            let mut stdin = self.inner.stdin.lock().await;
            stdin
                .write_all(line.as_bytes())
                .await
                .map_err(ConnectionError::Io)?;
            stdin.flush().await.map_err(ConnectionError::Io)?;
        }

        match rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(protocol_err)) => Err(ConnectionError::Protocol(protocol_err)),
            Err(_) => Err(ConnectionError::Closed),
        }
    }
}

fn spawn_reader(inner: Arc<Inner>, stdout: tokio::process::ChildStdout) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if !line.trim().is_empty() => {
                    handle_line(&inner, &line).await;
                }
                Ok(Some(_)) => continue,
                Ok(None) => {
                    debug!("stdio upstream closed stdout");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "stdio upstream read error");
                    break;
                }
            }
        }
    });
}

async fn handle_line(inner: &Arc<Inner>, line: &str) {
    let value: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "malformed JSON-RPC line from upstream");
            return;
        }
    };

    if value.get("method").and_then(Value::as_str) == Some(mcpproxy_protocol::notifications::TOOLS_LIST_CHANGED) {
        let callback = inner.on_tools_changed.lock().await.clone();
        if let Some(cb) = callback {
            cb.on_tools_changed().await;
        }
        return;
    }

    let Some(id) = value.get("id").and_then(Value::as_i64) else {
        return;
    };
    let Some(sender) = inner.pending.lock().await.remove(&id) else {
        return;
    };

    if let Some(err) = value.get("error") {
        let message = err
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("upstream error")
            .to_string();
        let code = err.get("code").and_then(Value::as_i64).unwrap_or(-32603);
        let mut proto_err = ProtocolError::internal(message);
        proto_err.code = code;
        let _ = sender.send(Err(proto_err));
    } else {
        let result = value.get("result").cloned().unwrap_or(Value::Null);
        let _ = sender.send(Ok(result));
    }
}

#[async_trait]
impl UpstreamConnection for StdioConnection {
    async fn initialize(&self, client_name: &str, client_version: &str) -> ConnectionResult<Value> {
        let params = serde_json::json!({
            "protocolVersion": mcpproxy_protocol::MCP_PROTOCOL_VERSION,
            "clientInfo": { "name": client_name, "version": client_version },
            "capabilities": {},
        });
        let result = self.request("initialize", Some(params)).await?;

        let initialized = Request::notification("notifications/initialized", None);
        let mut line = serde_json::to_string(&initialized).map_err(|e| ConnectionError::Startup(e.to_string()))?;
        line.push('\n');
        {
            let mut stdin = self.inner.stdin.lock().await;
            stdin.write_all(line.as_bytes()).await.map_err(ConnectionError::Io)?;
            stdin.flush().await.map_err(ConnectionError::Io)?;
        }

        Ok(result.get("capabilities").cloned().unwrap_or(Value::Null))
    }

    async fn list_tools(&self) -> ConnectionResult<Vec<Tool>> {
        let result = self.request("tools/list", None).await?;
        let tools = result
            .get("tools")
            .cloned()
            .unwrap_or(Value::Array(vec![]));
        serde_json::from_value(tools).map_err(|e| ConnectionError::Startup(e.to_string()))
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> ConnectionResult<Value> {
        let params = serde_json::json!({ "name": name, "arguments": arguments });
        self.request("tools/call", Some(params)).await
    }

    async fn set_on_tools_changed(&self, callback: Arc<dyn ToolsChangedCallback>) {
        *self.inner.on_tools_changed.lock().await = Some(callback);
    }

    async fn close(&self) -> ConnectionResult<()> {
        let mut child = self.inner.child.lock().await;
        #[cfg(unix)]
        {
            // Signal the whole process group this child leads (shutdown
            // must reach grandchildren the child itself spawned).
            if let Some(pid) = child.id() {
                // SAFETY: kill(2) with a negative pid targets the process
                // group; this pid was made a group leader via setsid() above.
                unsafe {
                    libc::kill(-(pid as i32), libc::SIGTERM);
                }
            }
        }
        let _ = child.kill().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn docker_wrap_prefixes_command_when_isolated() {
        let mut env = HashMap::new();
        env.insert("FOO".to_string(), "bar".to_string());
        let config = StdioConfig {
            command: "python".into(),
            args: vec!["server.py".into()],
            env,
            working_dir: None,
            docker_isolated: true,
        };
        let (program, args) = docker_wrap(&config);
        assert_eq!(program, "docker");
        assert!(args.contains(&"python".to_string()));
        assert!(args.iter().any(|a| a == "FOO=bar"));
    }

    #[test]
    fn docker_wrap_passes_through_when_not_isolated() {
        let config = StdioConfig {
            command: "python".into(),
            args: vec!["server.py".into()],
            env: HashMap::new(),
            working_dir: None,
            docker_isolated: false,
        };
        let (program, args) = docker_wrap(&config);
        assert_eq!(program, "python");
        assert_eq!(args, vec!["server.py".to_string()]);
    }
}
