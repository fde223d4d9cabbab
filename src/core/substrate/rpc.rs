use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{OperationDefinition, RemoteOperation, Substrate, SubstrateError};

/// Upper bound on the peer stderr kept for error reports.
const STDERR_TAIL_LIMIT: usize = 2000;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// How to launch the substrate peer process.
#[derive(Debug, Clone)]
pub struct PeerCommand {
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub init_timeout: Duration,
}

type Waiters = Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;

/// Substrate peer speaking newline-delimited JSON-RPC 2.0 over a child
/// process' stdin/stdout.
///
/// `closed` is cancelled as soon as either pipe fails. From then on every
/// call, pending or new, fails with a transport error.
pub struct RpcSubstrate {
    child: Mutex<Child>,
    next_id: AtomicU64,
    waiters: Waiters,
    outbox: mpsc::Sender<String>,
    closed: CancellationToken,
    stderr_tail: Arc<Mutex<String>>,
}

/// Forwards queued requests to the peer, one line each.
async fn write_requests<W>(stdin: W, mut outbox: mpsc::Receiver<String>, closed: CancellationToken)
where
    W: AsyncWrite + Unpin,
{
    let mut writer = BufWriter::new(stdin);
    loop {
        let line = tokio::select! {
            _ = closed.cancelled() => break,
            line = outbox.recv() => match line {
                Some(line) => line,
                None => break,
            },
        };
        debug!("substrate TX: {}", line);
        let sent = async {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await
        };
        if let Err(e) = sent.await {
            warn!("Substrate stdin closed: {}", e);
            break;
        }
    }
    closed.cancel();
}

/// Hands each response line to the call waiting on its id. On EOF the
/// connection is marked closed and every waiter is released.
async fn route_responses<R>(stdout: R, waiters: Waiters, closed: CancellationToken)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stdout).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!("substrate RX: {}", line);
        let Ok(response) = serde_json::from_str::<JsonRpcResponse>(&line) else {
            warn!("Unparsed substrate RX: {}", line);
            continue;
        };
        if let Some(waiter) = waiters.lock().await.remove(&response.id) {
            let _ = waiter.send(response);
        }
    }
    warn!("Substrate stdout closed");
    closed.cancel();
    waiters.lock().await.clear();
}

async fn capture_stderr<R>(stderr: R, tail: Arc<Mutex<String>>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!("substrate STDERR: {}", line);
        let mut tail = tail.lock().await;
        if tail.len() < STDERR_TAIL_LIMIT {
            tail.push_str(&line);
            tail.push('\n');
        }
    }
}

impl RpcSubstrate {
    /// Launches the peer and completes the `initialize` handshake within
    /// `peer.init_timeout`.
    pub async fn spawn(peer: &PeerCommand) -> Result<Arc<Self>> {
        info!("Starting substrate peer: {}", peer.command);

        let mut child = Command::new(&peer.command)
            .args(&peer.args)
            .envs(&peer.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| anyhow!("Failed to start substrate peer '{}': {}", peer.command, e))?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(anyhow!("Substrate peer stdio is not piped"));
        };

        let (outbox, queued) = mpsc::channel(100);
        let substrate = Arc::new(Self {
            next_id: AtomicU64::new(1),
            waiters: Arc::default(),
            outbox,
            closed: CancellationToken::new(),
            stderr_tail: Arc::default(),
            child: Mutex::new(child),
        });

        tokio::spawn(write_requests(stdin, queued, substrate.closed.clone()));
        tokio::spawn(route_responses(
            stdout,
            substrate.waiters.clone(),
            substrate.closed.clone(),
        ));
        if let Some(stderr) = substrate.child.lock().await.stderr.take() {
            tokio::spawn(capture_stderr(stderr, substrate.stderr_tail.clone()));
        }

        let outcome = tokio::time::timeout(peer.init_timeout, substrate.initialize()).await;
        let failure = match outcome {
            Ok(Ok(())) => {
                info!("Substrate peer initialized");
                return Ok(substrate);
            }
            Ok(Err(e)) => format!("Substrate initialization failed: {}", e),
            Err(_) => "Substrate initialization timeout".to_string(),
        };
        let tail = substrate.stderr_tail.lock().await;
        Err(anyhow!("{}. Stderr: {}", failure, tail))
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, SubstrateError> {
        let gone = || SubstrateError::Transport(format!("substrate peer exited during '{}'", method));
        if self.is_closed() {
            return Err(gone());
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.to_string(),
            params,
        };
        let line = serde_json::to_string(&request)
            .map_err(|e| SubstrateError::Transport(e.to_string()))?;

        let (tx, rx) = oneshot::channel();
        self.waiters.lock().await.insert(id, tx);
        // The reader may have cleared the waiters before our entry landed.
        if self.is_closed() || self.outbox.send(line).await.is_err() {
            self.waiters.lock().await.remove(&id);
            return Err(gone());
        }

        let response = tokio::select! {
            biased;
            response = rx => response.map_err(|_| gone())?,
            _ = self.closed.cancelled() => {
                self.waiters.lock().await.remove(&id);
                return Err(gone());
            }
        };
        if let Some(error) = response.error {
            return Err(SubstrateError::from_rpc(error.code, error.message));
        }
        response
            .result
            .ok_or_else(|| SubstrateError::Transport(format!("'{}' response missing result", method)))
    }

    async fn initialize(&self) -> Result<()> {
        let params = serde_json::json!({
            "clientInfo": {
                "name": "pmrelay",
                "version": env!("CARGO_PKG_VERSION")
            }
        });
        let resp = self.call("initialize", Some(params)).await?;
        debug!("Substrate initialized: {:?}", resp);
        Ok(())
    }
}

/// Pulls `[{id, name}]` out of an `operations/list` result. Malformed
/// entries are dropped.
pub(crate) fn parse_operation_list(result: &Value) -> Vec<RemoteOperation> {
    result
        .get("operations")
        .and_then(|ops| ops.as_array())
        .map(|ops| {
            ops.iter()
                .filter_map(|op| serde_json::from_value(op.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl Substrate for RpcSubstrate {
    async fn deploy(&self, definition: &OperationDefinition) -> Result<(), SubstrateError> {
        let params = serde_json::json!({ "definition": definition });
        self.call("operations/deploy", Some(params)).await.map(|_| ())
    }

    async fn list_operations(&self) -> Result<Vec<RemoteOperation>, SubstrateError> {
        let result = self.call("operations/list", None).await?;
        Ok(parse_operation_list(&result))
    }

    async fn invoke(&self, id: &str, input: Value) -> Result<Value, SubstrateError> {
        let params = serde_json::json!({ "id": id, "input": input });
        self.call("operations/invoke", Some(params)).await
    }
}
