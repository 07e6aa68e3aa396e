//! Transport layer for MCP communication.
//!
//! A transport moves discrete, complete byte messages across one logical
//! channel and is oblivious to JSON-RPC. Two variants exist: a child process
//! speaking newline-delimited JSON over stdio, and a WebSocket speaking one
//! text frame per message.
//!
//! Read and write halves are guarded by separate locks so the protocol's
//! reader task can block in `receive` without starving concurrent sends.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::config::{McpServerConfig, TransportKind};
use crate::error::{McpError, Result};

/// How long to wait for a child to exit after its stdin is closed.
const GRACEFUL_EXIT_WINDOW: Duration = Duration::from_secs(5);

/// How long to wait after the first kill before the final kill-and-reap.
const FORCED_EXIT_WINDOW: Duration = Duration::from_secs(2);

type WsSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ─────────────────────────────────────────────────────────────────────────────
// Stdio
// ─────────────────────────────────────────────────────────────────────────────

/// Stdio transport: spawns a child process and frames messages as
/// newline-delimited UTF-8 lines on its stdin/stdout.
pub struct StdioTransport {
    command: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    child: parking_lot::Mutex<Option<Child>>,
    stdin: tokio::sync::Mutex<Option<ChildStdin>>,
    stdout: tokio::sync::Mutex<Option<BufReader<ChildStdout>>>,
    connected: AtomicBool,
}

impl StdioTransport {
    /// Create a stdio transport for the given command.
    ///
    /// The child inherits the current process environment with `env` overlaid
    /// on top. Nothing is spawned until [`connect`](Self::connect).
    pub fn new(
        command: impl Into<String>,
        args: Vec<String>,
        env: HashMap<String, String>,
    ) -> Self {
        Self {
            command: command.into(),
            args,
            env,
            child: parking_lot::Mutex::new(None),
            stdin: tokio::sync::Mutex::new(None),
            stdout: tokio::sync::Mutex::new(None),
            connected: AtomicBool::new(false),
        }
    }

    /// Spawn the child process and capture its pipes.
    pub async fn connect(&self) -> Result<()> {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            McpError::spawn_failed(format!("failed to spawn '{}': {}", self.command, e))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::spawn_failed("failed to capture stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::spawn_failed("failed to capture stdout"))?;

        tracing::info!(
            command = %self.command,
            pid = child.id().unwrap_or_default(),
            "spawned MCP server process"
        );

        *self.stdin.lock().await = Some(stdin);
        *self.stdout.lock().await = Some(BufReader::new(stdout));
        *self.child.lock() = Some(child);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Close stdin, then escalate: graceful wait, kill, short wait, final
    /// kill and reap.
    pub async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        // Closing stdin signals shutdown to well-behaved servers.
        drop(self.stdin.lock().await.take());
        drop(self.stdout.lock().await.take());

        let child = self.child.lock().take();
        let Some(mut child) = child else {
            return;
        };

        if tokio::time::timeout(GRACEFUL_EXIT_WINDOW, child.wait())
            .await
            .is_ok()
        {
            tracing::debug!(command = %self.command, "MCP server exited gracefully");
            return;
        }

        tracing::warn!(command = %self.command, "graceful shutdown timeout, killing process");
        let _ = child.start_kill();
        if tokio::time::timeout(FORCED_EXIT_WINDOW, child.wait())
            .await
            .is_ok()
        {
            return;
        }

        tracing::warn!(command = %self.command, "process ignored kill, forcing reap");
        let _ = child.kill().await;
        let _ = child.wait().await;
    }

    /// Write one message followed by a newline.
    pub async fn send(&self, message: &[u8]) -> Result<()> {
        let mut guard = self.stdin.lock().await;
        let stdin = guard
            .as_mut()
            .ok_or_else(|| McpError::connection("transport not connected"))?;
        stdin
            .write_all(message)
            .await
            .map_err(|e| McpError::connection(format!("failed to write message: {}", e)))?;
        stdin
            .write_all(b"\n")
            .await
            .map_err(|e| McpError::connection(format!("failed to write frame: {}", e)))?;
        stdin
            .flush()
            .await
            .map_err(|e| McpError::connection(format!("failed to flush: {}", e)))?;
        Ok(())
    }

    /// Read one newline-terminated message, stripping the trailing newline.
    /// An empty read is EOF and flips the transport to disconnected.
    pub async fn receive(&self) -> Result<Vec<u8>> {
        let mut guard = self.stdout.lock().await;
        let stdout = guard
            .as_mut()
            .ok_or_else(|| McpError::connection("transport not connected"))?;

        let mut line = String::new();
        let read = stdout
            .read_line(&mut line)
            .await
            .map_err(|e| McpError::connection(format!("failed to read message: {}", e)))?;
        if read == 0 {
            self.connected.store(false, Ordering::SeqCst);
            return Err(McpError::ConnectionClosed);
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(line.into_bytes())
    }

    /// True iff the child exists and has not exited.
    pub fn is_connected(&self) -> bool {
        if !self.connected.load(Ordering::SeqCst) {
            return false;
        }
        let mut guard = self.child.lock();
        match guard.as_mut() {
            Some(child) => match child.try_wait() {
                Ok(None) => true,
                _ => {
                    self.connected.store(false, Ordering::SeqCst);
                    false
                }
            },
            None => false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket
// ─────────────────────────────────────────────────────────────────────────────

/// WebSocket transport: one text frame per message.
pub struct WsTransport {
    url: String,
    headers: HashMap<String, String>,
    sink: tokio::sync::Mutex<Option<SplitSink<WsSocket, Message>>>,
    stream: tokio::sync::Mutex<Option<SplitStream<WsSocket>>>,
    connected: AtomicBool,
}

impl WsTransport {
    /// Create a WebSocket transport for the given URL and headers.
    pub fn new(url: impl Into<String>, headers: HashMap<String, String>) -> Self {
        Self {
            url: url.into(),
            headers,
            sink: tokio::sync::Mutex::new(None),
            stream: tokio::sync::Mutex::new(None),
            connected: AtomicBool::new(false),
        }
    }

    /// Open the socket with the configured headers.
    pub async fn connect(&self) -> Result<()> {
        let _parsed = url::Url::parse(&self.url)
            .map_err(|e| McpError::connection(format!("invalid URL '{}': {}", self.url, e)))?;

        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| McpError::connection(format!("invalid WebSocket request: {}", e)))?;
        for (key, value) in &self.headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| McpError::connection(format!("invalid header name '{}': {}", key, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| McpError::connection(format!("invalid header value: {}", e)))?;
            request.headers_mut().append(name, value);
        }

        let (socket, _response) = connect_async(request)
            .await
            .map_err(|e| McpError::connection(format!("WebSocket connect failed: {}", e)))?;

        tracing::info!(url = %self.url, "WebSocket connection established");

        let (sink, stream) = socket.split();
        *self.sink.lock().await = Some(sink);
        *self.stream.lock().await = Some(stream);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Close the socket gracefully.
    pub async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(mut sink) = self.sink.lock().await.take() {
            let _ = sink.send(Message::Close(None)).await;
            let _ = sink.close().await;
        }
        drop(self.stream.lock().await.take());
    }

    /// Send one text frame.
    pub async fn send(&self, message: &[u8]) -> Result<()> {
        let text = std::str::from_utf8(message)
            .map_err(|e| McpError::protocol(format!("message is not UTF-8: {}", e)))?
            .to_string();
        let mut guard = self.sink.lock().await;
        let sink = guard
            .as_mut()
            .ok_or_else(|| McpError::connection("WebSocket not connected"))?;
        sink.send(Message::Text(text.into())).await.map_err(|e| {
            self.connected.store(false, Ordering::SeqCst);
            McpError::connection(format!("failed to send frame: {}", e))
        })
    }

    /// Receive the next text frame. Control frames are skipped.
    pub async fn receive(&self) -> Result<Vec<u8>> {
        let mut guard = self.stream.lock().await;
        let stream = guard
            .as_mut()
            .ok_or_else(|| McpError::connection("WebSocket not connected"))?;
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.as_bytes().to_vec()),
                Some(Ok(Message::Binary(bytes))) => return Ok(bytes.to_vec()),
                Some(Ok(Message::Close(_))) | None => {
                    self.connected.store(false, Ordering::SeqCst);
                    return Err(McpError::ConnectionClosed);
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    self.connected.store(false, Ordering::SeqCst);
                    return Err(McpError::connection(format!("WebSocket receive failed: {}", e)));
                }
            }
        }
    }

    /// True iff the socket is open.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Uniform contract
// ─────────────────────────────────────────────────────────────────────────────

/// Transport for communicating with an MCP server.
pub enum McpTransport {
    /// Child process over stdio.
    Stdio(StdioTransport),
    /// WebSocket endpoint.
    WebSocket(WsTransport),
}

impl McpTransport {
    /// Create a stdio transport.
    pub fn stdio(
        command: impl Into<String>,
        args: Vec<String>,
        env: HashMap<String, String>,
    ) -> Self {
        Self::Stdio(StdioTransport::new(command, args, env))
    }

    /// Create a WebSocket transport.
    pub fn websocket(url: impl Into<String>, headers: HashMap<String, String>) -> Self {
        Self::WebSocket(WsTransport::new(url, headers))
    }

    /// Build the transport variant selected by the server config.
    pub fn from_config(config: &McpServerConfig) -> Result<Arc<Self>> {
        match config.transport {
            TransportKind::Stdio => {
                if config.command.is_empty() {
                    return Err(McpError::config(format!(
                        "server '{}': stdio transport requires a command",
                        config.name
                    )));
                }
                Ok(Arc::new(Self::stdio(
                    config.command.clone(),
                    config.args.clone(),
                    config.environment.clone(),
                )))
            }
            TransportKind::WebSocket => {
                let url = config.url.clone().ok_or_else(|| {
                    McpError::config(format!(
                        "server '{}': websocket transport requires a url",
                        config.name
                    ))
                })?;
                Ok(Arc::new(Self::websocket(url, config.headers.clone())))
            }
        }
    }

    /// Establish the channel.
    pub async fn connect(&self) -> Result<()> {
        match self {
            Self::Stdio(t) => t.connect().await,
            Self::WebSocket(t) => t.connect().await,
        }
    }

    /// Close the channel.
    pub async fn disconnect(&self) {
        match self {
            Self::Stdio(t) => t.disconnect().await,
            Self::WebSocket(t) => t.disconnect().await,
        }
    }

    /// Transmit one message.
    pub async fn send(&self, message: &[u8]) -> Result<()> {
        match self {
            Self::Stdio(t) => t.send(message).await,
            Self::WebSocket(t) => t.send(message).await,
        }
    }

    /// Return the next complete message.
    pub async fn receive(&self) -> Result<Vec<u8>> {
        match self {
            Self::Stdio(t) => t.receive().await,
            Self::WebSocket(t) => t.receive().await,
        }
    }

    /// Check channel liveness.
    pub fn is_connected(&self) -> bool {
        match self {
            Self::Stdio(t) => t.is_connected(),
            Self::WebSocket(t) => t.is_connected(),
        }
    }

    /// Check if this is a stdio transport.
    pub fn is_stdio(&self) -> bool {
        matches!(self, Self::Stdio(_))
    }

    /// Check if this is a WebSocket transport.
    pub fn is_websocket(&self) -> bool {
        matches!(self, Self::WebSocket(_))
    }
}

impl std::fmt::Debug for McpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdio(t) => f
                .debug_struct("StdioTransport")
                .field("command", &t.command)
                .field("connected", &t.connected.load(Ordering::SeqCst))
                .finish(),
            Self::WebSocket(t) => f
                .debug_struct("WsTransport")
                .field("url", &t.url)
                .field("connected", &t.connected.load(Ordering::SeqCst))
                .finish(),
        }
    }
}
