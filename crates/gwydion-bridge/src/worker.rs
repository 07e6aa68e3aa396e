//! The dedicated protocol runtime.
//!
//! Protocol futures hold waiters that must live and die on one runtime. The
//! worker owns that runtime on its own OS thread for the life of the
//! process; callers on any other runtime submit work to it and await a
//! deadline-bounded completion handle. Startup is lazy and idempotent.

use std::future::Future;
use std::time::Duration;

use tokio::runtime::Handle;

use crate::error::{BridgeError, Result};

/// How long to wait for the worker runtime to come up.
const STARTUP_WINDOW: Duration = Duration::from_secs(5);

/// How long the runtime gets to wind down outstanding work at shutdown.
const DRAIN_WINDOW: Duration = Duration::from_secs(5);

struct WorkerInner {
    handle: Handle,
    thread: Option<std::thread::JoinHandle<()>>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

/// Dedicated single-threaded runtime for all MCP protocol work.
pub struct McpWorker {
    inner: parking_lot::Mutex<Option<WorkerInner>>,
}

impl Default for McpWorker {
    fn default() -> Self {
        Self::new()
    }
}

impl McpWorker {
    /// Create a worker. The thread starts on first use.
    pub fn new() -> Self {
        Self {
            inner: parking_lot::Mutex::new(None),
        }
    }

    /// Start the worker thread and runtime. Safe to call repeatedly.
    pub fn start(&self) -> Result<()> {
        let mut guard = self.inner.lock();
        if let Some(inner) = guard.as_ref()
            && inner.thread.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
        {
            return Ok(());
        }

        let (handle_tx, handle_rx) = std::sync::mpsc::channel::<std::result::Result<Handle, String>>();
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let thread = std::thread::Builder::new()
            .name("gwydion-mcp-worker".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = handle_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                let _ = handle_tx.send(Ok(runtime.handle().clone()));
                tracing::debug!("MCP worker runtime started");
                runtime.block_on(async {
                    let _ = shutdown_rx.await;
                });
                runtime.shutdown_timeout(DRAIN_WINDOW);
                tracing::debug!("MCP worker runtime stopped");
            })
            .map_err(|e| BridgeError::worker(format!("failed to spawn worker thread: {}", e)))?;

        let handle = handle_rx
            .recv_timeout(STARTUP_WINDOW)
            .map_err(|_| BridgeError::worker("worker runtime did not start in time"))?
            .map_err(BridgeError::Worker)?;

        *guard = Some(WorkerInner {
            handle,
            thread: Some(thread),
            shutdown_tx: Some(shutdown_tx),
        });
        Ok(())
    }

    /// A handle to the worker runtime, starting it if needed.
    pub fn handle(&self) -> Result<Handle> {
        self.start()?;
        let guard = self.inner.lock();
        guard
            .as_ref()
            .map(|inner| inner.handle.clone())
            .ok_or_else(|| BridgeError::worker("worker not running"))
    }

    /// Run a future on the worker runtime and await its result under a
    /// deadline. Callable from any runtime.
    pub async fn run<F, T>(&self, future: F, deadline: Duration) -> Result<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let handle = self.handle()?;
        let join = handle.spawn(future);
        match tokio::time::timeout(deadline, join).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(BridgeError::worker(format!("worker task failed: {}", e))),
            Err(_) => Err(BridgeError::Timeout(deadline)),
        }
    }

    /// Whether the worker thread is running.
    pub fn is_running(&self) -> bool {
        self.inner
            .lock()
            .as_ref()
            .and_then(|inner| inner.thread.as_ref())
            .map(|t| !t.is_finished())
            .unwrap_or(false)
    }

    /// Stop the runtime and join the thread.
    pub fn shutdown(&self) {
        let inner = self.inner.lock().take();
        let Some(mut inner) = inner else {
            return;
        };
        if let Some(tx) = inner.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = inner.thread.take() {
            let _ = thread.join();
        }
        tracing::debug!("MCP worker shut down");
    }
}

impl Drop for McpWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
