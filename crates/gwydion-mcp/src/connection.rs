//! Connection supervision: timeouts, health monitoring, reconnection.
//!
//! A [`McpConnection`] wraps one transport with a deadline-bounded connect,
//! timeout wrappers for raw sends/receives, and a background health loop that
//! recovers silently dropped channels with exponential backoff.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::config::ReconnectPolicy;
use crate::error::{McpError, Result};
use crate::transport::McpTransport;

/// Default connect and IO deadline.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Supervisor for a single transport.
pub struct McpConnection {
    transport: Arc<McpTransport>,
    connect_timeout: Duration,
    io_timeout: Duration,
    policy: ReconnectPolicy,
    health: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl McpConnection {
    /// Create a connection supervisor over the given transport.
    pub fn new(transport: Arc<McpTransport>) -> Self {
        Self {
            transport,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            io_timeout: DEFAULT_CONNECT_TIMEOUT,
            policy: ReconnectPolicy::default(),
            health: parking_lot::Mutex::new(None),
        }
    }

    /// Set the connect and IO deadlines.
    pub fn with_timeouts(mut self, connect: Duration, io: Duration) -> Self {
        self.connect_timeout = connect;
        self.io_timeout = io;
        self
    }

    /// Set the reconnect policy.
    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The supervised transport.
    pub fn transport(&self) -> &Arc<McpTransport> {
        &self.transport
    }

    /// Establish the channel under the connect deadline, then start the
    /// health loop.
    pub async fn connect(&self) -> Result<()> {
        tokio::time::timeout(self.connect_timeout, self.transport.connect())
            .await
            .map_err(|_| McpError::timeout(self.connect_timeout, "connect"))??;
        self.start_health_loop();
        Ok(())
    }

    /// Stop the health loop and close the channel.
    pub async fn disconnect(&self) {
        if let Some(task) = self.health.lock().take() {
            task.abort();
        }
        self.transport.disconnect().await;
    }

    /// Send raw bytes under the IO deadline.
    pub async fn send_with_timeout(&self, message: &[u8]) -> Result<()> {
        tokio::time::timeout(self.io_timeout, self.transport.send(message))
            .await
            .map_err(|_| McpError::timeout(self.io_timeout, "send"))?
    }

    /// Receive raw bytes under the IO deadline.
    pub async fn receive_with_timeout(&self) -> Result<Vec<u8>> {
        tokio::time::timeout(self.io_timeout, self.transport.receive())
            .await
            .map_err(|_| McpError::timeout(self.io_timeout, "receive"))?
    }

    /// Check channel liveness.
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    fn start_health_loop(&self) {
        let mut guard = self.health.lock();
        if guard.as_ref().map(|t| !t.is_finished()).unwrap_or(false) {
            return;
        }
        let transport = Arc::clone(&self.transport);
        let policy = self.policy.clone();
        *guard = Some(tokio::spawn(health_loop(transport, policy)));
    }
}

impl Drop for McpConnection {
    fn drop(&mut self) {
        if let Some(task) = self.health.lock().take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for McpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpConnection")
            .field("transport", &self.transport)
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

/// Periodic liveness check with capped exponential-backoff reconnection.
async fn health_loop(transport: Arc<McpTransport>, policy: ReconnectPolicy) {
    let mut attempts: u32 = 0;
    loop {
        tokio::time::sleep(policy.check_interval()).await;

        if transport.is_connected() {
            continue;
        }

        if attempts >= policy.max_attempts {
            tracing::debug!("max reconnection attempts reached, staying disconnected");
            continue;
        }

        attempts += 1;
        let delay = policy.backoff_delay(attempts);
        tracing::info!(attempt = attempts, delay_secs = delay.as_secs(), "connection lost, reconnecting");
        tokio::time::sleep(delay).await;

        transport.disconnect().await;
        match transport.connect().await {
            Ok(()) => {
                tracing::info!("reconnection successful");
                attempts = 0;
            }
            Err(e) => {
                tracing::warn!(error = %e, attempt = attempts, "reconnection failed");
            }
        }
    }
}
