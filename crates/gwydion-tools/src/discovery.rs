//! Periodic tool discovery.
//!
//! [`AutoDiscovery`] drives registry sync cycles on a fixed interval and
//! publishes the resulting add/remove/update events to registered
//! callbacks. A failing server affects only its own tools; the cycle keeps
//! going for everyone else.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::registry::{DiscoveryReport, ToolRegistry};

/// A change observed by a discovery cycle.
#[derive(Debug, Clone)]
pub enum DiscoveryEvent {
    /// A tool was registered.
    ToolAdded {
        /// Full name of the new tool.
        full_name: String,
    },
    /// A tool vanished and was unregistered.
    ToolRemoved {
        /// Full name of the removed tool.
        full_name: String,
    },
    /// A tool's descriptor changed and it was re-registered in place.
    ToolUpdated {
        /// Full name of the updated tool.
        full_name: String,
    },
    /// A tool could not be registered.
    RegistrationFailed {
        /// Advertising server.
        server: String,
        /// Advertised tool name.
        tool: String,
        /// Why registration failed.
        reason: String,
    },
}

/// Callback invoked for each discovery event.
pub type DiscoveryCallback = Arc<dyn Fn(&DiscoveryEvent) + Send + Sync>;

/// Interval-driven discovery over a registry.
pub struct AutoDiscovery {
    registry: Arc<ToolRegistry>,
    interval: Duration,
    callbacks: Arc<parking_lot::Mutex<Vec<DiscoveryCallback>>>,
    task: parking_lot::Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl AutoDiscovery {
    /// Create a discovery driver with the given cycle interval.
    pub fn new(registry: Arc<ToolRegistry>, interval: Duration) -> Self {
        Self {
            registry,
            interval,
            callbacks: Arc::new(parking_lot::Mutex::new(Vec::new())),
            task: parking_lot::Mutex::new(None),
            cancel: CancellationToken::new(),
        }
    }

    /// Register a callback for discovery events.
    pub fn on_event(&self, callback: DiscoveryCallback) {
        self.callbacks.lock().push(callback);
    }

    /// Run one discovery cycle now and publish its events.
    pub async fn run_cycle(&self) -> DiscoveryReport {
        let report = self.registry.sync_mcp_tools().await;
        if !report.is_empty() {
            tracing::info!(
                added = report.added.len(),
                removed = report.removed.len(),
                updated = report.updated.len(),
                failed = report.failed.len(),
                "discovery cycle complete"
            );
        }
        publish(&self.callbacks, &report);
        report
    }

    /// Start the periodic loop. Idempotent while a loop is running.
    pub fn start(&self) {
        let mut guard = self.task.lock();
        if guard.as_ref().map(|t| !t.is_finished()).unwrap_or(false) {
            return;
        }
        let registry = Arc::clone(&self.registry);
        let callbacks = Arc::clone(&self.callbacks);
        let cancel = self.cancel.clone();
        let interval = self.interval;
        *guard = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        let report = registry.sync_mcp_tools().await;
                        publish(&callbacks, &report);
                    }
                }
            }
        }));
        tracing::debug!(interval_secs = self.interval.as_secs(), "auto-discovery started");
    }

    /// Stop the periodic loop.
    pub fn stop(&self) {
        self.cancel.cancel();
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

impl Drop for AutoDiscovery {
    fn drop(&mut self) {
        self.stop();
    }
}

fn publish(callbacks: &parking_lot::Mutex<Vec<DiscoveryCallback>>, report: &DiscoveryReport) {
    let callbacks = callbacks.lock().clone();
    if callbacks.is_empty() {
        return;
    }
    let mut events = Vec::new();
    for full_name in &report.added {
        events.push(DiscoveryEvent::ToolAdded {
            full_name: full_name.clone(),
        });
    }
    for full_name in &report.removed {
        events.push(DiscoveryEvent::ToolRemoved {
            full_name: full_name.clone(),
        });
    }
    for full_name in &report.updated {
        events.push(DiscoveryEvent::ToolUpdated {
            full_name: full_name.clone(),
        });
    }
    for failure in &report.failed {
        events.push(DiscoveryEvent::RegistrationFailed {
            server: failure.server.clone(),
            tool: failure.tool.clone(),
            reason: failure.reason.clone(),
        });
    }
    for event in &events {
        for callback in &callbacks {
            callback(event);
        }
    }
}
