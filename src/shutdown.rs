//! Shutdown manager for graceful application termination (§5).
//!
//! Both binaries register their long-running tasks here and block on
//! [`ShutdownManager::wait_for_shutdown`]; on SIGTERM/SIGINT it cancels
//! the shared token and gives registered tasks a bounded drain window
//! before returning regardless.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct ShutdownManager {
    cancel_token: CancellationToken,
    task_handles: Vec<JoinHandle<()>>,
    drain_timeout: Duration,
}

impl ShutdownManager {
    pub fn new(drain_timeout: Duration) -> Self {
        Self {
            cancel_token: CancellationToken::new(),
            task_handles: Vec::new(),
            drain_timeout,
        }
    }

    /// Get a clone of the cancellation token for spawning tasks.
    pub fn token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Register a task handle for shutdown coordination.
    pub fn register_task(&mut self, handle: JoinHandle<()>) {
        self.task_handles.push(handle);
    }

    /// Wait for SIGTERM or ctrl+c, then cancel and drain all registered tasks.
    pub async fn wait_for_shutdown(mut self) {
        wait_for_termination_signal().await;
        tracing::info!("shutdown signal received");

        self.cancel_token.cancel();

        let drain = async {
            for handle in self.task_handles.drain(..) {
                let _ = handle.await;
            }
        };

        match tokio::time::timeout(self.drain_timeout, drain).await {
            Ok(_) => tracing::info!("all tasks shut down gracefully"),
            Err(_) => tracing::warn!(
                drain_timeout_secs = self.drain_timeout.as_secs(),
                "shutdown drain timed out; some tasks did not complete"
            ),
        }
    }
}

#[cfg(unix)]
async fn wait_for_termination_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("failed to install SIGTERM handler: {e}");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => {}
        _ = tokio::signal::ctrl_c() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_termination_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
