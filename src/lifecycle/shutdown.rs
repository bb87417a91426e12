//! Shutdown coordination.
//!
//! # Responsibilities
//! - Broadcast a stop request to every task that serves traffic
//! - Bound a drain with a fixed deadline and force-close on expiry

use std::time::Duration;

use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::lifecycle::engine::{EngineError, ServingEngine};

/// Default drain deadline.
pub const DEFAULT_AWAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Longest drain deadline honoured; longer timeouts are clamped to it.
pub const MAX_AWAIT_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Coordinator for graceful shutdown.
///
/// Provides a broadcast channel that all long-running tasks can subscribe to.
#[derive(Debug, Clone)]
pub struct Shutdown {
    /// Broadcast channel sender.
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors from a graceful shutdown.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Work was still outstanding at the deadline and has been abandoned.
    #[error("drain did not finish within {timeout:?}; remaining work abandoned")]
    DeadlineExceeded { timeout: Duration },

    /// The engine could not be stopped.
    #[error("unable to stop serving engine: {0}")]
    Engine(#[from] EngineError),
}

/// Drain `engine`, giving up after `timeout` (default 5 seconds, at most
/// [`MAX_AWAIT_TIMEOUT`]).
///
/// Returns `Ok` if every in-flight request finished in time. On expiry the
/// engine is force-closed and [`ShutdownError::DeadlineExceeded`] returned.
pub async fn graceful_shutdown<E: ServingEngine + ?Sized>(
    engine: &mut E,
    timeout: Option<Duration>,
) -> Result<(), ShutdownError> {
    let requested = timeout.unwrap_or(DEFAULT_AWAIT_TIMEOUT);
    let timeout = requested.min(MAX_AWAIT_TIMEOUT);
    if timeout < requested {
        tracing::warn!(
            requested_secs = requested.as_secs(),
            max_secs = MAX_AWAIT_TIMEOUT.as_secs(),
            "Shutdown timeout clamped"
        );
    }
    let deadline = Instant::now() + timeout;
    let expires_at = chrono::Local::now()
        + chrono::TimeDelta::from_std(timeout).unwrap_or_else(|_| chrono::TimeDelta::zero());
    let expires_at = expires_at.format("%Y-%m-%d %H:%M:%S").to_string();

    tracing::info!(
        deadline = %expires_at,
        timeout_ms = timeout.as_millis() as u64,
        "Digesting requests will be timed out at {}",
        expires_at
    );

    match tokio::time::timeout_at(deadline, engine.drain()).await {
        Ok(Ok(())) => {
            tracing::info!("All requests digested");
            Ok(())
        }
        Ok(Err(e)) => {
            engine.force_close();
            Err(ShutdownError::Engine(e))
        }
        Err(_) => {
            engine.force_close();
            tracing::warn!(deadline = %expires_at, "Drain deadline exceeded, forcing close");
            Err(ShutdownError::DeadlineExceeded { timeout })
        }
    }
}
