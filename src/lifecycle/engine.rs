//! Serving engine contract.
//!
//! The lifecycle core never accepts connections itself. It starts an
//! engine against a listener, and later asks it to drain.

use std::future::Future;

use thiserror::Error;

use crate::net::ServerListener;

/// Errors reported by a serving engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("serving engine already started")]
    AlreadyStarted,

    #[error("serving engine was never started")]
    NotStarted,

    #[error("serving engine I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("serving task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// The accept/dispatch loop owned by the caller.
pub trait ServingEngine: Send {
    /// Start serving `listener` on a separate task. Returns immediately.
    fn start(&mut self, listener: ServerListener) -> Result<(), EngineError>;

    /// Stop accepting and wait for in-flight work to finish.
    ///
    /// Unbounded; the caller imposes the deadline.
    fn drain(&mut self) -> impl Future<Output = Result<(), EngineError>> + Send;

    /// Abandon whatever work is left.
    fn force_close(&mut self);
}
