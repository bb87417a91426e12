//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Hook signals → Acquire listener → Start engine → Dispatch
//!
//! Dispatch (dispatcher.rs):
//!     SIGHUP          → fork a child, then shut down
//!     SIGUSR1/SIGUSR2 → fork a child, keep serving
//!     SIGINT/SIGTERM  → shut down
//!
//! Shutdown (shutdown.rs):
//!     Stop accepting → Drain in-flight requests → Force close at deadline
//! ```
//!
//! # Design Decisions
//! - Signals are queued and handled one at a time, in arrival order
//! - A failed fork never stops the current generation
//! - Shutdown has timeout: remaining work is abandoned after the deadline

pub mod dispatcher;
pub mod engine;
pub mod fork;
pub mod shutdown;
pub mod signals;
pub mod startup;

use thiserror::Error;

pub use dispatcher::{DispatchSettings, Dispatcher, ShutdownOutcome, Termination};
pub use engine::{EngineError, ServingEngine};
pub use fork::{ForkError, ForkRequest, Forker, ProcessForker};
pub use shutdown::{graceful_shutdown, Shutdown, ShutdownError, DEFAULT_AWAIT_TIMEOUT, MAX_AWAIT_TIMEOUT};
pub use signals::{send_signal, Signal};
pub use startup::{serve, serve_with, ServerHandle};

use crate::net::{ListenerError, TransferError};

/// Errors that end a generation abnormally.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("unable to keep a handoff copy of the listener: {0}")]
    Transfer(#[from] TransferError),

    #[error("unable to start serving engine: {0}")]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Shutdown(#[from] ShutdownError),

    #[error("unable to install signal handlers: {0}")]
    Signals(#[source] std::io::Error),

    #[error("signal queue closed before shutdown")]
    SignalsClosed,
}
