//! Startup orchestration.
//!
//! # Responsibilities
//! - Install signal handlers before any traffic is accepted
//! - Acquire the listener (inherited or fresh)
//! - Start the serving engine and keep a handoff copy of the listener
//! - Run the dispatcher until the generation terminates
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Signals are hooked first, so a signal sent during startup is queued
//!   rather than killing the process
//! - The engine starts last (traffic only when ready)

use std::path::Path;

use crate::config::{Network, ServerConfig};
use crate::lifecycle::dispatcher::{DispatchSettings, Dispatcher, Termination};
use crate::lifecycle::engine::ServingEngine;
use crate::lifecycle::fork::{Forker, ProcessForker};
use crate::lifecycle::signals::OsSignals;
use crate::lifecycle::LifecycleError;
use crate::net::listener::remove_stale_socket;
use crate::net::{acquire, HandoffSocket, Inheritance, ServerListener};

/// A running generation: its identity, its engine, and the handoff copy
/// of its listener.
#[derive(Debug)]
pub struct ServerHandle<E> {
    address: String,
    pid: u32,
    engine: E,
    handoff: HandoffSocket,
}

impl<E: ServingEngine> ServerHandle<E> {
    /// Start `engine` on `listener`.
    pub fn start(
        address: impl Into<String>,
        listener: ServerListener,
        mut engine: E,
    ) -> Result<Self, LifecycleError> {
        let address = address.into();
        let pid = std::process::id();
        let local = listener.local_addr_string();

        let handoff = HandoffSocket::duplicate(&listener)?;
        engine.start(listener)?;

        tracing::info!(pid, address = %address, local = %local, "Server has started");

        Ok(Self {
            address,
            pid,
            engine,
            handoff,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn handoff(&self) -> &HandoffSocket {
        &self.handoff
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }
}

/// Serve with `engine` until the generation terminates.
///
/// Returns once a shutdown has completed, either because every request
/// drained or because the deadline passed. Children are started with this
/// process's own arguments; use [`serve_with`] to pass different ones.
pub async fn serve<E: ServingEngine>(
    engine: E,
    config: &ServerConfig,
    inheritance: Inheritance,
) -> Result<Termination, LifecycleError> {
    let forker = ProcessForker::new(&config.handoff.env_var);
    serve_with(engine, forker, config, inheritance).await
}

/// [`serve`], forking successors through `forker`.
pub async fn serve_with<E: ServingEngine, F: Forker>(
    engine: E,
    forker: F,
    config: &ServerConfig,
    inheritance: Inheritance,
) -> Result<Termination, LifecycleError> {
    let signals = OsSignals::install().map_err(LifecycleError::Signals)?;
    let queue = signals.spawn_forwarder();

    let address = config.listener.address.as_str();
    let network = config.listener.network;

    if network == Network::Unix && !inheritance.is_present() {
        match remove_stale_socket(Path::new(address)) {
            Ok(true) => tracing::info!(address, "Removed stale socket"),
            Ok(false) => {}
            Err(e) => tracing::warn!(address, error = %e, "Unable to remove stale socket"),
        }
    }

    let (listener, origin) = acquire(address, network, inheritance).await?;
    tracing::debug!(address, origin = ?origin, "Listener acquired");

    let handle = ServerHandle::start(address, listener, engine)?;
    let pid = handle.pid();

    let settings = DispatchSettings {
        kill_master: config.handoff.kill_master,
        shutdown_timeout: config.shutdown.timeout(),
    };

    let termination = Dispatcher::new(handle, forker, settings).run(queue).await?;

    tracing::info!(
        pid,
        signal = %termination.signal,
        outcome = ?termination.outcome,
        children = termination.children.len(),
        "Server has shut down"
    );
    Ok(termination)
}
