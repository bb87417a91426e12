//! OS signal handling.
//!
//! # Responsibilities
//! - Register handlers for the five lifecycle signals
//! - Translate signals to dispatcher actions
//! - Queue signals so they are handled one at a time, in order
//!
//! # Transitions
//! ```text
//! SIGHUP          → fork child, then shut down (stay Running if the fork fails)
//! SIGUSR1/SIGUSR2 → fork child, keep serving
//! SIGINT/SIGTERM  → shut down
//! anything else   → log and ignore
//! ```
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - The transition table is a pure function over a closed enum
//! - The queue is bounded but generous

use std::io;

use tokio::signal::unix::{signal, Signal as SignalStream, SignalKind};
use tokio::sync::mpsc;

/// Capacity of the signal queue between the OS and the dispatcher.
pub const SIGNAL_QUEUE_CAPACITY: usize = 1024;

/// A signal the dispatcher may receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Hangup,
    User1,
    User2,
    Interrupt,
    Terminate,
    /// Any other signal number.
    Other(i32),
}

impl Signal {
    /// Signals the dispatcher acts upon.
    pub const HOOKED: [Signal; 5] = [
        Signal::Hangup,
        Signal::User1,
        Signal::User2,
        Signal::Interrupt,
        Signal::Terminate,
    ];

    pub fn from_raw(signum: i32) -> Self {
        match signum {
            libc::SIGHUP => Signal::Hangup,
            libc::SIGUSR1 => Signal::User1,
            libc::SIGUSR2 => Signal::User2,
            libc::SIGINT => Signal::Interrupt,
            libc::SIGTERM => Signal::Terminate,
            other => Signal::Other(other),
        }
    }

    pub fn as_raw(&self) -> i32 {
        match self {
            Signal::Hangup => libc::SIGHUP,
            Signal::User1 => libc::SIGUSR1,
            Signal::User2 => libc::SIGUSR2,
            Signal::Interrupt => libc::SIGINT,
            Signal::Terminate => libc::SIGTERM,
            Signal::Other(signum) => *signum,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Signal::Hangup => "SIGHUP",
            Signal::User1 => "SIGUSR1",
            Signal::User2 => "SIGUSR2",
            Signal::Interrupt => "SIGINT",
            Signal::Terminate => "SIGTERM",
            Signal::Other(_) => "other",
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Signal::Other(signum) => write!(f, "signal {}", signum),
            named => f.write_str(named.name()),
        }
    }
}

/// What the dispatcher does in response to a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Spawn a successor, then drain and exit.
    ForkThenShutdown,
    /// Spawn a successor and keep serving.
    Fork,
    /// Drain and exit.
    Shutdown,
    Ignore,
}

/// The lifecycle transition table.
pub fn action_for(signal: Signal) -> Action {
    match signal {
        Signal::Hangup => Action::ForkThenShutdown,
        Signal::User1 | Signal::User2 => Action::Fork,
        Signal::Interrupt | Signal::Terminate => Action::Shutdown,
        Signal::Other(_) => Action::Ignore,
    }
}

/// Send `signal` to process `pid`.
pub fn send_signal(pid: u32, signal: Signal) -> io::Result<()> {
    let pid = libc::pid_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    if unsafe { libc::kill(pid, signal.as_raw()) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Handlers for the hooked signals.
pub struct OsSignals {
    hangup: SignalStream,
    user1: SignalStream,
    user2: SignalStream,
    interrupt: SignalStream,
    terminate: SignalStream,
}

impl OsSignals {
    /// Register the handlers. Must be called inside a Tokio runtime.
    pub fn install() -> io::Result<Self> {
        Ok(Self {
            hangup: signal(SignalKind::hangup())?,
            user1: signal(SignalKind::user_defined1())?,
            user2: signal(SignalKind::user_defined2())?,
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    /// Wait for the next signal. `None` once the driver is gone.
    pub async fn recv(&mut self) -> Option<Signal> {
        tokio::select! {
            s = self.hangup.recv() => s.map(|_| Signal::Hangup),
            s = self.user1.recv() => s.map(|_| Signal::User1),
            s = self.user2.recv() => s.map(|_| Signal::User2),
            s = self.interrupt.recv() => s.map(|_| Signal::Interrupt),
            s = self.terminate.recv() => s.map(|_| Signal::Terminate),
        }
    }

    /// Spawn a task that forwards signals into a bounded queue.
    pub fn spawn_forwarder(mut self) -> mpsc::Receiver<Signal> {
        let (tx, rx) = mpsc::channel(SIGNAL_QUEUE_CAPACITY);

        tokio::spawn(async move {
            while let Some(signal) = self.recv().await {
                if tx.send(signal).await.is_err() {
                    // Dispatcher has exited.
                    break;
                }
            }
        });

        rx
    }
}
