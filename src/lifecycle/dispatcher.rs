//! Signal dispatcher.
//!
//! Single-threaded loop that consumes queued signals one at a time and
//! drives fork, shutdown, or both, per [`action_for`]. The serving engine
//! keeps running on its own task the whole time.
//!
//! The generation is Running while [`Dispatcher::run`] loops; the
//! [`Termination`] it returns is the Terminated state.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::lifecycle::fork::{ForkError, ForkRequest, Forker};
use crate::lifecycle::shutdown::{graceful_shutdown, ShutdownError};
use crate::lifecycle::signals::{action_for, Action, Signal};
use crate::lifecycle::startup::ServerHandle;
use crate::lifecycle::{engine::ServingEngine, LifecycleError};
use crate::observability::metrics;

/// How the final drain ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every in-flight request finished.
    Drained,
    /// The deadline passed and remaining work was abandoned.
    DeadlineExceeded,
}

/// Summary of a generation that has terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Termination {
    /// Signal that ended the generation.
    pub signal: Signal,
    pub outcome: ShutdownOutcome,
    /// Children forked during the generation's lifetime, in order.
    pub children: Vec<u32>,
}

/// Dispatcher settings.
#[derive(Debug, Clone, Copy)]
pub struct DispatchSettings {
    /// Ask the master to terminate after each successful fork.
    pub kill_master: bool,
    pub shutdown_timeout: Duration,
}

/// Drives one generation from `Running` to `Terminated`.
pub struct Dispatcher<E, F> {
    handle: ServerHandle<E>,
    forker: F,
    settings: DispatchSettings,
    children: Vec<u32>,
}

impl<E: ServingEngine, F: Forker> Dispatcher<E, F> {
    pub fn new(handle: ServerHandle<E>, forker: F, settings: DispatchSettings) -> Self {
        Self {
            handle,
            forker,
            settings,
            children: Vec::new(),
        }
    }

    /// Run until a shutdown completes.
    ///
    /// Fork failures are logged and the loop continues. A shutdown that
    /// misses its deadline still terminates the generation; any other
    /// shutdown failure is returned.
    pub async fn run(
        mut self,
        mut signals: mpsc::Receiver<Signal>,
    ) -> Result<Termination, LifecycleError> {
        while let Some(signal) = signals.recv().await {
            if let Some(termination) = self.dispatch(signal).await? {
                return Ok(termination);
            }
        }
        Err(LifecycleError::SignalsClosed)
    }

    async fn dispatch(&mut self, signal: Signal) -> Result<Option<Termination>, LifecycleError> {
        let pid = self.handle.pid();
        tracing::info!(pid, signal = %signal, "Received signal");
        metrics::record_signal(signal.name());

        match action_for(signal) {
            Action::ForkThenShutdown => {
                if !self.fork_child() {
                    return Ok(None);
                }
                self.shut_down(signal).await.map(Some)
            }
            Action::Fork => {
                self.fork_child();
                Ok(None)
            }
            Action::Shutdown => self.shut_down(signal).await.map(Some),
            Action::Ignore => {
                tracing::info!(pid, signal = %signal, "Signal is not hooked, ignored");
                Ok(None)
            }
        }
    }

    fn fork_child(&mut self) -> bool {
        let request = ForkRequest {
            listener: self.handle.handoff(),
            address: self.handle.address(),
            master_pid: self.handle.pid(),
            kill_master: self.settings.kill_master,
        };

        match self.forker.fork(request) {
            Ok(child_pid) => {
                self.children.push(child_pid);
                true
            }
            Err(e) => {
                if let ForkError::KillMaster { child_pid, .. } = &e {
                    self.children.push(*child_pid);
                }
                tracing::error!(pid = self.handle.pid(), error = %e, "Unable to fork a child");
                metrics::record_fork(fork_failure_outcome(&e));
                false
            }
        }
    }

    async fn shut_down(&mut self, signal: Signal) -> Result<Termination, LifecycleError> {
        let result = graceful_shutdown(
            self.handle.engine_mut(),
            Some(self.settings.shutdown_timeout),
        )
        .await;

        let outcome = match result {
            Ok(()) => ShutdownOutcome::Drained,
            Err(ShutdownError::DeadlineExceeded { timeout }) => {
                tracing::warn!(
                    pid = self.handle.pid(),
                    timeout_ms = timeout.as_millis() as u64,
                    "Shutdown deadline exceeded, in-flight requests abandoned"
                );
                ShutdownOutcome::DeadlineExceeded
            }
            Err(e) => {
                metrics::record_shutdown("failed");
                return Err(LifecycleError::Shutdown(e));
            }
        };

        metrics::record_shutdown(match outcome {
            ShutdownOutcome::Drained => "drained",
            ShutdownOutcome::DeadlineExceeded => "deadline_exceeded",
        });

        Ok(Termination {
            signal,
            outcome,
            children: std::mem::take(&mut self.children),
        })
    }
}

/// Metric label for a failed fork. A child that was spawned while the
/// master could not be retired is counted apart from a fork that never ran.
fn fork_failure_outcome(error: &ForkError) -> &'static str {
    match error {
        ForkError::KillMaster { .. } => "spawned_master_alive",
        _ => "failed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Network;
    use crate::lifecycle::engine::testing::{DrainBehavior, EngineCounters, MockEngine};
    use crate::net::{acquire, Inheritance};
    use std::collections::VecDeque;
    use std::sync::atomic::Ordering;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, Copy)]
    enum Scripted {
        Spawn,
        Fail,
        /// Child spawned, master could not be signalled.
        MasterSurvives,
    }

    /// Records fork requests; replays scripted results, then succeeds.
    #[derive(Default)]
    struct ScriptedForker {
        script: VecDeque<Scripted>,
        calls: Arc<Mutex<Vec<(String, u32, bool)>>>,
        next_pid: u32,
    }

    impl Forker for ScriptedForker {
        fn fork(&mut self, request: ForkRequest<'_>) -> Result<u32, ForkError> {
            self.calls.lock().unwrap().push((
                request.address.to_string(),
                request.master_pid,
                request.kill_master,
            ));
            self.next_pid += 1;
            let child_pid = request.master_pid + self.next_pid;
            match self.script.pop_front().unwrap_or(Scripted::Spawn) {
                Scripted::Spawn => Ok(child_pid),
                Scripted::Fail => Err(ForkError::UnsupportedListener("scripted")),
                Scripted::MasterSurvives => Err(ForkError::KillMaster {
                    master_pid: request.master_pid,
                    child_pid,
                    source: std::io::Error::from_raw_os_error(libc::EPERM),
                }),
            }
        }
    }

    struct Harness {
        dispatcher: Dispatcher<MockEngine, ScriptedForker>,
        counters: Arc<EngineCounters>,
        calls: Arc<Mutex<Vec<(String, u32, bool)>>>,
    }

    async fn harness(behavior: DrainBehavior, script: &[Scripted], settings: DispatchSettings) -> Harness {
        let (engine, counters) = MockEngine::new(behavior);
        let (listener, _) = acquire("127.0.0.1:0", Network::Tcp, Inheritance::none())
            .await
            .unwrap();
        let handle = ServerHandle::start("127.0.0.1:0", listener, engine).unwrap();

        let forker = ScriptedForker {
            script: script.iter().copied().collect(),
            ..Default::default()
        };
        let calls = Arc::clone(&forker.calls);

        Harness {
            dispatcher: Dispatcher::new(handle, forker, settings),
            counters,
            calls,
        }
    }

    fn settings() -> DispatchSettings {
        DispatchSettings {
            kill_master: false,
            shutdown_timeout: Duration::from_secs(5),
        }
    }

    fn queue(signals: &[Signal]) -> mpsc::Receiver<Signal> {
        let (tx, rx) = mpsc::channel(signals.len().max(1));
        for signal in signals {
            tx.try_send(*signal).unwrap();
        }
        rx
    }

    #[tokio::test]
    async fn user_signals_each_fork_once() {
        let h = harness(DrainBehavior::Immediate, &[], settings()).await;

        let termination = h
            .dispatcher
            .run(queue(&[Signal::User1, Signal::User1, Signal::User2, Signal::Terminate]))
            .await
            .unwrap();

        assert_eq!(termination.signal, Signal::Terminate);
        assert_eq!(termination.outcome, ShutdownOutcome::Drained);
        assert_eq!(termination.children.len(), 3);
        assert_eq!(h.calls.lock().unwrap().len(), 3);
        assert_eq!(h.counters.drains.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn children_have_distinct_pids() {
        let h = harness(DrainBehavior::Immediate, &[], settings()).await;
        let master = std::process::id();

        let termination = h
            .dispatcher
            .run(queue(&[Signal::User2, Signal::User2, Signal::Interrupt]))
            .await
            .unwrap();

        let children = termination.children;
        assert_eq!(children.len(), 2);
        assert_ne!(children[0], children[1]);
        assert!(children.iter().all(|pid| *pid != master));
    }

    #[tokio::test]
    async fn hangup_forks_then_shuts_down() {
        let h = harness(DrainBehavior::Immediate, &[], settings()).await;

        let termination = h.dispatcher.run(queue(&[Signal::Hangup])).await.unwrap();

        assert_eq!(termination.signal, Signal::Hangup);
        assert_eq!(termination.children.len(), 1);
        assert_eq!(h.counters.drains.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_hangup_fork_keeps_running() {
        let h = harness(DrainBehavior::Immediate, &[Scripted::Fail], settings()).await;
        let (tx, rx) = mpsc::channel(4);
        tx.send(Signal::Hangup).await.unwrap();

        let counters = Arc::clone(&h.counters);
        let run = tokio::spawn(h.dispatcher.run(rx));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!run.is_finished());
        assert_eq!(counters.drains.load(Ordering::SeqCst), 0);

        tx.send(Signal::Hangup).await.unwrap();
        let termination = run.await.unwrap().unwrap();

        assert_eq!(termination.children.len(), 1);
        assert_eq!(h.calls.lock().unwrap().len(), 2);
        assert_eq!(counters.drains.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fork_failure_on_user_signal_is_absorbed() {
        let h = harness(DrainBehavior::Immediate, &[Scripted::Fail, Scripted::Spawn], settings()).await;

        let termination = h
            .dispatcher
            .run(queue(&[Signal::User1, Signal::User1, Signal::Terminate]))
            .await
            .unwrap();

        assert_eq!(termination.children.len(), 1);
        assert_eq!(h.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unhooked_signal_is_ignored() {
        let h = harness(DrainBehavior::Immediate, &[], settings()).await;

        let termination = h
            .dispatcher
            .run(queue(&[Signal::Other(libc::SIGWINCH), Signal::Interrupt]))
            .await
            .unwrap();

        assert_eq!(termination.signal, Signal::Interrupt);
        assert!(termination.children.is_empty());
        assert!(h.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn fork_request_carries_identity_and_flag() {
        let settings = DispatchSettings {
            kill_master: true,
            ..settings()
        };
        let h = harness(DrainBehavior::Immediate, &[], settings).await;

        h.dispatcher
            .run(queue(&[Signal::User1, Signal::Terminate]))
            .await
            .unwrap();

        let calls = h.calls.lock().unwrap();
        assert_eq!(calls[0], ("127.0.0.1:0".to_string(), std::process::id(), true));
    }

    #[tokio::test]
    async fn deadline_exceeded_still_terminates() {
        let settings = DispatchSettings {
            kill_master: false,
            shutdown_timeout: Duration::from_millis(200),
        };
        let h = harness(DrainBehavior::Hang, &[], settings).await;

        let termination = h.dispatcher.run(queue(&[Signal::Terminate])).await.unwrap();

        assert_eq!(termination.outcome, ShutdownOutcome::DeadlineExceeded);
        assert_eq!(h.counters.force_closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn engine_failure_is_fatal() {
        let h = harness(DrainBehavior::Fail, &[], settings()).await;

        let err = h.dispatcher.run(queue(&[Signal::Terminate])).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Shutdown(ShutdownError::Engine(_))));
    }

    #[tokio::test]
    async fn closed_queue_is_an_error() {
        let h = harness(DrainBehavior::Immediate, &[], settings()).await;

        let err = h.dispatcher.run(queue(&[Signal::User1])).await.unwrap_err();
        assert!(matches!(err, LifecycleError::SignalsClosed));
    }

    #[tokio::test]
    async fn surviving_master_keeps_running_but_tracks_child() {
        let settings = DispatchSettings {
            kill_master: true,
            ..settings()
        };
        let h = harness(DrainBehavior::Immediate, &[Scripted::MasterSurvives], settings).await;

        let termination = h
            .dispatcher
            .run(queue(&[Signal::Hangup, Signal::Terminate]))
            .await
            .unwrap();

        // The hangup did not shut down; the later terminate did.
        assert_eq!(termination.signal, Signal::Terminate);
        assert_eq!(termination.children.len(), 1);
        assert_eq!(h.counters.drains.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn fork_failures_are_labelled_by_whether_a_child_runs() {
        let survived = ForkError::KillMaster {
            master_pid: 1,
            child_pid: 2,
            source: std::io::Error::from_raw_os_error(libc::EPERM),
        };
        assert_eq!(fork_failure_outcome(&survived), "spawned_master_alive");
        assert_eq!(
            fork_failure_outcome(&ForkError::UnsupportedListener("udp")),
            "failed"
        );
    }
}
