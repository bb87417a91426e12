//! Axum-backed serving engine.
//!
//! # Responsibilities
//! - Serve a router on a TCP or unix-domain listener
//! - Count in-flight requests
//! - Stop accepting on drain and wait for open connections to finish
//!
//! # Design Decisions
//! - The accept loop runs on its own task; the lifecycle only holds the
//!   join handle
//! - Drain is unbounded; the caller imposes the deadline and force-closes
//! - Force close aborts the accept task, leaving connection tasks to die
//!   with the process

use std::io;

use axum::{
    extract::{Request, State},
    middleware::{self, Next},
    response::Response,
    Router,
};
use tokio::task::JoinHandle;

use crate::lifecycle::{EngineError, ServingEngine, Shutdown};
use crate::net::connection::RequestTracker;
use crate::net::ServerListener;

/// HTTP serving engine.
pub struct HttpEngine {
    router: Router,
    shutdown: Shutdown,
    tracker: RequestTracker,
    task: Option<JoinHandle<io::Result<()>>>,
}

impl HttpEngine {
    pub fn new(router: Router) -> Self {
        let tracker = RequestTracker::new();
        let router =
            router.layer(middleware::from_fn_with_state(tracker.clone(), track_request));

        Self {
            router,
            shutdown: Shutdown::new(),
            tracker,
            task: None,
        }
    }

    /// Number of requests currently being served.
    pub fn in_flight(&self) -> u64 {
        self.tracker.active_count()
    }

    pub fn is_serving(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl ServingEngine for HttpEngine {
    fn start(&mut self, listener: ServerListener) -> Result<(), EngineError> {
        if self.task.is_some() {
            return Err(EngineError::AlreadyStarted);
        }

        let router = self.router.clone();
        let mut stop = self.shutdown.subscribe();
        let stopped = async move {
            let _ = stop.recv().await;
        };

        let task = match listener {
            ServerListener::Tcp(l) => tokio::spawn(async move {
                axum::serve(l, router).with_graceful_shutdown(stopped).await
            }),
            ServerListener::Unix(l) => tokio::spawn(async move {
                axum::serve(l, router).with_graceful_shutdown(stopped).await
            }),
        };

        self.task = Some(task);
        Ok(())
    }

    async fn drain(&mut self) -> Result<(), EngineError> {
        let task = self.task.as_mut().ok_or(EngineError::NotStarted)?;

        tracing::info!(in_flight = self.tracker.active_count(), "Draining HTTP engine");
        self.shutdown.trigger();

        let result = task.await;
        self.task = None;
        result??;

        tracing::info!("HTTP engine drained");
        Ok(())
    }

    fn force_close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::warn!(
                abandoned = self.tracker.active_count(),
                "HTTP engine force closed"
            );
        }
    }
}

async fn track_request(
    State(tracker): State<RequestTracker>,
    request: Request,
    next: Next,
) -> Response {
    let guard = tracker.track();
    tracing::trace!(
        request_id = %guard.id(),
        method = %request.method(),
        path = %request.uri().path(),
        "Request started"
    );
    next.run(request).await
}
