//! In-flight request tracking.
//!
//! # Responsibilities
//! - Count requests currently being served by this generation
//! - Generate unique request IDs for tracing
//! - Report what a forced close abandoned
//!
//! # Design Decisions
//! - Guard-based: the count drops even if a handler panics
//! - A watch channel holds the count so readers never lock

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use crate::observability::metrics;

/// Global atomic counter for request IDs.
static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a tracked request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

impl RequestId {
    pub fn new() -> Self {
        Self(REQUEST_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Tracks in-flight requests of one serving engine.
#[derive(Debug, Clone)]
pub struct RequestTracker {
    active: Arc<watch::Sender<u64>>,
}

impl RequestTracker {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self {
            active: Arc::new(tx),
        }
    }

    /// Record a new in-flight request. Returns a guard that decrements on drop.
    pub fn track(&self) -> RequestGuard {
        self.active.send_modify(|count| *count += 1);
        metrics::set_in_flight(self.active_count());
        RequestGuard {
            active: Arc::clone(&self.active),
            id: RequestId::new(),
        }
    }

    pub fn active_count(&self) -> u64 {
        *self.active.borrow()
    }
}

impl Default for RequestTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard that tracks a request's lifetime.
#[derive(Debug)]
pub struct RequestGuard {
    active: Arc<watch::Sender<u64>>,
    id: RequestId,
}

impl RequestGuard {
    pub fn id(&self) -> RequestId {
        self.id
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.active.send_modify(|count| *count = count.saturating_sub(1));
        metrics::set_in_flight(*self.active.borrow());
        tracing::trace!(request_id = %self.id, "Request finished");
    }
}
