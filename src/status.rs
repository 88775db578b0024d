//! Process-wide counters shared by every connection.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct ServerStatus {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently open connections
    pub active_connections: AtomicU64,
    /// Requests handed to the application handler
    pub requests_started: AtomicU64,
    /// Exchanges that reached termination
    pub responses_completed: AtomicU64,
    /// Deferred responses promised but not yet delivered
    pub deferred_pending: AtomicU64,
    /// Application handler failures (errors and panics)
    pub handler_errors: AtomicU64,
}

impl ServerStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn request_started(&self) {
        self.requests_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn response_completed(&self) {
        self.responses_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn deferred_started(&self) {
        self.deferred_pending.fetch_add(1, Ordering::Relaxed);
    }

    pub fn deferred_finished(&self) {
        self.deferred_pending.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn handler_failed(&self) {
        self.handler_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn active(&self) -> u64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    pub fn pending_deferred(&self) -> u64 {
        self.deferred_pending.load(Ordering::Relaxed)
    }
}
