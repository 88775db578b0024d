//! Tokio plumbing: accept loop, per-connection driver and the queued
//! transport the connection writes into.

pub mod driver;
pub mod listener;
pub mod transport;

pub use driver::serve_connection;
pub use transport::QueuedTransport;
