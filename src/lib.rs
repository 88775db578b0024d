//! Ferry - per-connection HTTP exchange lifecycle
//!
//! Core library: connection state machine, request/response contexts and the
//! tokio server that drives them.

pub mod config;
pub mod context;
pub mod http;
pub mod server;
pub mod status;
