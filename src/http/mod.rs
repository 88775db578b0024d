//! HTTP exchange handling.
//!
//! This module implements the request/response lifecycle of one connection:
//! bytes in, one application call, one response out, then close.
//!
//! # Architecture
//!
//! - **`connection`**: The connection handler implementing the exchange state machine
//! - **`parser`**: Incremental request parsing from byte chunks
//! - **`request`**: Request context and the environment handed to the application
//! - **`response`**: Response context, replies and (streaming) bodies
//! - **`writer`**: Serializes responses into wire chunks
//! - **`handler`**: The application handler seam and the async callback
//! - **`signal`**: Single-fire close notification
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌──────────────────┐
//!        │ AwaitingRequest  │ ← Feed bytes to the parser
//!        └──────┬───────────┘
//!               │ Request finished
//!               ▼
//!        ┌──────────────────┐
//!        │   Processing     │ ← Call the application handler
//!        └──────┬───────────┘
//!               ├─ Immediate reply → SyncComplete ─ write ─┐
//!               └─ Deferred        → AsyncPending          │
//!                                      │ callback fires     │
//!                                      ▼                    ▼
//!                               write reply ──────▶ ┌──────────────┐
//!                                                   │  Terminated  │ ← close after flush
//!                                                   └──────────────┘
//! ```
//!
//! A peer disconnect (`unbind`) may arrive in any state. It fires the
//! request's close signal and fails a streaming body still being written.

pub mod connection;
pub mod error;
pub mod handler;
pub mod parser;
pub mod request;
pub mod response;
pub mod signal;
pub mod writer;

pub use connection::{Connection, ConnectionState, Transport};
pub use error::{ConnectionError, TransportError};
pub use handler::{AsyncCallback, CallbackError, Deferred, Handler, HandlerResult, make_handler};
pub use request::{Env, Method, Request};
pub use response::{Body, BodyError, BodySender, Reply, Response, StatusCode};
pub use signal::CloseSignal;
pub use writer::Outgoing;
