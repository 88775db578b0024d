use std::io;

use crate::http::connection::ConnectionState;
use crate::http::writer::SerializeError;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The peer or a previous close already shut the connection.
    #[error("connection already closed")]
    Closed,
    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Serialize(#[from] SerializeError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("deferred reply arrived in state {0:?}")]
    NotPending(ConnectionState),
}
