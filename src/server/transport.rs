use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;

use bytes::{Buf, Bytes};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::http::connection::Transport;
use crate::http::error::TransportError;
use crate::http::writer::Outgoing;

/// Transport that queues writes for the connection task to flush.
///
/// Writes never block: they land in the queue and are drained by
/// [`QueuedTransport::flush_some`]. A requested close only takes effect
/// once the queue is empty.
#[derive(Debug)]
pub struct QueuedTransport {
    queue: VecDeque<Outgoing>,
    peer: Option<SocketAddr>,
    close_requested: bool,
    closed: bool,
    bytes_written: u64,
}

impl QueuedTransport {
    pub fn new(peer: Option<SocketAddr>) -> Self {
        Self {
            queue: VecDeque::new(),
            peer,
            close_requested: false,
            closed: false,
            bytes_written: 0,
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.closed && !self.queue.is_empty()
    }

    /// A streaming body is still queued.
    pub fn has_stream(&self) -> bool {
        self.queue
            .iter()
            .any(|item| matches!(item, Outgoing::Stream(_)))
    }

    /// Close was requested and everything queued has been written.
    pub fn should_shutdown(&self) -> bool {
        !self.closed && self.close_requested && self.queue.is_empty()
    }

    /// The socket is gone. Anything still queued is dropped.
    pub fn mark_closed(&mut self) {
        self.closed = true;
        self.queue.clear();
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Makes progress on the front of the queue: one socket write, or one
    /// chunk pulled from a streaming body.
    ///
    /// Cancel safe: dropping the future loses no queued data.
    pub async fn flush_some<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        enum Step {
            Keep,
            Pop,
            Push(Bytes),
        }

        let step = match self.queue.front_mut() {
            None => return Ok(()),
            Some(Outgoing::Data(bytes)) => {
                let n = writer.write(&bytes[..]).await?;
                if n == 0 {
                    return Err(io::ErrorKind::WriteZero.into());
                }
                self.bytes_written += n as u64;
                bytes.advance(n);
                if bytes.is_empty() { Step::Pop } else { Step::Keep }
            }
            Some(Outgoing::Stream(stream)) => match stream.next_chunk().await {
                Ok(Some(chunk)) if chunk.is_empty() => Step::Keep,
                Ok(Some(chunk)) => Step::Push(chunk),
                // finished or failed, either way nothing more comes out of it
                Ok(None) | Err(_) => Step::Pop,
            },
        };

        match step {
            Step::Keep => {}
            Step::Pop => {
                self.queue.pop_front();
                if self.queue.is_empty() {
                    writer.flush().await?;
                }
            }
            Step::Push(chunk) => self.queue.push_front(Outgoing::Data(chunk)),
        }
        Ok(())
    }
}

impl Transport for QueuedTransport {
    fn write(&mut self, item: Outgoing) -> Result<(), TransportError> {
        if self.closed || self.close_requested {
            return Err(TransportError::Closed);
        }
        self.queue.push_back(item);
        Ok(())
    }

    fn close_after_flush(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.close_requested = true;
        Ok(())
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.peer
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "peer address unknown"))
    }
}
