use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;
use tracing::debug;

use crate::context::ServerContext;
use crate::http::connection::{Connection, ConnectionState};
use crate::http::handler::Handler;
use crate::http::response::Reply;
use crate::server::transport::QueuedTransport;

const READ_BUFFER_SIZE: usize = 4096;

/// Runs one connection to completion.
///
/// This task is the only place the connection is touched: socket reads,
/// queued writes and the deferred reply are multiplexed here, so the
/// connection itself needs no locking. Returns an error only when
/// delivering a deferred reply fails.
pub async fn serve_connection<S>(
    stream: S,
    peer: Option<SocketAddr>,
    handler: Arc<dyn Handler>,
    context: ServerContext,
) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut conn = Connection::new(QueuedTransport::new(peer), handler, context);
    let mut deferred = conn.take_deferred();
    let mut buffer = BytesMut::with_capacity(READ_BUFFER_SIZE);
    let mut reading = true;

    loop {
        if conn.transport().should_shutdown() {
            if let Err(e) = writer.shutdown().await {
                debug!(error = %e, "shutdown after flush failed");
            }
            conn.transport_mut().mark_closed();
            break;
        }

        let writing = conn.transport().has_pending();
        let awaiting_reply = conn.state() == ConnectionState::AsyncPending && deferred.is_some();

        tokio::select! {
            written = conn.transport_mut().flush_some(&mut writer), if writing => {
                if let Err(e) = written {
                    debug!(error = %e, "write failed");
                    conn.transport_mut().mark_closed();
                    conn.unbind();
                    break;
                }
            }
            reply = wait_deferred(&mut deferred), if awaiting_reply => {
                deferred = None;
                let completed = match reply {
                    Ok(reply) => conn.async_complete(reply),
                    Err(_) => conn.abandon_deferred(),
                };
                if let Err(e) = completed {
                    conn.unbind();
                    return Err(e.into());
                }
            }
            read = reader.read_buf(&mut buffer), if reading => match read {
                Ok(0) => {
                    reading = false;
                    // a finished exchange may still flush queued data after a
                    // half-close, but a streaming body has nobody left to read it
                    if !conn.is_terminated() || conn.transport().has_stream() {
                        conn.unbind();
                        break;
                    }
                }
                Ok(_) => {
                    conn.feed(&buffer);
                    buffer.clear();
                }
                Err(e) => {
                    debug!(error = %e, "read failed");
                    conn.unbind();
                    break;
                }
            },
            else => {
                conn.unbind();
                break;
            }
        }
    }

    Ok(())
}

async fn wait_deferred(
    rx: &mut Option<oneshot::Receiver<Reply>>,
) -> Result<Reply, oneshot::error::RecvError> {
    match rx {
        Some(rx) => rx.await,
        None => std::future::pending().await,
    }
}
