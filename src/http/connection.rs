use std::any::Any;
use std::io;
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{Span, debug, error, info, trace, warn};

use crate::context::ServerContext;
use crate::http::error::{ConnectionError, TransportError};
use crate::http::handler::{AsyncCallback, Handler, HandlerResult};
use crate::http::parser::ParseError;
use crate::http::request::Request;
use crate::http::response::{Reply, Response};
use crate::http::writer::Outgoing;

/// Byte sink for one connection.
pub trait Transport {
    /// Queues data for writing. Must not block.
    fn write(&mut self, item: Outgoing) -> Result<(), TransportError>;

    /// Closes the connection once everything queued has been written.
    fn close_after_flush(&mut self) -> Result<(), TransportError>;

    fn peer_addr(&self) -> io::Result<SocketAddr>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    AwaitingRequest,
    Processing,
    SyncComplete,
    AsyncPending,
    Terminated,
}

/// Drives the single exchange of one connection.
///
/// Every entry point is synchronous and is expected to be called from the
/// one task that owns the connection: [`Connection::feed`] for incoming
/// bytes, [`Connection::async_complete`] for a deferred reply and
/// [`Connection::unbind`] when the peer goes away.
pub struct Connection<T> {
    transport: T,
    handler: Arc<dyn Handler>,
    request: Request,
    response: Response,
    state: ConnectionState,
    deferred: Option<oneshot::Receiver<Reply>>,
    context: ServerContext,
    span: Span,
    unbound: bool,
}

impl<T: Transport> Connection<T> {
    pub fn new(transport: T, handler: Arc<dyn Handler>, context: ServerContext) -> Self {
        let remote_addr = transport.peer_addr().ok();
        let span = tracing::info_span!("connection", peer = ?remote_addr);

        let (callback, deferred) = AsyncCallback::channel();
        let request = Request::new(remote_addr, callback, context.clone(), span.clone());

        context.status.connection_opened();

        Self {
            transport,
            handler,
            request,
            response: Response::new(),
            state: ConnectionState::AwaitingRequest,
            deferred: Some(deferred),
            context,
            span,
            unbound: false,
        }
    }

    pub fn feed(&mut self, data: &[u8]) {
        let span = self.span.clone();
        let _enter = span.enter();

        if self.state != ConnectionState::AwaitingRequest {
            trace!(bytes = data.len(), state = ?self.state, "ignoring bytes after request");
            return;
        }

        match self.request.feed(data) {
            Ok(()) => {
                if self.request.is_finished() {
                    self.process();
                }
            }
            Err(e) => {
                warn!(error = %e, "rejecting request");
                self.state = ConnectionState::Processing;
                let reply = match e {
                    ParseError::TooLarge { .. } => Reply::new(413).body("413 Payload Too Large"),
                    _ => Reply::new(400).body("400 Bad Request"),
                };
                self.finalize(HandlerResult::Immediate(reply));
            }
        }
    }

    fn process(&mut self) {
        self.state = ConnectionState::Processing;

        let Some(env) = self.request.env() else {
            error!("processing an unfinished request");
            self.finalize(HandlerResult::Immediate(Reply::internal_error()));
            return;
        };
        self.context.status.request_started();

        let handler = Arc::clone(&self.handler);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.call(env)));

        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                self.context.status.handler_failed();
                error!(error = %e, details = ?e, "application handler failed");
                HandlerResult::Immediate(Reply::internal_error())
            }
            Err(payload) => {
                self.context.status.handler_failed();
                error!(panic = panic_message(&*payload), "application handler panicked");
                HandlerResult::Immediate(Reply::internal_error())
            }
        };

        self.finalize(result);
    }

    fn finalize(&mut self, result: HandlerResult) {
        let reply = match result {
            HandlerResult::Deferred(_) => {
                self.state = ConnectionState::AsyncPending;
                self.context.status.deferred_started();
                debug!("response deferred");
                return;
            }
            HandlerResult::Immediate(reply) => reply,
        };

        self.state = ConnectionState::SyncComplete;
        if let Err(e) = self.send_sync(reply) {
            error!(error = %e, details = ?e, "failed to send response");
        }
        self.terminate();
    }

    fn send_sync(&mut self, reply: Reply) -> Result<(), ConnectionError> {
        self.response.set_result(reply);

        if self.response.status() != 200 {
            info!(
                status = self.response.status(),
                body = %self.response.body_str(),
                "sync response body"
            );
        }
        if self.response.body().is_none() {
            debug!("response body is absent");
        }

        self.send_response()
    }

    fn send_response(&mut self) -> Result<(), ConnectionError> {
        for item in self.response.serialize()? {
            self.transport.write(item)?;
        }
        Ok(())
    }

    /// Delivers the reply promised by a deferred handler result.
    ///
    /// Errors are returned to the caller without terminating the exchange.
    pub fn async_complete(&mut self, reply: Reply) -> Result<(), ConnectionError> {
        let span = self.span.clone();
        let _enter = span.enter();

        if self.state != ConnectionState::AsyncPending {
            return Err(ConnectionError::NotPending(self.state));
        }

        self.response.set_result(reply);

        let elapsed_ms = self.request.start_time().elapsed().as_secs_f64() * 1000.0;
        info!(
            status = self.response.status(),
            content_length = self.response.header("Content-Length").unwrap_or("-"),
            response_time = %format!("{elapsed_ms:.2}ms"),
            "async response"
        );

        self.send_response()?;
        self.terminate();
        Ok(())
    }

    /// Completes a deferred exchange whose callback was dropped unused.
    pub fn abandon_deferred(&mut self) -> Result<(), ConnectionError> {
        let span = self.span.clone();
        let _enter = span.enter();

        error!("deferred reply dropped without being delivered");
        self.context.status.handler_failed();
        self.async_complete(Reply::internal_error())
    }

    fn terminate(&mut self) {
        if self.state == ConnectionState::Terminated {
            warn!("exchange already terminated");
            return;
        }
        self.mark_terminated();

        match self.transport.close_after_flush() {
            Ok(()) | Err(TransportError::Closed) => {}
            Err(e) => debug!(error = %e, "close after flush failed"),
        }

        self.request.async_close().signal();
        self.response.close();
        self.context.status.response_completed();
    }

    fn mark_terminated(&mut self) {
        if self.state == ConnectionState::AsyncPending {
            self.context.status.deferred_finished();
        }
        self.state = ConnectionState::Terminated;
    }

    /// The peer went away. Valid in any state, repeated calls are no-ops.
    pub fn unbind(&mut self) {
        let span = self.span.clone();
        let _enter = span.enter();

        if self.unbound {
            return;
        }
        self.unbound = true;
        debug!(state = ?self.state, "peer disconnected");

        self.request.async_close().signal();
        if self.response.fail_body() {
            debug!("streaming body aborted");
        }
        if self.state != ConnectionState::Terminated {
            self.mark_terminated();
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_terminated(&self) -> bool {
        self.state == ConnectionState::Terminated
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Receiving end of the async callback handed to the application.
    pub fn take_deferred(&mut self) -> Option<oneshot::Receiver<Reply>> {
        self.deferred.take()
    }
}

impl<T> Drop for Connection<T> {
    fn drop(&mut self) {
        self.context.status.connection_closed();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
