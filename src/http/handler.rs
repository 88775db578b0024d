//! The seam between the server and the application.
//!
//! A [`Handler`] is called once per exchange with the request [`Env`] and
//! answers with a [`HandlerResult`]:
//!
//! - [`HandlerResult::Immediate`] carries the reply, written right away.
//! - [`HandlerResult::Deferred`] promises a reply later. The token is only
//!   obtainable from [`Env::defer`], which also hands out the
//!   [`AsyncCallback`] that delivers the reply.

use std::fmt;

use tokio::sync::oneshot;

use crate::http::request::Env;
use crate::http::response::Reply;

pub trait Handler: Send + Sync {
    fn call(&self, env: Env) -> anyhow::Result<HandlerResult>;
}

#[derive(Debug)]
pub enum HandlerResult {
    Immediate(Reply),
    Deferred(Deferred),
}

impl HandlerResult {
    pub fn immediate(reply: impl Into<Reply>) -> Self {
        HandlerResult::Immediate(reply.into())
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, HandlerResult::Deferred(_))
    }
}

impl From<Reply> for HandlerResult {
    fn from(reply: Reply) -> Self {
        HandlerResult::Immediate(reply)
    }
}

impl From<Deferred> for HandlerResult {
    fn from(deferred: Deferred) -> Self {
        HandlerResult::Deferred(deferred)
    }
}

/// Proof that the async callback was taken out of the environment.
#[derive(Debug)]
pub struct Deferred {
    _private: (),
}

impl Deferred {
    pub(crate) fn new() -> Self {
        Self { _private: () }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CallbackError {
    #[error("connection is gone, deferred reply dropped")]
    ConnectionGone(Box<Reply>),
}

/// Delivers a deferred reply to the connection that issued it.
///
/// Consumed on use, so a reply can be delivered at most once. Safe to move
/// to another task or thread.
pub struct AsyncCallback {
    tx: oneshot::Sender<Reply>,
}

impl AsyncCallback {
    /// Creates a callback and the receiving end the connection listens on.
    pub fn channel() -> (Self, oneshot::Receiver<Reply>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    pub fn call(self, reply: impl Into<Reply>) -> Result<(), CallbackError> {
        self.tx
            .send(reply.into())
            .map_err(|reply| CallbackError::ConnectionGone(Box::new(reply)))
    }

    /// Whether the connection stopped listening for the reply.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl fmt::Debug for AsyncCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncCallback")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

impl<F> Handler for HandlerFn<F>
where
    F: Fn(Env) -> anyhow::Result<HandlerResult> + Send + Sync,
{
    fn call(&self, env: Env) -> anyhow::Result<HandlerResult> {
        (self.f)(env)
    }
}

pub fn make_handler<F>(f: F) -> HandlerFn<F>
where
    F: Fn(Env) -> anyhow::Result<HandlerResult> + Send + Sync,
{
    HandlerFn { f }
}
