use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tracing::Span;

use crate::config::{Config, ServerOptions};
use crate::context::ServerContext;
use crate::http::handler::{AsyncCallback, Deferred};
use crate::http::parser::{ParseError, RequestParser};
use crate::http::signal::CloseSignal;
use crate::status::ServerStatus;

/// HTTP request methods.
///
/// Represents the HTTP method/verb of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET - Retrieve a resource
    GET,
    /// POST - Create or submit data
    POST,
    /// PUT - Replace a resource
    PUT,
    /// DELETE - Delete a resource
    DELETE,
    /// HEAD - Like GET but without the response body
    HEAD,
    /// OPTIONS - Describe communication options
    OPTIONS,
    /// PATCH - Partial modification of a resource
    PATCH
}

impl Method {
    /// Parses an HTTP method from a string.
    ///
    /// # Arguments
    ///
    /// * `s` - String representation of the method (case-sensitive, typically uppercase)
    ///
    /// # Returns
    ///
    /// `Some(Method)` if the string matches a known method, `None` otherwise.
    ///
    /// # Example
    ///
    /// ```
    /// # use ferry::http::request::Method;
    /// assert_eq!(Method::from_str("GET"), Some(Method::GET));
    /// assert_eq!(Method::from_str("get"), None);
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "GET" => Some(Method::GET),
            "POST" => Some(Method::POST),
            "PUT" => Some(Method::PUT),
            "DELETE" => Some(Method::DELETE),
            "HEAD" => Some(Method::HEAD),
            "OPTIONS" => Some(Method::OPTIONS),
            "PATCH" => Some(Method::PATCH),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::HEAD => "HEAD",
            Method::OPTIONS => "OPTIONS",
            Method::PATCH => "PATCH",
        }
    }
}

/// The fields of a fully received request.
#[derive(Debug, Clone)]
pub struct ParsedRequest {
    /// The HTTP method (GET, POST, etc.)
    pub method: Method,
    /// The request path/URL (e.g., "/index.html")
    pub path: String,
    /// HTTP version (typically "HTTP/1.1")
    pub version: String,
    /// Request headers as sent by the client
    pub headers: HashMap<String, String>,
    /// Request body, `Content-Length` bytes long
    pub body: Bytes,
}

impl ParsedRequest {
    /// Retrieves a header value by name, ignoring ASCII case.
    pub fn header(&self, key: &str) -> Option<&str> {
        find_header(&self.headers, key)
    }

    /// Retrieves the Content-Length header value and parses it as a usize.
    ///
    /// Returns 0 if the header is missing or not a valid number.
    pub fn content_length(&self) -> usize {
        self.header("Content-Length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }

    /// Whether the client asked to keep the connection open.
    ///
    /// Informational only: every exchange closes its connection once written.
    pub fn keep_alive(&self) -> bool {
        self.header("Connection")
            .map(|v| v.eq_ignore_ascii_case("keep-alive"))
            .unwrap_or(self.version == "HTTP/1.1")
    }
}

pub(crate) fn find_header<'a>(headers: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.as_str())
}

/// Request side of one exchange.
///
/// Created when the connection is accepted and fed by the connection as
/// bytes arrive. Holds the single-fire `async_close` signal that marks the
/// end of the whole exchange, and the callback slot handed to the
/// application through [`Env`].
#[derive(Debug)]
pub struct Request {
    remote_addr: Option<SocketAddr>,
    parser: RequestParser,
    async_close: CloseSignal,
    async_callback: Option<AsyncCallback>,
    start_time: Instant,
    started: bool,
    context: ServerContext,
    span: Span,
}

impl Request {
    pub fn new(
        remote_addr: Option<SocketAddr>,
        async_callback: AsyncCallback,
        context: ServerContext,
        span: Span,
    ) -> Self {
        Self {
            remote_addr,
            parser: RequestParser::new(context.options().max_request_bytes),
            async_close: CloseSignal::new(),
            async_callback: Some(async_callback),
            start_time: Instant::now(),
            started: false,
            context,
            span,
        }
    }

    /// Feeds raw bytes to the parser. The start timestamp is taken from the
    /// first non-empty chunk.
    pub fn feed(&mut self, data: &[u8]) -> Result<(), ParseError> {
        if !self.started && !data.is_empty() {
            self.started = true;
            self.start_time = Instant::now();
        }

        let finished = self.parser.feed(data)?;
        if finished {
            let _enter = self.span.enter();
            tracing::trace!(trailing = self.parser.trailing(), "request complete");
        }
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.parser.is_finished()
    }

    pub fn parsed(&self) -> Option<&ParsedRequest> {
        self.parser.request()
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn start_time(&self) -> Instant {
        self.start_time
    }

    pub fn async_close(&self) -> &CloseSignal {
        &self.async_close
    }

    /// Builds the environment handed to the application handler.
    ///
    /// Returns `None` until the request is finished. The async callback moves
    /// into the first environment built.
    pub fn env(&mut self) -> Option<Env> {
        let parsed = self.parser.request()?.clone();

        Some(Env {
            method: parsed.method,
            path: parsed.path,
            version: parsed.version,
            headers: parsed.headers,
            body: parsed.body,
            remote_addr: self.remote_addr,
            start_time: self.start_time,
            async_close: self.async_close.clone(),
            config: Arc::clone(&self.context.config),
            status: Arc::clone(&self.context.status),
            async_callback: self.async_callback.take(),
        })
    }
}

/// Everything the application handler gets to see about a request.
#[derive(Debug)]
pub struct Env {
    pub method: Method,
    pub path: String,
    pub version: String,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
    pub remote_addr: Option<SocketAddr>,
    pub start_time: Instant,
    /// Fires when the exchange ends, including on peer disconnect.
    pub async_close: CloseSignal,
    pub config: Arc<Config>,
    pub status: Arc<ServerStatus>,
    async_callback: Option<AsyncCallback>,
}

impl Env {
    pub fn header(&self, key: &str) -> Option<&str> {
        find_header(&self.headers, key)
    }

    pub fn options(&self) -> &ServerOptions {
        &self.config.server
    }

    /// Whether the async callback is still in the slot.
    pub fn can_defer(&self) -> bool {
        self.async_callback.is_some()
    }

    /// Takes the async callback out of the environment.
    ///
    /// The returned [`Deferred`] token is what the handler returns to say
    /// that the reply will arrive later through the callback.
    pub fn defer(&mut self) -> anyhow::Result<(Deferred, AsyncCallback)> {
        let callback = self
            .async_callback
            .take()
            .ok_or_else(|| anyhow::anyhow!("async callback already taken"))?;
        Ok((Deferred::new(), callback))
    }
}
