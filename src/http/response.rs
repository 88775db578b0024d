use std::collections::HashMap;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::http::request::find_header;
use crate::http::signal::CloseSignal;
use crate::http::writer::{SerializeError, SerializedResponse, serialize_response};

/// Body sent when the application handler fails.
pub const ERROR_BODY: &str = "An error happened";

/// Chunks buffered between a [`BodySender`] and the connection.
const STREAM_CAPACITY: usize = 16;

/// HTTP status code with its standard reason phrase.
///
/// Any three-digit code is representable; the associated constants cover the
/// codes the server produces itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(u16);

impl StatusCode {
    pub const OK: StatusCode = StatusCode(200);
    pub const CREATED: StatusCode = StatusCode(201);
    pub const NO_CONTENT: StatusCode = StatusCode(204);
    pub const BAD_REQUEST: StatusCode = StatusCode(400);
    pub const NOT_FOUND: StatusCode = StatusCode(404);
    pub const PAYLOAD_TOO_LARGE: StatusCode = StatusCode(413);
    pub const INTERNAL_SERVER_ERROR: StatusCode = StatusCode(500);

    /// Returns `None` outside of `100..=999`.
    pub fn from_u16(code: u16) -> Option<Self> {
        (100..=999).contains(&code).then_some(StatusCode(code))
    }

    /// Returns the numeric HTTP status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use ferry::http::response::StatusCode;
    /// assert_eq!(StatusCode::OK.as_u16(), 200);
    /// assert_eq!(StatusCode::NOT_FOUND.as_u16(), 404);
    /// ```
    pub fn as_u16(&self) -> u16 {
        self.0
    }

    /// Returns the standard HTTP reason phrase for this status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use ferry::http::response::StatusCode;
    /// assert_eq!(StatusCode::OK.reason_phrase(), "OK");
    /// assert_eq!(StatusCode::NOT_FOUND.reason_phrase(), "Not Found");
    /// ```
    pub fn reason_phrase(&self) -> &'static str {
        match self.0 {
            100 => "Continue",
            101 => "Switching Protocols",
            200 => "OK",
            201 => "Created",
            202 => "Accepted",
            204 => "No Content",
            206 => "Partial Content",
            301 => "Moved Permanently",
            302 => "Found",
            303 => "See Other",
            304 => "Not Modified",
            307 => "Temporary Redirect",
            308 => "Permanent Redirect",
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            405 => "Method Not Allowed",
            408 => "Request Timeout",
            409 => "Conflict",
            411 => "Length Required",
            413 => "Payload Too Large",
            415 => "Unsupported Media Type",
            422 => "Unprocessable Entity",
            429 => "Too Many Requests",
            500 => "Internal Server Error",
            501 => "Not Implemented",
            502 => "Bad Gateway",
            503 => "Service Unavailable",
            504 => "Gateway Timeout",
            _ => "Unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BodyError {
    #[error("body stream aborted")]
    Aborted,
}

/// A response body: a sequence of byte chunks.
#[derive(Debug)]
pub enum Body {
    /// Chunks known up front.
    Full(Vec<Bytes>),
    /// Chunks produced over time through a [`BodySender`].
    Stream(BodyStream),
}

impl Body {
    pub fn empty() -> Self {
        Body::Full(Vec::new())
    }

    /// Creates a streaming body and the sender that feeds it.
    pub fn channel() -> (BodySender, Body) {
        let (tx, rx) = mpsc::channel(STREAM_CAPACITY);
        let abort = CloseSignal::new();

        let sender = BodySender { tx, abort: abort.clone() };
        (sender, Body::Stream(BodyStream { rx, abort }))
    }

    /// Total length, when known without consuming the body.
    pub fn len(&self) -> Option<usize> {
        match self {
            Body::Full(chunks) => Some(chunks.iter().map(Bytes::len).sum()),
            Body::Stream(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, Body::Stream(_))
    }
}

impl From<Vec<Bytes>> for Body {
    fn from(chunks: Vec<Bytes>) -> Self {
        Body::Full(chunks)
    }
}

impl From<Bytes> for Body {
    fn from(chunk: Bytes) -> Self {
        Body::Full(vec![chunk])
    }
}

impl From<Vec<u8>> for Body {
    fn from(chunk: Vec<u8>) -> Self {
        Body::Full(vec![Bytes::from(chunk)])
    }
}

impl From<String> for Body {
    fn from(chunk: String) -> Self {
        Body::Full(vec![Bytes::from(chunk)])
    }
}

impl From<&'static str> for Body {
    fn from(chunk: &'static str) -> Self {
        Body::Full(vec![Bytes::from_static(chunk.as_bytes())])
    }
}

impl From<Vec<&'static str>> for Body {
    fn from(chunks: Vec<&'static str>) -> Self {
        Body::Full(
            chunks
                .into_iter()
                .map(|c| Bytes::from_static(c.as_bytes()))
                .collect(),
        )
    }
}

/// Receiving half of a streaming body.
#[derive(Debug)]
pub struct BodyStream {
    rx: mpsc::Receiver<Bytes>,
    abort: CloseSignal,
}

impl BodyStream {
    /// Next chunk, `Ok(None)` once the sender is dropped.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, BodyError> {
        if self.abort.is_signaled() {
            return Err(BodyError::Aborted);
        }

        tokio::select! {
            chunk = self.rx.recv() => Ok(chunk),
            _ = self.abort.wait() => Err(BodyError::Aborted),
        }
    }

    pub fn abort_handle(&self) -> CloseSignal {
        self.abort.clone()
    }

    /// Marks the stream failed. The producer's next send errors out.
    pub fn fail(&self) -> bool {
        self.abort.signal()
    }
}

/// Producing half of a streaming body. Dropping it ends the body.
#[derive(Debug, Clone)]
pub struct BodySender {
    tx: mpsc::Sender<Bytes>,
    abort: CloseSignal,
}

impl BodySender {
    /// Sends one chunk, waiting while the connection is behind.
    ///
    /// Fails once the body has been marked failed or the connection dropped
    /// it, so producers stop instead of waiting forever.
    pub async fn send(&self, chunk: impl Into<Bytes>) -> Result<(), BodyError> {
        if self.abort.is_signaled() {
            return Err(BodyError::Aborted);
        }

        tokio::select! {
            sent = self.tx.send(chunk.into()) => sent.map_err(|_| BodyError::Aborted),
            _ = self.abort.wait() => Err(BodyError::Aborted),
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_signaled() || self.tx.is_closed()
    }

    /// Resolves when the body is marked failed.
    pub async fn aborted(&self) {
        self.abort.wait().await
    }
}

/// Status, headers and body produced by the application.
#[derive(Debug)]
pub struct Reply {
    pub status: u16,
    pub headers: HashMap<String, String>,
    /// `None` is tolerated and written as an empty body.
    pub body: Option<Body>,
}

impl Reply {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: None,
        }
    }

    /// Adds or replaces a header.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Creates a simple 200 OK reply with the given body.
    pub fn ok(body: impl Into<Body>) -> Self {
        Reply::new(200).body(body)
    }

    pub fn not_found() -> Self {
        Reply::new(404).body("404 Not Found")
    }

    /// The fixed reply used when the application handler fails.
    pub fn internal_error() -> Self {
        Reply::new(500).body(ERROR_BODY)
    }
}

impl<B: Into<Body>> From<(u16, HashMap<String, String>, B)> for Reply {
    fn from((status, headers, body): (u16, HashMap<String, String>, B)) -> Self {
        Self {
            status,
            headers,
            body: Some(body.into()),
        }
    }
}

/// Response side of one exchange.
///
/// Filled once from a [`Reply`], serialized, then closed.
#[derive(Debug)]
pub struct Response {
    status: u16,
    headers: HashMap<String, String>,
    body: Option<Body>,
    abort: Option<CloseSignal>,
    closed: bool,
}

impl Response {
    pub fn new() -> Self {
        Self {
            status: 200,
            headers: HashMap::new(),
            body: None,
            abort: None,
            closed: false,
        }
    }

    pub fn set_result(&mut self, reply: Reply) {
        self.abort = match &reply.body {
            Some(Body::Stream(stream)) => Some(stream.abort_handle()),
            _ => None,
        };
        self.status = reply.status;
        self.headers = reply.headers;
        self.body = reply.body;
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        find_header(&self.headers, key)
    }

    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    /// `Content-Length` as it will be written: the header if set, otherwise
    /// the body length when known.
    pub fn content_length(&self) -> Option<usize> {
        match self.header("Content-Length") {
            Some(v) => v.parse().ok(),
            None => self.body.as_ref().map_or(Some(0), Body::len),
        }
    }

    /// The body rendered for log output.
    pub fn body_str(&self) -> String {
        match &self.body {
            Some(Body::Full(chunks)) => chunks
                .iter()
                .map(|c| String::from_utf8_lossy(c))
                .collect(),
            Some(Body::Stream(_)) => "<stream>".to_string(),
            None => String::new(),
        }
    }

    /// Turns the response into wire chunks. The body moves into the result.
    pub fn serialize(&mut self) -> Result<SerializedResponse, SerializeError> {
        let status = StatusCode::from_u16(self.status)
            .ok_or(SerializeError::InvalidStatus(self.status))?;
        serialize_response(status, &self.headers, self.body.take())
    }

    /// Marks a streaming body failed. Returns `false` when there is no
    /// stream or it was already failed.
    pub fn fail_body(&self) -> bool {
        self.abort.as_ref().is_some_and(CloseSignal::signal)
    }

    /// Releases whatever body is still held. Idempotent.
    pub fn close(&mut self) {
        self.body = None;
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}
