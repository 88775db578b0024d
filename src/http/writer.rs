use std::collections::HashMap;

use bytes::Bytes;

use crate::http::request::find_header;
use crate::http::response::{Body, BodyStream, StatusCode};

const HTTP_VERSION: &str = "HTTP/1.1";
const SERVER_NAME: &str = concat!("ferry/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SerializeError {
    #[error("invalid status code {0}")]
    InvalidStatus(u16),
    #[error("invalid header {0:?}")]
    InvalidHeader(String),
}

/// One unit handed to the transport.
#[derive(Debug)]
pub enum Outgoing {
    Data(Bytes),
    /// A body whose chunks are written as they are produced.
    Stream(BodyStream),
}

/// Wire form of a response: the head, then each body chunk in order.
#[derive(Debug)]
pub struct SerializedResponse {
    head: Option<Bytes>,
    chunks: std::vec::IntoIter<Bytes>,
    stream: Option<BodyStream>,
}

impl Iterator for SerializedResponse {
    type Item = Outgoing;

    fn next(&mut self) -> Option<Outgoing> {
        if let Some(head) = self.head.take() {
            return Some(Outgoing::Data(head));
        }

        if let Some(chunk) = self.chunks.by_ref().find(|c| !c.is_empty()) {
            return Some(Outgoing::Data(chunk));
        }

        self.stream.take().map(Outgoing::Stream)
    }
}

/// Serializes a response. An absent body is written as an empty one.
///
/// `Content-Length` is added for bodies of known length and `Connection:
/// close` is added unless the headers already carry a `Connection` value.
/// Nothing is produced if any header is invalid.
pub fn serialize_response(
    status: StatusCode,
    headers: &HashMap<String, String>,
    body: Option<Body>,
) -> Result<SerializedResponse, SerializeError> {
    let (chunks, stream) = match body {
        Some(Body::Full(chunks)) => (chunks, None),
        Some(Body::Stream(stream)) => (Vec::new(), Some(stream)),
        None => (Vec::new(), None),
    };
    let body_len = stream
        .is_none()
        .then(|| chunks.iter().map(Bytes::len).sum::<usize>());

    let head = serialize_head(status, headers, body_len)?;

    Ok(SerializedResponse {
        head: Some(head),
        chunks: chunks.into_iter(),
        stream,
    })
}

fn serialize_head(
    status: StatusCode,
    headers: &HashMap<String, String>,
    body_len: Option<usize>,
) -> Result<Bytes, SerializeError> {
    let mut buf = Vec::with_capacity(256);

    // Status line
    let status_line = format!(
        "{} {} {}\r\n",
        HTTP_VERSION,
        status.as_u16(),
        status.reason_phrase()
    );
    buf.extend_from_slice(status_line.as_bytes());

    // Headers
    for (k, v) in headers {
        validate_header(k, v)?;
        write_header(&mut buf, k, v);
    }

    if let Some(len) = body_len {
        if find_header(headers, "Content-Length").is_none() {
            write_header(&mut buf, "Content-Length", &len.to_string());
        }
    }
    if find_header(headers, "Connection").is_none() {
        write_header(&mut buf, "Connection", "close");
    }
    if find_header(headers, "Server").is_none() {
        write_header(&mut buf, "Server", SERVER_NAME);
    }

    // Header/body separator
    buf.extend_from_slice(b"\r\n");

    Ok(Bytes::from(buf))
}

fn write_header(buf: &mut Vec<u8>, key: &str, value: &str) {
    buf.extend_from_slice(key.as_bytes());
    buf.extend_from_slice(b": ");
    buf.extend_from_slice(value.as_bytes());
    buf.extend_from_slice(b"\r\n");
}

fn validate_header(key: &str, value: &str) -> Result<(), SerializeError> {
    let bad_name = key.is_empty()
        || key
            .bytes()
            .any(|b| b == b':' || b.is_ascii_whitespace() || b.is_ascii_control());
    let bad_value = value.bytes().any(|b| b == b'\r' || b == b'\n');

    if bad_name || bad_value {
        return Err(SerializeError::InvalidHeader(key.to_string()));
    }
    Ok(())
}
