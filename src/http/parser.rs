use std::collections::HashMap;

use bytes::{Buf, Bytes, BytesMut};

use crate::http::request::{Method, ParsedRequest, find_header};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("malformed request line")]
    InvalidRequest,
    #[error("unknown request method")]
    InvalidMethod,
    #[error("malformed header line")]
    InvalidHeader,
    #[error("invalid Content-Length")]
    InvalidContentLength,
    #[error("request exceeds {limit} bytes")]
    TooLarge { limit: usize },
    #[error("request incomplete")]
    Incomplete,
}

/// Parses one complete request from the front of `buf`.
///
/// Returns the request and the number of bytes it occupied, or
/// [`ParseError::Incomplete`] when more input is needed.
pub fn parse_http_request(buf: &[u8]) -> Result<(ParsedRequest, usize), ParseError> {
    // Look for header/body separator
    let headers_end = find_headers_end(buf, 0).ok_or(ParseError::Incomplete)?;
    parse_with_headers_end(buf, headers_end)
}

/// Parses a request whose header block ends at `headers_end`.
fn parse_with_headers_end(
    buf: &[u8],
    headers_end: usize,
) -> Result<(ParsedRequest, usize), ParseError> {
    let header_bytes = &buf[..headers_end];
    let body_bytes = &buf[headers_end + 4..];

    let headers_str = std::str::from_utf8(header_bytes)
        .map_err(|_| ParseError::InvalidRequest)?;

    let mut lines = headers_str.split("\r\n");

    // Request line
    let request_line = lines.next().ok_or(ParseError::InvalidRequest)?;
    let mut parts = request_line.split_whitespace();

    let method_str = parts.next().ok_or(ParseError::InvalidRequest)?;
    let path = parts.next().ok_or(ParseError::InvalidRequest)?;
    let version = parts.next().ok_or(ParseError::InvalidRequest)?;

    if parts.next().is_some() || !version.starts_with("HTTP/1.") {
        return Err(ParseError::InvalidRequest);
    }

    let method = Method::from_str(method_str).ok_or(ParseError::InvalidMethod)?;

    // Headers
    let mut headers = HashMap::new();

    for line in lines {
        if line.is_empty() {
            continue;
        }

        let (key, value) = line
            .split_once(':')
            .ok_or(ParseError::InvalidHeader)?;

        let key = key.trim();
        if key.is_empty() || key.contains(char::is_whitespace) {
            return Err(ParseError::InvalidHeader);
        }

        let value = value.trim();
        if key.eq_ignore_ascii_case("Content-Length") {
            if let Some(previous) = find_header(&headers, key) {
                if previous != value {
                    return Err(ParseError::InvalidContentLength);
                }
            }
        }

        headers.insert(key.to_string(), value.to_string());
    }

    // Body
    let content_length = find_header(&headers, "Content-Length")
        .map(|v| v.parse::<usize>().map_err(|_| ParseError::InvalidContentLength))
        .transpose()?
        .unwrap_or(0);

    if body_bytes.len() < content_length {
        return Err(ParseError::Incomplete);
    }

    let body = Bytes::copy_from_slice(&body_bytes[..content_length]);

    let request = ParsedRequest {
        method,
        path: path.to_string(),
        version: version.to_string(),
        headers,
        body,
    };

    let total_consumed = headers_end + 4 + content_length;
    Ok((request, total_consumed))
}

fn find_headers_end(buf: &[u8], from: usize) -> Option<usize> {
    buf.get(from..)?
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|pos| from + pos)
}

/// Accumulates bytes until a whole request is available.
///
/// The outcome only depends on the concatenation of everything fed, never on
/// how the input was split into chunks.
#[derive(Debug)]
pub struct RequestParser {
    buffer: BytesMut,
    max_size: usize,
    /// Bytes already searched for the end of the header block.
    scanned: usize,
    headers_end: Option<usize>,
    parsed: Option<ParsedRequest>,
}

impl RequestParser {
    pub fn new(max_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            max_size,
            scanned: 0,
            headers_end: None,
            parsed: None,
        }
    }

    /// Appends `data` and tries to complete the request.
    ///
    /// Returns `Ok(true)` once the request is finished. Input arriving after
    /// that point is discarded. A request longer than the limit is rejected
    /// whether it arrives whole or in pieces.
    pub fn feed(&mut self, data: &[u8]) -> Result<bool, ParseError> {
        if self.parsed.is_some() {
            return Ok(true);
        }

        self.buffer.extend_from_slice(data);
        let too_large = ParseError::TooLarge { limit: self.max_size };

        let result = match self.locate_headers_end() {
            Some(end) if end + 4 > self.max_size => return Err(too_large),
            Some(end) => parse_with_headers_end(&self.buffer, end),
            None => Err(ParseError::Incomplete),
        };

        match result {
            Ok((_, consumed)) if consumed > self.max_size => Err(too_large),
            Ok((request, consumed)) => {
                self.buffer.advance(consumed);
                self.parsed = Some(request);
                Ok(true)
            }
            Err(ParseError::Incomplete) if self.buffer.len() > self.max_size => Err(too_large),
            Err(ParseError::Incomplete) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Resumes the separator search where the previous feed stopped.
    fn locate_headers_end(&mut self) -> Option<usize> {
        if self.headers_end.is_none() {
            // the separator may straddle the previous chunk boundary
            let from = self.scanned.saturating_sub(3);
            self.headers_end = find_headers_end(&self.buffer, from);
            self.scanned = self.buffer.len();
        }
        self.headers_end
    }

    pub fn is_finished(&self) -> bool {
        self.parsed.is_some()
    }

    pub fn request(&self) -> Option<&ParsedRequest> {
        self.parsed.as_ref()
    }

    /// Bytes received past the end of the finished request.
    pub fn trailing(&self) -> usize {
        if self.parsed.is_some() { self.buffer.len() } else { 0 }
    }
}
