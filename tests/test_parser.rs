use ferry::http::parser::{ParseError, RequestParser, parse_http_request};
use ferry::http::request::Method;

const POST_REQUEST: &[u8] = concat!(
    "POST /api/items?x=1 HTTP/1.1\r\n",
    "Host: localhost\r\n",
    "Content-Type: text/plain\r\n",
    "Content-Length: 11\r\n",
    "\r\n",
    "hello world"
)
.as_bytes();

#[test]
fn test_parse_simple_get_request() {
    let req = b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n";
    let (parsed, consumed) = parse_http_request(req).unwrap();

    assert_eq!(parsed.method, Method::GET);
    assert_eq!(parsed.path, "/");
    assert_eq!(parsed.version, "HTTP/1.1");
    assert_eq!(parsed.headers.get("Host").unwrap(), "example.com");
    assert_eq!(consumed, req.len());
}

#[test]
fn test_parse_post_request_with_body() {
    let req = b"POST /api HTTP/1.1\r\nHost: localhost\r\nContent-Length: 5\r\n\r\nhello";
    let (parsed, consumed) = parse_http_request(req).unwrap();

    assert_eq!(parsed.method, Method::POST);
    assert_eq!(parsed.path, "/api");
    assert_eq!(&parsed.body[..], b"hello");
    assert_eq!(consumed, req.len());
}

#[test]
fn test_parse_lowercase_content_length() {
    let req = b"PUT /x HTTP/1.1\r\ncontent-length: 3\r\n\r\nabc";
    let (parsed, _) = parse_http_request(req).unwrap();

    assert_eq!(&parsed.body[..], b"abc");
    assert_eq!(parsed.content_length(), 3);
}

#[test]
fn test_parse_incomplete_request_missing_blank_line() {
    let req = b"GET / HTTP/1.1\r\nHost: example.com\r\n";
    let result = parse_http_request(req);

    assert!(matches!(result, Err(ParseError::Incomplete)));
}

#[test]
fn test_parse_incomplete_request_partial_body() {
    let req = b"POST /api HTTP/1.1\r\nContent-Length: 10\r\n\r\nhello";
    let result = parse_http_request(req);

    assert!(matches!(result, Err(ParseError::Incomplete)));
}

#[test]
fn test_parse_invalid_method() {
    let req = b"BREW /pot HTTP/1.1\r\n\r\n";
    assert!(matches!(parse_http_request(req), Err(ParseError::InvalidMethod)));
}

#[test]
fn test_parse_invalid_version() {
    let req = b"GET / SPDY/3\r\n\r\n";
    assert!(matches!(parse_http_request(req), Err(ParseError::InvalidRequest)));
}

#[test]
fn test_parse_header_without_colon() {
    let req = b"GET / HTTP/1.1\r\nBroken header\r\n\r\n";
    assert!(matches!(parse_http_request(req), Err(ParseError::InvalidHeader)));
}

#[test]
fn test_parse_invalid_content_length() {
    let req = b"POST / HTTP/1.1\r\nContent-Length: lots\r\n\r\n";
    assert!(matches!(
        parse_http_request(req),
        Err(ParseError::InvalidContentLength)
    ));
}

#[test]
fn test_parser_chunk_boundaries_do_not_matter() {
    let mut whole = RequestParser::new(4096);
    assert!(whole.feed(POST_REQUEST).unwrap());
    let expected = whole.request().unwrap().clone();

    for chunk_size in 1..POST_REQUEST.len() {
        let mut parser = RequestParser::new(4096);
        let chunks: Vec<&[u8]> = POST_REQUEST.chunks(chunk_size).collect();

        for (i, chunk) in chunks.iter().enumerate() {
            let finished = parser.feed(chunk).unwrap();
            assert_eq!(finished, i == chunks.len() - 1, "chunk size {chunk_size}, chunk {i}");
        }

        let parsed = parser.request().unwrap();
        assert_eq!(parsed.method, expected.method);
        assert_eq!(parsed.path, expected.path);
        assert_eq!(parsed.version, expected.version);
        assert_eq!(parsed.headers, expected.headers);
        assert_eq!(parsed.body, expected.body);
    }
}

#[test]
fn test_parser_reports_malformed_input_early() {
    let mut parser = RequestParser::new(4096);

    assert!(!parser.feed(b"GET / HTTP/1.1\r\n").unwrap());
    let err = parser.feed(b"no colon here\r\n\r\n").unwrap_err();
    assert_eq!(err, ParseError::InvalidHeader);
    assert!(!parser.is_finished());
}

#[test]
fn test_parser_limit_counts_body_bytes() {
    let mut parser = RequestParser::new(64);

    assert!(!parser.feed(b"POST / HTTP/1.1\r\nContent-Length: 1000\r\n\r\n").unwrap());
    let err = parser.feed(&[b'a'; 64]).unwrap_err();
    assert_eq!(err, ParseError::TooLarge { limit: 64 });
}

fn feed_in_chunks(limit: usize, input: &[u8], chunk_size: usize) -> Result<bool, ParseError> {
    let mut parser = RequestParser::new(limit);
    let mut finished = false;
    for chunk in input.chunks(chunk_size) {
        finished = parser.feed(chunk)?;
    }
    Ok(finished)
}

#[test]
fn test_parser_limit_applies_to_whole_requests() {
    let request = b"GET / HTTP/1.1\r\n\r\n";

    assert_eq!(
        RequestParser::new(16).feed(request),
        Err(ParseError::TooLarge { limit: 16 })
    );
    assert_eq!(RequestParser::new(request.len()).feed(request), Ok(true));
}

#[test]
fn test_parser_limit_ignores_chunk_boundaries() {
    let len = POST_REQUEST.len();
    let header_len = len - 11;

    for limit in [header_len - 1, header_len, len - 1, len] {
        let expected = feed_in_chunks(limit, POST_REQUEST, len);
        for chunk_size in 1..len {
            assert_eq!(
                feed_in_chunks(limit, POST_REQUEST, chunk_size),
                expected,
                "limit {limit}, chunk size {chunk_size}"
            );
        }
    }

    assert_eq!(feed_in_chunks(len, POST_REQUEST, len), Ok(true));
    assert_eq!(
        feed_in_chunks(len - 1, POST_REQUEST, len),
        Err(ParseError::TooLarge { limit: len - 1 })
    );
}

#[test]
fn test_parser_finds_separator_split_across_feeds() {
    let mut parser = RequestParser::new(4096);

    assert!(!parser.feed(b"GET /split HTTP/1.1\r\nHost: a\r").unwrap());
    assert!(!parser.feed(b"\n\r").unwrap());
    assert!(parser.feed(b"\n").unwrap());
    assert_eq!(parser.request().unwrap().path, "/split");
}

#[test]
fn test_parse_conflicting_content_lengths() {
    let req = b"POST / HTTP/1.1\r\nContent-Length: 2\r\ncontent-length: 3\r\n\r\nabc";
    assert_eq!(parse_http_request(req).unwrap_err(), ParseError::InvalidContentLength);

    let req = b"POST / HTTP/1.1\r\nContent-Length: 3\r\ncontent-length: 3\r\n\r\nabc";
    let (parsed, consumed) = parse_http_request(req).unwrap();
    assert_eq!(&parsed.body[..], b"abc");
    assert_eq!(consumed, req.len());
}
