//! Minimal HTTP/1.1 request reading.
//!
//! WHY: The fixture answers exactly one request per connection and never
//! needs chunked bodies, keep-alive or pipelining, so requests are read by
//! hand straight off the stream.
//!
//! WHAT: [`IncomingRequest`], [`RequestHeaders`] and [`read_request`], which
//! pulls the request line, headers and an optional sized body from any
//! [`BufRead`].
//!
//! HOW: Line oriented reads for the request line and headers, then a
//! bounded read of `content-length` bytes for the body.

use core::fmt;
use std::io::{BufRead, Read};

use crate::errors::{ConnectionError, ConnectionResult};

const CONTENT_LENGTH: &str = "content-length";
const HEADER_SEPARATOR: &str = ": ";

// Upper bound on the up-front body allocation, the declared length is not trusted.
const MAX_BODY_PREALLOC: usize = 64 * 1024;

/// Header mapping keyed by lower-cased name.
///
/// Keeps the order in which names were first received. A repeated name
/// overwrites the earlier value but keeps its original position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestHeaders {
    entries: Vec<(String, String)>,
}

impl RequestHeaders {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(key, _)| *key == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Header names in receipt order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(key, _)| key.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

impl fmt::Display for RequestHeaders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// One request as read off a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingRequest {
    /// HTTP method (GET, POST, etc.)
    pub method: String,
    /// Request path as sent, no normalisation
    pub path: String,
    /// Protocol version (e.g. "HTTP/1.1")
    pub proto: String,
    pub headers: RequestHeaders,
    /// Empty unless a `content-length` header was sent
    pub body: Vec<u8>,
}

/// Read a single request from `reader`.
///
/// Returns `Ok(None)` when the peer closed the connection before sending a
/// request line.
///
/// # Errors
///
/// - [`ConnectionError::MalformedRequestLine`] when the request line has
///   fewer than three space separated tokens.
/// - [`ConnectionError::ConnectionClosed`] when the stream ends before the
///   blank line terminating the headers.
/// - [`ConnectionError::Io`] for any underlying read failure.
pub fn read_request<R: BufRead>(reader: &mut R) -> ConnectionResult<Option<IncomingRequest>> {
    let Some(request_line) = read_text_line(reader)? else {
        return Ok(None);
    };

    let (method, path, proto) = parse_request_line(&request_line)?;
    let headers = read_headers(reader)?;

    let body = match headers.get(CONTENT_LENGTH) {
        Some(declared) => read_body(reader, parse_content_length(declared))?,
        None => Vec::new(),
    };

    Ok(Some(IncomingRequest {
        method,
        path,
        proto,
        headers,
        body,
    }))
}

// Bytes up to and including the next `\n`, decoded lossily so obs-text and
// Latin-1 bytes never fail the read. `None` at end of stream.
fn read_text_line<R: BufRead>(reader: &mut R) -> ConnectionResult<Option<String>> {
    let mut raw = Vec::new();
    if reader.read_until(b'\n', &mut raw)? == 0 {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(&raw).into_owned()))
}

fn parse_request_line(line: &str) -> ConnectionResult<(String, String, String)> {
    let line = line.trim_end_matches(['\r', '\n']);
    let mut tokens = line.split(' ');

    match (tokens.next(), tokens.next(), tokens.next()) {
        (Some(method), Some(path), Some(proto)) => {
            Ok((method.to_owned(), path.to_owned(), proto.to_owned()))
        }
        _ => Err(ConnectionError::MalformedRequestLine(line.to_owned())),
    }
}

fn read_headers<R: BufRead>(reader: &mut R) -> ConnectionResult<RequestHeaders> {
    let mut headers = RequestHeaders::new();

    loop {
        let Some(line) = read_text_line(reader)? else {
            return Err(ConnectionError::ConnectionClosed);
        };

        let line = line.trim_end();
        if line.is_empty() {
            break;
        }

        // lines without a separator are not headers, skip them
        if let Some((name, value)) = line.split_once(HEADER_SEPARATOR) {
            headers.insert(name.to_lowercase(), value);
        }
    }

    Ok(headers)
}

/// Lenient integer parse of a `content-length` value.
///
/// Leading whitespace is ignored and the leading run of ASCII digits is
/// taken; anything else, including negative or overflowing values, is zero.
#[must_use]
pub fn parse_content_length(value: &str) -> usize {
    let value = value.trim_start();
    let digits_end = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    value[..digits_end].parse().unwrap_or(0)
}

// Reads up to `length` bytes, a peer closing early yields what arrived.
fn read_body<R: BufRead>(reader: &mut R, length: usize) -> ConnectionResult<Vec<u8>> {
    let mut body = Vec::with_capacity(length.min(MAX_BODY_PREALLOC));
    let limit = u64::try_from(length).unwrap_or(u64::MAX);
    reader.by_ref().take(limit).read_to_end(&mut body)?;
    Ok(body)
}
