//! Request scanning and parsing.
//!
//! # Responsibilities
//! - Locate the path, query string, `Content-Length` value and the end of
//!   the header section in one pass over the receive buffer
//! - Decode query values in place once the request is complete
//! - Tell "still arriving" apart from "cannot be a request"
//!
//! # Design Decisions
//! - The method is inferred from the first byte only (`G` is GET, anything
//!   else is POST)
//! - Only `Content-Length` is interpreted; other headers are skipped
//! - Query values are decoded only after the header terminator has been
//!   seen, so a buffer is never decoded twice

use std::borrow::Cow;
use std::ops::Range;

use thiserror::Error;

use crate::http::percent;

/// Largest number of query pairs accepted in one request.
pub const MAX_QUERY_PAIRS: usize = 32;

const CONTENT_LENGTH: &[u8] = b"Content-Length";

/// Request method as inferred from the request line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    fn from_first_byte(byte: u8) -> Self {
        if byte == b'G' {
            Method::Get
        } else {
            Method::Post
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully received and decoded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    /// Path without its leading `/` and without the query string.
    pub path: String,
    /// Decoded query pairs in arrival order, `None` when there was no `?`.
    pub query: Option<Vec<(String, String)>>,
    /// Body bytes, present only when a `Content-Length` header was sent.
    pub body: Option<Vec<u8>>,
}

impl Request {
    /// First value for `key` in the query string.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .as_ref()?
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Reasons a buffer can never become a valid request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("malformed request line")]
    RequestLine,

    #[error("malformed query string")]
    MalformedQuery,

    #[error("more than {} query pairs", MAX_QUERY_PAIRS)]
    TooManyPairs,

    #[error("invalid Content-Length value")]
    InvalidContentLength,

    #[error("request larger than {limit} bytes")]
    TooLarge { limit: usize },
}

/// Outcome of a parse attempt over the bytes received so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed {
    Complete(Request),
    /// More bytes are needed before the request can be judged.
    Incomplete,
}

/// Byte offsets found by [`scan`].
#[derive(Debug, Clone, PartialEq, Eq)]
struct Layout {
    path: Range<usize>,
    query: Option<Range<usize>>,
    content_length: Option<usize>,
    body_start: usize,
}

#[derive(Debug, Clone, Copy)]
enum Scan {
    /// Before the `/` that starts the path.
    Method,
    Path,
    Query,
    /// Rest of the request line after the target.
    Version,
    Headers,
}

/// Find request-line and header offsets. `Ok(None)` means incomplete.
///
/// A declared body that would end past `limit` is rejected before any of
/// it arrives.
fn scan(buf: &[u8], limit: usize) -> Result<Option<Layout>, ParseError> {
    let mut state = Scan::Method;
    let mut path = 0..0;
    let mut query: Option<Range<usize>> = None;
    let mut content_length = None;
    let mut line_start = 0;

    for (i, &byte) in buf.iter().enumerate() {
        match state {
            Scan::Method => match byte {
                b'/' => {
                    path.start = i + 1;
                    state = Scan::Path;
                }
                b'\r' | b'\n' => return Err(ParseError::RequestLine),
                _ => {}
            },
            Scan::Path => match byte {
                b'?' => {
                    path.end = i;
                    query = Some(i + 1..i + 1);
                    state = Scan::Query;
                }
                b' ' => {
                    path.end = i;
                    state = Scan::Version;
                }
                b'\r' | b'\n' => return Err(ParseError::RequestLine),
                _ => {}
            },
            Scan::Query => match byte {
                b' ' => {
                    if let Some(range) = query.as_mut() {
                        range.end = i;
                    }
                    state = Scan::Version;
                }
                b'\r' | b'\n' => return Err(ParseError::RequestLine),
                _ => {}
            },
            Scan::Version => {
                if byte == b'\n' {
                    line_start = i + 1;
                    state = Scan::Headers;
                }
            }
            Scan::Headers => {
                if byte != b'\n' {
                    continue;
                }
                let line = trim_cr(&buf[line_start..i]);
                if line.is_empty() {
                    let body_start = i + 1;
                    if let Some(len) = content_length {
                        let end = body_start
                            .checked_add(len)
                            .ok_or(ParseError::InvalidContentLength)?;
                        if end > limit {
                            return Err(ParseError::TooLarge { limit });
                        }
                        if buf.len() < end {
                            return Ok(None);
                        }
                    }
                    return Ok(Some(Layout {
                        path,
                        query,
                        content_length,
                        body_start,
                    }));
                }
                if let Some(value) = header_value(line, CONTENT_LENGTH) {
                    content_length = Some(parse_length(value)?);
                }
                line_start = i + 1;
            }
        }
    }

    Ok(None)
}

fn trim_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Value of `line` when its name matches `name` exactly up to the colon.
fn header_value<'a>(line: &'a [u8], name: &[u8]) -> Option<&'a [u8]> {
    let rest = line.strip_prefix(name)?.strip_prefix(b":")?;
    Some(rest.trim_ascii())
}

fn parse_length(value: &[u8]) -> Result<usize, ParseError> {
    std::str::from_utf8(value)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or(ParseError::InvalidContentLength)
}

/// Split `k=v&k=v` and decode each value in place.
fn decode_pairs(query: &mut [u8]) -> Result<Vec<(String, String)>, ParseError> {
    let mut pairs = Vec::new();
    let mut start = 0;

    loop {
        let end = query[start..]
            .iter()
            .position(|&b| b == b'&')
            .map_or(query.len(), |offset| start + offset);

        let segment = &mut query[start..end];
        let eq = segment
            .iter()
            .position(|&b| b == b'=')
            .ok_or(ParseError::MalformedQuery)?;
        if segment[eq + 1..].contains(&b'=') {
            return Err(ParseError::MalformedQuery);
        }
        if pairs.len() == MAX_QUERY_PAIRS {
            return Err(ParseError::TooManyPairs);
        }

        let (key, value) = segment.split_at_mut(eq);
        let value = &mut value[1..];
        let decoded = percent::decode_in_place(value);
        pairs.push((lossy(key), lossy(&value[..decoded])));

        if end == query.len() {
            return Ok(pairs);
        }
        start = end + 1;
    }
}

fn lossy(bytes: &[u8]) -> String {
    match String::from_utf8_lossy(bytes) {
        Cow::Borrowed(s) => s.to_owned(),
        Cow::Owned(s) => s,
    }
}

/// Parse the bytes received so far.
///
/// `limit` bounds the whole request, headers and body included. The query
/// string is decoded in place inside `buf` when the request is complete;
/// an incomplete buffer is left untouched.
pub fn parse_request(buf: &mut [u8], limit: usize) -> Result<Parsed, ParseError> {
    let layout = match scan(buf, limit)? {
        Some(layout) => layout,
        None => return Ok(Parsed::Incomplete),
    };

    let method = Method::from_first_byte(buf[0]);
    let path = lossy(&buf[layout.path.clone()]);
    let body = layout
        .content_length
        .map(|len| buf[layout.body_start..layout.body_start + len].to_vec());
    let query = match layout.query {
        Some(range) => Some(decode_pairs(&mut buf[range])?),
        None => None,
    };

    Ok(Parsed::Complete(Request {
        method,
        path,
        query,
        body,
    }))
}
