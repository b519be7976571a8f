//! Response head rendering.
//!
//! # Responsibilities
//! - Render `HTTP/1.1 200 OK`, caller-supplied header lines and the
//!   `Content-Length` framing
//!
//! # Design Decisions
//! - The status is always 200 at this layer; other codes are the
//!   application's business (or the connection is closed without a body)
//! - Extra headers are passed through verbatim, with a missing trailing
//!   CRLF supplied

const STATUS_LINE: &[u8] = b"HTTP/1.1 200 OK\r\n";

/// Append a response head for a body of `content_length` bytes to `out`.
pub fn write_head(out: &mut Vec<u8>, extra_headers: &str, content_length: u64) {
    out.extend_from_slice(STATUS_LINE);
    if !extra_headers.is_empty() {
        out.extend_from_slice(extra_headers.as_bytes());
        if !extra_headers.ends_with("\r\n") {
            out.extend_from_slice(b"\r\n");
        }
    }
    out.extend_from_slice(b"Content-Length:");
    out.extend_from_slice(content_length.to_string().as_bytes());
    out.extend_from_slice(b"\r\n\r\n");
}

/// Render a response head into a fresh buffer.
pub fn render_head(extra_headers: &str, content_length: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(STATUS_LINE.len() + extra_headers.len() + 32);
    write_head(&mut out, extra_headers, content_length);
    out
}
