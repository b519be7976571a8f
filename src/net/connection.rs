//! Connection state machine and buffers.
//!
//! # Responsibilities
//! - Own one accepted socket with its receive and send buffers
//! - Receive step: grow, read with bounded retries, parse
//! - Send steps: one vectored write for in-memory bodies, chunked streaming
//!   for file bodies, re-driven across ticks while the socket would block
//!
//! # States
//! ```text
//! Receiving → Dispatched → Sending → Closed
//!     │            │                   ▲
//!     └────────────┴───────────────────┘  (malformed, reset, EOF, close)
//! ```
//! Nothing leaves `Closed`; closed connections are reaped by the multiplexer.

use std::fs::File;
use std::io::{ErrorKind, IoSlice, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::path::Path;

use crate::config::ConnectionConfig;
use crate::http::{self, Parsed, Request};
use crate::resilience::{Pause, SpinRetry};

/// Handle for one accepted connection, unique within a multiplexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Connection state for lifecycle tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accumulating request bytes.
    Receiving,
    /// Request handed to the application, waiting for its response.
    Dispatched,
    /// Response partly written; flushed again on every tick.
    Sending,
    /// Done. Buffers are released and the socket closes when reaped.
    Closed,
}

/// Per-connection limits derived from [`ConnectionConfig`].
#[derive(Debug, Clone)]
pub(crate) struct ConnectionLimits {
    pub receive_chunk: usize,
    pub file_chunk: usize,
    pub spin_attempts: u32,
    pub pause: Pause,
    pub incomplete_passes: u32,
    pub max_request_bytes: usize,
}

impl From<&ConnectionConfig> for ConnectionLimits {
    fn from(config: &ConnectionConfig) -> Self {
        Self {
            receive_chunk: config.receive_chunk,
            file_chunk: config.file_chunk,
            spin_attempts: config.spin_attempts,
            pause: Pause::from_duration(config.spin_pause()),
            incomplete_passes: config.incomplete_passes,
            max_request_bytes: config.max_request_bytes,
        }
    }
}

impl ConnectionLimits {
    fn retry(&self) -> SpinRetry {
        SpinRetry::new(self.spin_attempts, self.pause)
    }
}

/// Remaining bytes of a file-backed response.
#[derive(Debug)]
struct FileBody {
    file: File,
    remaining: u64,
}

/// Result of pumping the send buffer.
enum Flush {
    Done,
    Pending,
    Failed(std::io::Error),
}

#[derive(Debug)]
pub(crate) struct Connection {
    id: ConnectionId,
    peer: SocketAddr,
    stream: TcpStream,
    state: ConnectionState,

    recv_buf: Vec<u8>,
    recv_len: usize,
    idle_passes: u32,

    /// Allocated only when a response could not be written synchronously.
    send_buf: Option<Vec<u8>>,
    send_pos: usize,
    /// Present only while a file-backed response is streaming.
    file: Option<FileBody>,
}

impl Connection {
    pub fn new(id: ConnectionId, stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            id,
            peer,
            stream,
            state: ConnectionState::Receiving,
            recv_buf: Vec::new(),
            recv_len: 0,
            idle_passes: 0,
            send_buf: None,
            send_pos: 0,
            file: None,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Mark closed and release buffers and any open file.
    pub fn close(&mut self) {
        self.state = ConnectionState::Closed;
        self.recv_buf = Vec::new();
        self.send_buf = None;
        self.file = None;
    }

    /// Read what is available and try to parse a request.
    ///
    /// Returns the request once complete; the connection is then
    /// `Dispatched`. Malformed input, hard errors, an early EOF or too many
    /// idle passes close the connection.
    pub fn receive(&mut self, limits: &ConnectionLimits) -> Option<Request> {
        let mut retry = limits.retry();
        let before = self.recv_len;
        let mut eof = false;

        loop {
            if self.recv_len == self.recv_buf.len() {
                // At the cap: judge what is buffered before refusing more.
                if self.recv_len >= limits.max_request_bytes {
                    break;
                }
                let grown = self.recv_buf.len() + limits.receive_chunk;
                self.recv_buf.resize(grown.min(limits.max_request_bytes), 0);
            }

            match self.stream.read(&mut self.recv_buf[self.recv_len..]) {
                Ok(0) => {
                    eof = true;
                    break;
                }
                Ok(n) => {
                    self.recv_len += n;
                    retry.reset();
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    if !retry.stall() {
                        break;
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    tracing::debug!(connection_id = %self.id, error = %e, "Receive failed");
                    self.close();
                    return None;
                }
            }
        }

        if self.recv_len == before {
            self.idle_passes += 1;
        } else {
            self.idle_passes = 0;
        }

        match http::parse_request(&mut self.recv_buf[..self.recv_len], limits.max_request_bytes) {
            Ok(Parsed::Complete(request)) => {
                self.state = ConnectionState::Dispatched;
                Some(request)
            }
            Ok(Parsed::Incomplete) if self.recv_len >= limits.max_request_bytes => {
                tracing::warn!(connection_id = %self.id, bytes = self.recv_len, "Request too large, closing");
                self.close();
                None
            }
            Ok(Parsed::Incomplete) => {
                if eof || self.idle_passes >= limits.incomplete_passes {
                    tracing::debug!(
                        connection_id = %self.id,
                        bytes = self.recv_len,
                        eof,
                        "Incomplete request, closing"
                    );
                    self.close();
                }
                None
            }
            Err(e) => {
                tracing::debug!(connection_id = %self.id, error = %e, "Malformed request, closing");
                self.close();
                None
            }
        }
    }

    /// Send an in-memory response.
    ///
    /// One vectored write is attempted; whatever is left is copied into a
    /// send buffer and flushed now and on later ticks.
    pub fn respond(&mut self, body: &[u8], extra_headers: &str, limits: &ConnectionLimits) {
        let head = http::render_head(extra_headers, body.len() as u64);
        let total = head.len() + body.len();

        let written = loop {
            match self
                .stream
                .write_vectored(&[IoSlice::new(&head), IoSlice::new(body)])
            {
                Ok(n) => break n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break 0,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    tracing::debug!(connection_id = %self.id, error = %e, "Send failed");
                    self.close();
                    return;
                }
            }
        };

        if written >= total {
            tracing::trace!(connection_id = %self.id, bytes = total, "Response sent");
            self.close();
            return;
        }

        let mut pending = Vec::with_capacity(total - written);
        if written < head.len() {
            pending.extend_from_slice(&head[written..]);
            pending.extend_from_slice(body);
        } else {
            pending.extend_from_slice(&body[written - head.len()..]);
        }
        self.send_buf = Some(pending);
        self.send_pos = 0;
        self.state = ConnectionState::Sending;

        self.flush(limits);
    }

    /// Stream a file as the response body.
    ///
    /// The connection is closed if the file cannot be opened; the error is
    /// returned so the caller can log it.
    pub fn respond_file(
        &mut self,
        path: &Path,
        extra_headers: &str,
        limits: &ConnectionLimits,
    ) -> std::io::Result<()> {
        let opened = File::open(path).and_then(|file| {
            let length = file.metadata()?.len();
            Ok((file, length))
        });
        let (file, length) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                self.close();
                return Err(e);
            }
        };

        let mut buf = Vec::with_capacity(limits.file_chunk);
        http::write_head(&mut buf, extra_headers, length);

        self.send_buf = Some(buf);
        self.send_pos = 0;
        self.file = Some(FileBody {
            file,
            remaining: length,
        });
        self.state = ConnectionState::Sending;

        self.flush(limits);
        Ok(())
    }

    /// Write pending bytes until done, failed, or the retry budget is spent.
    pub fn flush(&mut self, limits: &ConnectionLimits) {
        let mut retry = limits.retry();
        let outcome = match self.send_buf.as_mut() {
            Some(buf) => pump(
                &mut self.stream,
                buf,
                &mut self.send_pos,
                &mut self.file,
                limits.file_chunk,
                &mut retry,
            ),
            None => Flush::Done,
        };

        match outcome {
            Flush::Done => {
                tracing::trace!(connection_id = %self.id, "Response sent");
                self.close();
            }
            Flush::Pending => {
                tracing::trace!(connection_id = %self.id, stalls = retry.stalls(), "Send deferred to next tick");
            }
            Flush::Failed(e) => {
                tracing::debug!(connection_id = %self.id, error = %e, "Send failed");
                self.close();
            }
        }
    }
}

/// Move bytes from `buf` (refilled from `file` when drained) to `stream`.
fn pump(
    stream: &mut TcpStream,
    buf: &mut Vec<u8>,
    pos: &mut usize,
    file: &mut Option<FileBody>,
    chunk: usize,
    retry: &mut SpinRetry,
) -> Flush {
    loop {
        if *pos == buf.len() {
            let Some(body) = file.as_mut().filter(|body| body.remaining > 0) else {
                return Flush::Done;
            };
            let want = body.remaining.min(chunk as u64) as usize;
            buf.clear();
            buf.resize(want, 0);
            *pos = 0;
            match body.file.read(&mut buf[..]) {
                Ok(0) => {
                    return Flush::Failed(std::io::Error::new(
                        ErrorKind::UnexpectedEof,
                        "file shorter than its advertised length",
                    ))
                }
                Ok(n) => {
                    buf.truncate(n);
                    body.remaining -= n as u64;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {
                    buf.clear();
                    continue;
                }
                Err(e) => return Flush::Failed(e),
            }
        }

        match stream.write(&buf[*pos..]) {
            Ok(0) => return Flush::Failed(ErrorKind::WriteZero.into()),
            Ok(n) => {
                *pos += n;
                retry.reset();
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                if !retry.stall() {
                    return Flush::Pending;
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Flush::Failed(e),
        }
    }
}
