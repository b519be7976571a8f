//! Non-blocking TCP listener.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Accept every pending connection once per tick
//! - Put accepted sockets into non-blocking mode
//! - Graceful handling of accept errors

use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream};

use crate::config::ListenerConfig;

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// Failed to bind to address.
    Bind(std::io::Error),
    /// Failed to switch the socket to non-blocking mode.
    NonBlocking(std::io::Error),
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Bind(e) => write!(f, "Failed to bind: {}", e),
            ListenerError::NonBlocking(e) => write!(f, "Failed to set non-blocking: {}", e),
        }
    }
}

impl std::error::Error for ListenerError {}

/// The passive socket of the connection multiplexer.
#[derive(Debug)]
pub struct Listener {
    /// The underlying TCP listener, always non-blocking.
    inner: TcpListener,
    /// Resolved local address (port filled in when binding to port 0).
    local_addr: SocketAddr,
}

impl Listener {
    /// Bind to the configured address.
    pub fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
            ListenerError::Bind(std::io::Error::new(ErrorKind::InvalidInput, e))
        })?;

        let inner = TcpListener::bind(addr).map_err(ListenerError::Bind)?;
        inner
            .set_nonblocking(true)
            .map_err(ListenerError::NonBlocking)?;
        let local_addr = inner.local_addr().map_err(ListenerError::Bind)?;

        tracing::info!(address = %local_addr, "Listener bound");

        Ok(Self { inner, local_addr })
    }

    /// Accept until the listener would block.
    ///
    /// Sockets that cannot be made non-blocking are dropped (closed).
    pub fn accept_pending(&self) -> Vec<(TcpStream, SocketAddr)> {
        let mut accepted = Vec::new();

        loop {
            match self.inner.accept() {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nonblocking(true) {
                        tracing::warn!(peer_addr = %peer, error = %e, "Dropping connection: cannot set non-blocking");
                        continue;
                    }
                    tracing::debug!(peer_addr = %peer, "Connection accepted");
                    accepted.push((stream, peer));
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::ConnectionAborted => continue,
                Err(e) => {
                    // e.g. descriptor exhaustion; the backlog is retried next tick
                    tracing::warn!(error = %e, "Accept failed");
                    break;
                }
            }
        }

        accepted
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}
