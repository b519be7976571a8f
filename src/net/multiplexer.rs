//! Connection multiplexer.
//!
//! # Responsibilities
//! - Own the listener and the table of live connections
//! - One non-blocking pass per tick: accept, receive, re-drive sends, reap
//! - Route application responses to the right connection by handle
//!
//! # Design Decisions
//! - Connections live in a `BTreeMap` keyed by a monotonically increasing
//!   handle, so iteration order is accept order and handles never repeat
//! - Handles are checked on every call; a stale handle is an error, not a panic

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;

use thiserror::Error;

use crate::config::{ConnectionConfig, ListenerConfig};
use crate::http::Request;
use crate::net::connection::{Connection, ConnectionId, ConnectionLimits, ConnectionState};
use crate::net::listener::{Listener, ListenerError};
use crate::observability::metrics;

/// Errors returned to the application when it answers a connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("unknown connection {0}")]
    Unknown(ConnectionId),

    #[error("connection {id} is not awaiting a response (state {state:?})")]
    NotDispatched {
        id: ConnectionId,
        state: ConnectionState,
    },

    #[error("cannot open response file: {0}")]
    File(#[from] std::io::Error),
}

/// A complete request read during a poll.
#[derive(Debug)]
pub struct Inbound {
    pub connection: ConnectionId,
    pub peer: SocketAddr,
    pub request: Request,
}

pub struct Multiplexer {
    listener: Listener,
    connections: BTreeMap<ConnectionId, Connection>,
    next_id: u64,
    limits: ConnectionLimits,
}

impl Multiplexer {
    /// Bind the listener. Fails if the address cannot be bound.
    pub fn bind(listener: &ListenerConfig, connections: &ConnectionConfig) -> Result<Self, ListenerError> {
        Ok(Self {
            listener: Listener::bind(listener)?,
            connections: BTreeMap::new(),
            next_id: 1,
            limits: ConnectionLimits::from(connections),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    /// Run one pass over every connection and return the requests that
    /// became complete.
    pub fn poll(&mut self) -> Vec<Inbound> {
        for (stream, peer) in self.listener.accept_pending() {
            let id = ConnectionId::new(self.next_id);
            self.next_id += 1;
            self.connections.insert(id, Connection::new(id, stream, peer));
            metrics::record_connection_accepted();
        }

        let mut inbound = Vec::new();
        for connection in self.connections.values_mut() {
            match connection.state() {
                ConnectionState::Receiving => {
                    if let Some(request) = connection.receive(&self.limits) {
                        tracing::debug!(
                            connection_id = %connection.id(),
                            method = %request.method,
                            path = %request.path,
                            "Request received"
                        );
                        inbound.push(Inbound {
                            connection: connection.id(),
                            peer: connection.peer(),
                            request,
                        });
                    }
                }
                ConnectionState::Sending => connection.flush(&self.limits),
                ConnectionState::Dispatched | ConnectionState::Closed => {}
            }
        }

        self.reap();
        inbound
    }

    /// Send an in-memory response. The connection closes once it is written.
    pub fn send(&mut self, id: ConnectionId, body: &[u8], extra_headers: &str) -> Result<(), ConnectionError> {
        let limits = &self.limits;
        let connection = dispatched(&mut self.connections, id)?;
        connection.respond(body, extra_headers, limits);
        Ok(())
    }

    /// Stream a file as the response. The connection is closed whether or
    /// not the file could be opened.
    pub fn send_file(&mut self, id: ConnectionId, path: &Path, extra_headers: &str) -> Result<(), ConnectionError> {
        let limits = &self.limits;
        let connection = dispatched(&mut self.connections, id)?;
        connection.respond_file(path, extra_headers, limits)?;
        Ok(())
    }

    /// Close a connection without responding.
    pub fn close(&mut self, id: ConnectionId) -> Result<(), ConnectionError> {
        let connection = self
            .connections
            .get_mut(&id)
            .ok_or(ConnectionError::Unknown(id))?;
        connection.close();
        Ok(())
    }

    /// Current state of a connection, `None` once it has been reaped.
    pub fn state(&self, id: ConnectionId) -> Option<ConnectionState> {
        self.connections.get(&id).map(Connection::state)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    fn reap(&mut self) {
        let before = self.connections.len();
        self.connections
            .retain(|_, connection| connection.state() != ConnectionState::Closed);
        if self.connections.len() != before {
            tracing::trace!(reaped = before - self.connections.len(), "Closed connections released");
        }
        metrics::record_open_connections(self.connections.len());
    }
}

fn dispatched(
    connections: &mut BTreeMap<ConnectionId, Connection>,
    id: ConnectionId,
) -> Result<&mut Connection, ConnectionError> {
    let connection = connections.get_mut(&id).ok_or(ConnectionError::Unknown(id))?;
    match connection.state() {
        ConnectionState::Dispatched => Ok(connection),
        state => Err(ConnectionError::NotDispatched { id, state }),
    }
}
