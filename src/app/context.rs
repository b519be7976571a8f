//! Capabilities handed to application callbacks.

use std::path::Path;
use std::time::Duration;

use crate::net::{ConnectionError, ConnectionId, Multiplexer};
use crate::transfer::{TransferError, TransferId, TransferManager, TransferRequest};

/// Requests the application made of the host during a tick.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct HostRequests {
    pub exit: bool,
    pub restart: Option<Duration>,
    pub tick_interval: Option<Duration>,
}

/// Access to connections, transfers and the host from inside a callback.
pub struct Context<'a> {
    connections: &'a mut Multiplexer,
    transfers: &'a mut TransferManager,
    host: &'a mut HostRequests,
}

impl<'a> Context<'a> {
    pub(crate) fn new(
        connections: &'a mut Multiplexer,
        transfers: &'a mut TransferManager,
        host: &'a mut HostRequests,
    ) -> Self {
        Self {
            connections,
            transfers,
            host,
        }
    }

    /// Answer a request with an in-memory body. `extra_headers` is placed
    /// verbatim before `Content-Length`.
    pub fn send(&mut self, connection: ConnectionId, body: &[u8], extra_headers: &str) -> Result<(), ConnectionError> {
        self.connections.send(connection, body, extra_headers)
    }

    /// Answer a request with the contents of a file.
    pub fn send_file(
        &mut self,
        connection: ConnectionId,
        path: impl AsRef<Path>,
        extra_headers: &str,
    ) -> Result<(), ConnectionError> {
        self.connections.send_file(connection, path.as_ref(), extra_headers)
    }

    /// Drop a connection without answering.
    pub fn close(&mut self, connection: ConnectionId) -> Result<(), ConnectionError> {
        self.connections.close(connection)
    }

    pub fn start_transfer(&mut self, request: TransferRequest) -> Result<TransferId, TransferError> {
        self.transfers.start(request)
    }

    pub fn cancel_transfer(&mut self, transfer: TransferId) -> bool {
        self.transfers.cancel(transfer)
    }

    /// Fire-and-forget POST.
    pub fn push(&mut self, url: &str, payload: impl Into<Vec<u8>>) -> bool {
        self.transfers.push(url, payload)
    }

    pub fn active_transfers(&self) -> usize {
        self.transfers.active()
    }

    /// Ask the host to stop after this tick.
    pub fn request_exit(&mut self) {
        self.host.exit = true;
    }

    /// Ask the host to rebuild the runtime after `delay`.
    pub fn request_restart(&mut self, delay: Duration) {
        self.host.restart = Some(delay);
    }

    /// Change the host's sleep between ticks.
    pub fn set_tick_interval(&mut self, interval: Duration) {
        self.host.tick_interval = Some(interval);
    }
}
