//! Application interface.
//!
//! # Data Flow
//! ```text
//! Tick loop
//!     → on_request  (one per complete inbound request)
//!     → on_transfer (at most one finished transfer per tick)
//!     → on_tick     (only while no callback has failed)
//!     → on_stop     (once, at shutdown)
//!
//! Callbacks act through Context:
//!     → send / send_file / close a connection
//!     → start / cancel a transfer, push a payload
//!     → ask the host to exit, restart or change the tick interval
//! ```
//!
//! # Design Decisions
//! - Callbacks run on the tick thread and must not block
//! - A callback error or panic is recorded as a fault; faults stop
//!   `on_tick` and eventually lead to a restart

pub mod context;

pub use context::Context;

use thiserror::Error;

use crate::http::Request;
use crate::net::{ConnectionError, ConnectionId};
use crate::transfer::{TransferError, TransferId};

/// Failure reported by an application callback.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("callback panicked: {0}")]
    Panic(String),
}

impl AppError {
    pub fn msg(message: impl Into<String>) -> Self {
        AppError::Message(message.into())
    }
}

pub type AppResult = Result<(), AppError>;

/// The logic driven by the tick loop.
pub trait Application {
    /// A complete request arrived. Answer it now or later through the
    /// context using `connection`; an unanswered connection stays open.
    fn on_request(&mut self, ctx: &mut Context<'_>, connection: ConnectionId, request: Request) -> AppResult;

    /// A transfer started with notification finished. `body` is present
    /// only for successful in-memory transfers.
    fn on_transfer(
        &mut self,
        _ctx: &mut Context<'_>,
        _transfer: TransferId,
        _ok: bool,
        _body: Option<Vec<u8>>,
    ) -> AppResult {
        Ok(())
    }

    /// Called once per tick while no fault has been recorded.
    fn on_tick(&mut self, _ctx: &mut Context<'_>) -> AppResult {
        Ok(())
    }

    /// An event delivered by the host (platform notifications and such).
    fn on_event(&mut self, _ctx: &mut Context<'_>, _kind: &str, _data: &str) -> AppResult {
        Ok(())
    }

    /// Called once before the runtime releases its resources.
    fn on_stop(&mut self, _ctx: &mut Context<'_>) -> AppResult {
        Ok(())
    }
}
