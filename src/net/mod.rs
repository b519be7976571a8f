//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (non-blocking accept, drained once per tick)
//!     → connection.rs (buffers, state machine, receive/send steps)
//!     → multiplexer.rs (connection table, per-tick pass, reaping)
//!     → complete requests handed to the application
//!
//! Connection States:
//!     Receiving → Dispatched → Sending → Closed
//! ```
//!
//! # Design Decisions
//! - Plain std sockets in non-blocking mode, no reactor thread
//! - Every step is bounded so one slow peer cannot stall the tick
//! - One request and one response per connection

pub mod connection;
pub mod listener;
pub mod multiplexer;

pub use connection::{ConnectionId, ConnectionState};
pub use listener::{Listener, ListenerError};
pub use multiplexer::{ConnectionError, Inbound, Multiplexer};
