//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Non-blocking socket step (receive, send, file stream):
//!     → attempt I/O
//!     → would block: retry.rs (bounded pause, try again)
//!     → budget spent: leave the rest for the next tick
//! ```
//!
//! # Design Decisions
//! - Retries never block for longer than a few microseconds per stall
//! - Outbound transfers rely on their own connect/total timeouts instead

pub mod retry;

pub use retry::{Pause, SpinRetry};
