//! Outbound transfer subsystem.
//!
//! # Data Flow
//! ```text
//! Application (via Context) or log shipper
//!     → manager.rs (cap check, URL validation, task registration)
//!     → engine.rs (spawned job on the transfer runtime)
//!
//! Every tick:
//!     → manager.rs drives engine.rs for a bounded wait
//!     → one completion drained: file finished or removed
//!     → Completed handed back to the tick loop
//! ```
//!
//! # Design Decisions
//! - One engine and one HTTP client for every transfer
//! - The engine advances only while a tick drives it
//! - Fire-and-forget pushes share the cap with ordinary transfers

pub mod engine;
pub mod manager;
pub mod task;

pub use engine::{EngineError, JobError};
pub use manager::{Completed, TransferError, TransferManager};
pub use task::{TransferId, TransferKind, TransferRequest};
