//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (runtime.rs):
//!     Validated config → bind listener → start transfer engine
//!
//! Every tick (runtime.rs):
//!     Connections → requests → transfers → completion → periodic callback
//!     Callbacks run through faults.rs (counted, panics contained)
//!
//! Shutdown (runtime.rs):
//!     on_stop → release transfers → release connections
//! ```
//!
//! # Design Decisions
//! - The host owns the loop; the runtime only reports what to do next
//! - Fault escalation waits for in-flight transfers to drain

pub mod faults;
pub mod runtime;

pub use faults::FaultCounter;
pub use runtime::{Control, Runtime, RuntimeError};
