//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events to stdout)
//!     → metrics.rs (counters, gauges)
//!     → push.rs (selected log events, shipped once per tick)
//!
//! Consumers:
//!     → Local log output
//!     → Metrics endpoint (Prometheus scrape)
//!     → Remote log collector (plain-text POST)
//! ```
//!
//! # Design Decisions
//! - Metrics are cheap (atomic increments, no-op without a recorder)
//! - Log shipping reuses the transfer pool instead of its own client

pub mod logging;
pub mod metrics;
pub mod push;

pub use push::{LogShipper, PushLayer};
