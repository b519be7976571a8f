//! Single-threaded tick-driven network runtime.
//!
//! One thread owns everything: a non-blocking listener that accepts
//! minimal HTTP-like requests, a bounded pool of outbound HTTP transfers,
//! and an [`Application`](app::Application) that reacts to both. The host
//! calls [`Runtime::tick`](lifecycle::Runtime::tick) repeatedly and acts on
//! the [`Control`](lifecycle::Control) it returns.

// Core subsystems
pub mod app;
pub mod config;
pub mod http;
pub mod net;
pub mod transfer;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use app::{AppError, AppResult, Application, Context};
pub use config::RuntimeConfig;
pub use lifecycle::{Control, Runtime};
