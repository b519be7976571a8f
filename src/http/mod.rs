//! Wire codec for the inbound request/response protocol.
//!
//! # Data Flow
//! ```text
//! receive buffer (raw bytes)
//!     → request.rs (one scan: path, query, Content-Length, header end)
//!     → percent.rs (query values decoded in place)
//!     → Request handed to the application
//!
//! application response
//!     → response.rs (status line + headers + Content-Length)
//!     → written by the connection, body or file bytes follow
//! ```
//!
//! # Design Decisions
//! - Stateless functions over byte slices; the connection owns the buffers
//! - Not HTTP compliant on purpose: no chunked bodies, no keep-alive,
//!   one request and one response per connection

pub mod percent;
pub mod request;
pub mod response;

pub use request::{parse_request, Method, ParseError, Parsed, Request};
pub use response::{render_head, write_head};
