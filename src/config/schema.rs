//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the runtime.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default listening port for inbound connections.
pub const DEFAULT_PORT: u16 = 9527;

/// Root configuration for the tick runtime.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Per-connection buffering and retry limits.
    pub connections: ConnectionConfig,

    /// Outbound transfer pool settings.
    pub transfers: TransferConfig,

    /// Tick cadence and escalation settings.
    pub tick: TickConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:9527").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: format!("0.0.0.0:{}", DEFAULT_PORT),
        }
    }
}

/// Connection buffering configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Receive buffer growth increment in bytes.
    pub receive_chunk: usize,

    /// Streaming buffer size for file-backed responses.
    pub file_chunk: usize,

    /// Consecutive would-block retries inside one receive or send step.
    pub spin_attempts: u32,

    /// Pause between spin retries in microseconds (0 yields the thread).
    pub spin_pause_us: u64,

    /// Ticks an incomplete request may wait for more bytes before closure.
    pub incomplete_passes: u32,

    /// Largest request (headers + body) accepted before closing.
    pub max_request_bytes: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            receive_chunk: 2048,
            file_chunk: 256 * 1024,
            spin_attempts: 10,
            spin_pause_us: 1,
            incomplete_passes: 4,
            max_request_bytes: 1024 * 1024,
        }
    }
}

impl ConnectionConfig {
    /// Pause between spin retries.
    pub fn spin_pause(&self) -> Duration {
        Duration::from_micros(self.spin_pause_us)
    }
}

/// Outbound transfer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Maximum concurrently active transfers.
    pub max_active: usize,

    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Total transfer timeout in seconds.
    pub total_timeout_secs: u64,

    /// Readiness wait per tick in milliseconds (clamped to 10).
    pub poll_wait_ms: u64,

    /// Scheduler passes per tick while driving in-flight transfers.
    pub drive_iterations: usize,

    /// Maximum redirects followed per transfer.
    pub max_redirects: usize,

    /// Skip peer certificate and host name validation.
    pub accept_invalid_certs: bool,

    /// User-Agent header sent with every transfer.
    pub user_agent: String,
}

/// Upper bound on the per-tick readiness wait.
pub const MAX_POLL_WAIT_MS: u64 = 10;

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_active: 256,
            connect_timeout_secs: 10,
            total_timeout_secs: 30,
            poll_wait_ms: 1,
            drive_iterations: 256,
            max_redirects: 10,
            accept_invalid_certs: false,
            user_agent: concat!("tickloop/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl TransferConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn total_timeout(&self) -> Duration {
        Duration::from_secs(self.total_timeout_secs)
    }

    /// Per-tick wait, never longer than [`MAX_POLL_WAIT_MS`].
    pub fn poll_wait(&self) -> Duration {
        Duration::from_millis(self.poll_wait_ms.min(MAX_POLL_WAIT_MS))
    }
}

/// Tick loop configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TickConfig {
    /// Sleep between ticks in the host loop, in milliseconds.
    pub interval_ms: u64,

    /// Delay the host waits before restarting after fault escalation.
    pub restart_delay_ms: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            interval_ms: 10,
            restart_delay_ms: 5000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,

    /// Endpoint that receives shipped log lines. Disabled when unset.
    pub push_url: Option<String>,

    /// Minimum level of shipped log lines.
    pub push_level: String,

    /// Lines buffered between ticks before new ones are dropped.
    pub push_queue: usize,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
            push_url: None,
            push_level: "warn".to_string(),
            push_queue: 256,
        }
    }
}
