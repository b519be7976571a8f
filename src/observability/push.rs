//! Log shipping through fire-and-forget transfers.
//!
//! # Responsibilities
//! - Capture log events at or above a level as single text lines
//! - Queue them without blocking the code that logs
//! - Ship the queue once per tick as one POST to a configured URL
//!
//! # Design Decisions
//! - The queue is bounded; lines are dropped (and counted) when it is full
//! - Events from the transfer subsystem are never captured, so a failing
//!   push cannot feed itself
//! - A push that cannot start is not retried

use std::fmt::Write as _;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::observability::metrics;
use crate::transfer::TransferManager;

/// Targets under this prefix are never shipped.
const SKIPPED_TARGET: &str = "tickloop::transfer";

/// Create the capturing layer and the shipper that drains it.
pub fn channel(url: impl Into<String>, level: Level, capacity: usize) -> (PushLayer, LogShipper) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        PushLayer { tx, level },
        LogShipper {
            url: url.into(),
            rx,
        },
    )
}

/// `tracing` layer that queues formatted lines.
pub struct PushLayer {
    tx: mpsc::Sender<String>,
    level: Level,
}

impl<S: Subscriber> Layer<S> for PushLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if *meta.level() > self.level || meta.target().starts_with(SKIPPED_TARGET) {
            return;
        }

        let mut fields = LineVisitor::default();
        event.record(&mut fields);

        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let line = format!(
            "{} {} {} {}{}\n",
            meta.level(),
            secs,
            meta.target(),
            fields.message,
            fields.rest
        );

        if self.tx.try_send(line).is_err() {
            metrics::record_log_lines_dropped(1);
        }
    }
}

#[derive(Default)]
struct LineVisitor {
    message: String,
    rest: String,
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.rest, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            let _ = write!(self.rest, " {}={:?}", field.name(), value);
        }
    }
}

/// Drains captured lines into the transfer pool.
pub struct LogShipper {
    url: String,
    rx: mpsc::Receiver<String>,
}

impl LogShipper {
    /// Send every queued line as one payload. Returns the number of lines
    /// handed to the transfer pool.
    pub fn ship(&mut self, transfers: &mut TransferManager) -> usize {
        let mut payload = String::new();
        let mut lines = 0;
        while let Ok(line) = self.rx.try_recv() {
            payload.push_str(&line);
            lines += 1;
        }
        if lines == 0 {
            return 0;
        }

        if transfers.push(&self.url, payload) {
            lines
        } else {
            metrics::record_log_lines_dropped(lines as u64);
            0
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}
