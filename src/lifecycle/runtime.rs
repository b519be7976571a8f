//! The tick loop runtime.
//!
//! # Responsibilities
//! - Own the connection multiplexer, the transfer pool and the application
//! - Run one cooperative pass per [`Runtime::tick`]
//! - Turn application requests and fault escalation into [`Control`]
//! - Release everything in order on shutdown
//!
//! # Tick Order
//! ```text
//! connections.poll()       accept, receive, re-drive sends, reap
//!     → on_request         per complete request
//! transfers.poll()         bounded drive, at most one completion
//!     → on_transfer
//! log shipper              queued lines → one fire-and-forget push
//! faults == 0              → on_tick
//! faults > 0, no transfers → Restart
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::app::context::HostRequests;
use crate::app::{Application, Context};
use crate::config::RuntimeConfig;
use crate::lifecycle::faults::FaultCounter;
use crate::net::{ListenerError, Multiplexer};
use crate::observability::metrics;
use crate::observability::LogShipper;
use crate::transfer::{TransferError, TransferManager};

/// What the host should do after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    /// Shut this runtime down, wait, then build a fresh one.
    Restart(Duration),
    Exit,
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("listener: {0}")]
    Listener(#[from] ListenerError),

    #[error("transfers: {0}")]
    Transfers(#[from] TransferError),
}

pub struct Runtime<A: Application> {
    app: A,
    connections: Multiplexer,
    transfers: TransferManager,
    faults: FaultCounter,
    host: HostRequests,
    shipper: Option<LogShipper>,
    tick_interval: Duration,
    restart_delay: Duration,
}

impl<A: Application> Runtime<A> {
    /// Bind the listener and start the transfer engine.
    pub fn new(config: &RuntimeConfig, app: A) -> Result<Self, RuntimeError> {
        let connections = Multiplexer::bind(&config.listener, &config.connections)?;
        let transfers = TransferManager::new(&config.transfers)?;

        tracing::info!(
            address = %connections.local_addr(),
            max_transfers = config.transfers.max_active,
            tick_interval_ms = config.tick.interval_ms,
            "Runtime started"
        );

        Ok(Self {
            app,
            connections,
            transfers,
            faults: FaultCounter::new(),
            host: HostRequests::default(),
            shipper: None,
            tick_interval: Duration::from_millis(config.tick.interval_ms),
            restart_delay: Duration::from_millis(config.tick.restart_delay_ms),
        })
    }

    /// Ship captured log lines through this runtime's transfer pool.
    pub fn with_log_shipper(mut self, shipper: LogShipper) -> Self {
        self.shipper = Some(shipper);
        self
    }

    /// Run one pass. Never blocks for longer than the transfer wait bound
    /// plus the bounded socket retries.
    pub fn tick(&mut self) -> Control {
        let Self {
            app,
            connections,
            transfers,
            faults,
            host,
            shipper,
            ..
        } = self;

        for inbound in connections.poll() {
            metrics::record_request(inbound.request.method.as_str());
            let mut ctx = Context::new(connections, transfers, host);
            faults.protect("on_request", || {
                app.on_request(&mut ctx, inbound.connection, inbound.request)
            });
        }

        if let Some(done) = transfers.poll() {
            let mut ctx = Context::new(connections, transfers, host);
            faults.protect("on_transfer", || {
                app.on_transfer(&mut ctx, done.id, done.ok, done.body)
            });
        }

        if let Some(shipper) = shipper.as_mut() {
            shipper.ship(transfers);
        }

        let mut escalate = false;
        if faults.is_clean() {
            let mut ctx = Context::new(connections, transfers, host);
            faults.protect("on_tick", || app.on_tick(&mut ctx));
        } else if transfers.active() == 0 {
            tracing::warn!(faults = faults.count(), "Application faulted, requesting restart");
            escalate = true;
        }

        self.control(escalate)
    }

    /// Deliver a host event to the application.
    pub fn event(&mut self, kind: &str, data: &str) -> Control {
        let mut ctx = Context::new(&mut self.connections, &mut self.transfers, &mut self.host);
        let app = &mut self.app;
        self.faults
            .protect("on_event", || app.on_event(&mut ctx, kind, data));
        self.control(false)
    }

    fn control(&mut self, escalate: bool) -> Control {
        let requests = std::mem::take(&mut self.host);

        if let Some(interval) = requests.tick_interval {
            tracing::debug!(interval_ms = interval.as_millis() as u64, "Tick interval changed");
            self.tick_interval = interval;
        }

        if requests.exit {
            Control::Exit
        } else if let Some(delay) = requests.restart {
            Control::Restart(delay)
        } else if escalate {
            Control::Restart(self.restart_delay)
        } else {
            Control::Continue
        }
    }

    /// Sleep the host should take between ticks.
    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.connections.local_addr()
    }

    pub fn faults(&self) -> u64 {
        self.faults.count()
    }

    pub fn active_transfers(&self) -> usize {
        self.transfers.active()
    }

    pub fn open_connections(&self) -> usize {
        self.connections.len()
    }

    pub fn app(&self) -> &A {
        &self.app
    }

    pub fn app_mut(&mut self) -> &mut A {
        &mut self.app
    }

    /// Call `on_stop`, then release transfers, then connections.
    ///
    /// Returns the log shipper so a restarted runtime can keep using it.
    pub fn shutdown(self) -> Option<LogShipper> {
        let Self {
            mut app,
            mut connections,
            mut transfers,
            mut faults,
            mut host,
            shipper,
            ..
        } = self;

        {
            let mut ctx = Context::new(&mut connections, &mut transfers, &mut host);
            faults.protect("on_stop", || app.on_stop(&mut ctx));
        }

        drop(transfers);
        drop(connections);
        tracing::info!(faults = faults.count(), "Runtime stopped");

        shipper
    }
}
