//! Tick loop behaviour: callbacks, fault escalation, host control.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use tickloop::app::{AppError, AppResult, Application, Context};
use tickloop::http::Request;
use tickloop::lifecycle::{Control, Runtime};
use tickloop::net::ConnectionId;
use tickloop::transfer::{TransferId, TransferRequest};

mod common;

/// Counts ticks; optionally starts one transfer and fails on the first tick.
#[derive(Default)]
struct Probe {
    ticks: u32,
    fail_first_tick_with_transfer: Option<String>,
    stopped: Rc<Cell<bool>>,
    completions: u32,
}

impl Application for Probe {
    fn on_request(&mut self, ctx: &mut Context<'_>, connection: ConnectionId, request: Request) -> AppResult {
        if request.path == "panic" {
            panic!("handler bug");
        }
        if request.path == "exit" {
            ctx.request_exit();
        }
        ctx.send(connection, request.path.as_bytes(), "")?;
        Ok(())
    }

    fn on_transfer(&mut self, _ctx: &mut Context<'_>, _: TransferId, _: bool, _: Option<Vec<u8>>) -> AppResult {
        self.completions += 1;
        Ok(())
    }

    fn on_tick(&mut self, ctx: &mut Context<'_>) -> AppResult {
        self.ticks += 1;
        if let Some(url) = self.fail_first_tick_with_transfer.take() {
            ctx.start_transfer(TransferRequest::get(url))?;
            return Err(AppError::msg("first tick fails"));
        }
        Ok(())
    }

    fn on_stop(&mut self, _ctx: &mut Context<'_>) -> AppResult {
        self.stopped.set(true);
        Ok(())
    }
}

fn runtime(app: Probe) -> Runtime<Probe> {
    Runtime::new(&common::test_config(), app).unwrap()
}

#[test]
fn test_periodic_callback_runs_while_clean() {
    let mut runtime = runtime(Probe::default());
    for _ in 0..5 {
        assert_eq!(runtime.tick(), Control::Continue);
    }
    assert_eq!(runtime.app().ticks, 5);
    assert_eq!(runtime.faults(), 0);
}

#[test]
fn test_fault_escalates_only_after_transfers_drain() {
    let backend = common::start_slow_backend(Duration::from_millis(200), "late");
    let mut runtime = runtime(Probe {
        fail_first_tick_with_transfer: Some(format!("http://{}/slow", backend)),
        ..Probe::default()
    });

    // The first tick starts a transfer and then fails.
    assert_eq!(runtime.tick(), Control::Continue);
    assert_eq!(runtime.faults(), 1);
    assert_eq!(runtime.active_transfers(), 1);

    let control = common::eventually(Duration::from_secs(10), || match runtime.tick() {
        Control::Continue => {
            assert!(runtime.active_transfers() > 0 || runtime.app().completions == 1);
            None
        }
        other => Some(other),
    });

    assert_eq!(control, Control::Restart(Duration::from_millis(50)));
    assert_eq!(runtime.active_transfers(), 0);
    // on_tick is suspended once a fault is recorded; completions still arrive.
    assert_eq!(runtime.app().ticks, 1);
    assert_eq!(runtime.app().completions, 1);
}

#[test]
fn test_panicking_handler_is_a_fault() {
    let mut runtime = runtime(Probe::default());
    let _client = common::send_raw(runtime.local_addr(), b"GET /panic HTTP/1.1\r\n\r\n");

    let control = common::eventually(Duration::from_secs(5), || match runtime.tick() {
        Control::Continue => None,
        other => Some(other),
    });
    assert_eq!(control, Control::Restart(Duration::from_millis(50)));
    assert_eq!(runtime.faults(), 1);
}

#[test]
fn test_exit_request_is_reported() {
    let mut runtime = runtime(Probe::default());
    let mut client = common::send_raw(runtime.local_addr(), b"GET /exit HTTP/1.1\r\n\r\n");

    let control = common::eventually(Duration::from_secs(5), || match runtime.tick() {
        Control::Continue => None,
        other => Some(other),
    });
    assert_eq!(control, Control::Exit);

    runtime.tick();
    assert_eq!(common::read_all(&mut client), b"HTTP/1.1 200 OK\r\nContent-Length:4\r\n\r\nexit");
}

struct Controls;

impl Application for Controls {
    fn on_request(&mut self, ctx: &mut Context<'_>, connection: ConnectionId, _: Request) -> AppResult {
        ctx.close(connection)?;
        Ok(())
    }

    fn on_tick(&mut self, ctx: &mut Context<'_>) -> AppResult {
        ctx.set_tick_interval(Duration::from_millis(250));
        Ok(())
    }

    fn on_event(&mut self, ctx: &mut Context<'_>, kind: &str, data: &str) -> AppResult {
        match (kind, data) {
            ("restart", delay) => {
                let ms = delay.parse().map_err(|_| AppError::msg("bad delay"))?;
                ctx.request_restart(Duration::from_millis(ms));
                Ok(())
            }
            _ => Err(AppError::msg(format!("unknown event {kind}"))),
        }
    }
}

#[test]
fn test_tick_interval_and_host_events() {
    let mut runtime = Runtime::new(&common::test_config(), Controls).unwrap();
    assert_eq!(runtime.tick_interval(), Duration::from_millis(10));

    assert_eq!(runtime.tick(), Control::Continue);
    assert_eq!(runtime.tick_interval(), Duration::from_millis(250));

    assert_eq!(runtime.event("restart", "0"), Control::Restart(Duration::ZERO));
    assert_eq!(runtime.tick(), Control::Continue);

    assert_eq!(runtime.event("unknown", ""), Control::Continue);
    assert_eq!(runtime.faults(), 1);
}

#[test]
fn test_shutdown_calls_stop_and_releases_listener() {
    let stopped = Rc::new(Cell::new(false));
    let runtime = runtime(Probe {
        stopped: stopped.clone(),
        ..Probe::default()
    });
    let addr = runtime.local_addr();

    assert!(runtime.shutdown().is_none());
    assert!(stopped.get());
    assert!(std::net::TcpStream::connect(addr).is_err());
}

/// Relays `/fetch?url=` through a transfer and answers on completion.
#[derive(Default)]
struct Relay {
    waiting: Vec<(TransferId, ConnectionId)>,
}

impl Application for Relay {
    fn on_request(&mut self, ctx: &mut Context<'_>, connection: ConnectionId, request: Request) -> AppResult {
        let url = request
            .query_value("url")
            .ok_or_else(|| AppError::msg("missing url"))?;
        let transfer = ctx.start_transfer(TransferRequest::get(url))?;
        self.waiting.push((transfer, connection));
        Ok(())
    }

    fn on_transfer(
        &mut self,
        ctx: &mut Context<'_>,
        transfer: TransferId,
        ok: bool,
        body: Option<Vec<u8>>,
    ) -> AppResult {
        let index = self
            .waiting
            .iter()
            .position(|(t, _)| *t == transfer)
            .ok_or_else(|| AppError::msg("unexpected transfer"))?;
        let (_, connection) = self.waiting.remove(index);
        let body = if ok { body.unwrap_or_default() } else { b"failed".to_vec() };
        ctx.send(connection, &body, "")?;
        Ok(())
    }
}

#[test]
fn test_relay_answers_after_transfer_completes() {
    let backend = common::start_programmable_backend(|seen| (200, seen.target.clone().into_bytes()));
    let mut runtime = Runtime::new(&common::test_config(), Relay::default()).unwrap();

    let url = format!("http://{}/upstream", backend);
    let raw = format!("GET /fetch?url={} HTTP/1.1\r\n\r\n", url.replace(':', "%3A"));
    let mut client = common::send_raw(runtime.local_addr(), raw.as_bytes());

    common::eventually(Duration::from_secs(10), || {
        assert_eq!(runtime.tick(), Control::Continue);
        (runtime.open_connections() == 0 && runtime.active_transfers() == 0 && runtime.app().waiting.is_empty())
            .then_some(())
    });

    assert_eq!(
        common::read_all(&mut client),
        b"HTTP/1.1 200 OK\r\nContent-Length:9\r\n\r\n/upstream"
    );
}
