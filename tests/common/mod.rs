//! Shared utilities for integration tests.
//!
//! Backends are plain threads on loopback sockets bound to port 0, so
//! tests never collide on ports and need no async runtime of their own.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use tickloop::config::RuntimeConfig;

/// A request as seen by a mock backend.
#[derive(Debug, Clone)]
pub struct Seen {
    pub method: String,
    pub target: String,
    pub body: Vec<u8>,
}

/// Start a backend that answers every request with `f(request)`.
pub fn start_programmable_backend<F>(f: F) -> SocketAddr
where
    F: Fn(&Seen) -> (u16, Vec<u8>) + Send + Sync + 'static,
{
    let (addr, _) = start_recording_backend(f);
    addr
}

/// Like [`start_programmable_backend`], also reporting every request.
pub fn start_recording_backend<F>(f: F) -> (SocketAddr, mpsc::Receiver<Seen>)
where
    F: Fn(&Seen) -> (u16, Vec<u8>) + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::channel();
    let f = std::sync::Arc::new(f);

    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut socket) = stream else { break };
            let f = f.clone();
            let tx = tx.clone();
            thread::spawn(move || {
                let Some(seen) = read_request(&mut socket) else { return };
                let (status, body) = f(&seen);
                let _ = tx.send(seen);
                let head = format!(
                    "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    status,
                    reason(status),
                    body.len()
                );
                let _ = socket.write_all(head.as_bytes());
                let _ = socket.write_all(&body);
                let _ = socket.shutdown(Shutdown::Write);
                thread::sleep(Duration::from_millis(10));
            });
        }
    });

    (addr, rx)
}

/// Start a backend that answers 200 after `delay`.
pub fn start_slow_backend(delay: Duration, body: &'static str) -> SocketAddr {
    start_programmable_backend(move |_| {
        thread::sleep(delay);
        (200, body.as_bytes().to_vec())
    })
}

/// Start a backend that holds every reply until `parties` requests have
/// arrived, then answers them all at once with 200 and `body`.
pub fn start_gated_backend(parties: usize, body: &'static str) -> SocketAddr {
    let gate = std::sync::Arc::new(std::sync::Barrier::new(parties));
    start_programmable_backend(move |_| {
        gate.wait();
        (200, body.as_bytes().to_vec())
    })
}

/// Start a backend that reads the request and never answers.
pub fn start_holding_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut socket) = stream else { break };
            thread::spawn(move || {
                let mut buf = [0u8; 1024];
                while matches!(socket.read(&mut buf), Ok(n) if n > 0) {}
            });
        }
    });

    addr
}

/// Start a backend that promises `promised` body bytes, sends `sent`, then
/// hangs up.
pub fn start_truncating_backend(promised: usize, sent: usize) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut socket) = stream else { break };
            thread::spawn(move || {
                if read_request(&mut socket).is_none() {
                    return;
                }
                let head = format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n", promised);
                let _ = socket.write_all(head.as_bytes());
                let _ = socket.write_all(&vec![b'x'; sent]);
                let _ = socket.shutdown(Shutdown::Both);
            });
        }
    });

    addr
}

fn read_request(socket: &mut TcpStream) -> Option<Seen> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
        let n = socket.read(&mut chunk).ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut request_line = head.lines().next()?.split(' ');
    let method = request_line.next()?.to_string();
    let target = request_line.next()?.to_string();
    let length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);

    while buf.len() < head_end + length {
        let n = socket.read(&mut chunk).ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    Some(Seen {
        method,
        target,
        body: buf[head_end..head_end + length].to_vec(),
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// Defaults with the listener on an ephemeral loopback port.
pub fn test_config() -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.tick.restart_delay_ms = 50;
    config
}

/// Connect and write `raw` to `addr`.
pub fn send_raw(addr: SocketAddr, raw: &[u8]) -> TcpStream {
    let mut client = TcpStream::connect(addr).unwrap();
    client.write_all(raw).unwrap();
    client
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    client
}

/// Read until the peer closes.
pub fn read_all(client: &mut TcpStream) -> Vec<u8> {
    let mut out = Vec::new();
    client.read_to_end(&mut out).unwrap();
    out
}

/// Call `step` every few milliseconds until it yields a value.
pub fn eventually<T>(timeout: Duration, mut step: impl FnMut() -> Option<T>) -> T {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(value) = step() {
            return value;
        }
        assert!(Instant::now() < deadline, "condition not met within {:?}", timeout);
        thread::sleep(Duration::from_millis(2));
    }
}
