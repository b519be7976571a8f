//! Connection multiplexer behaviour over real loopback sockets.

use std::io::{Read, Write};
use std::thread;
use std::time::Duration;

use tickloop::config::{ConnectionConfig, ListenerConfig};
use tickloop::http::Method;
use tickloop::net::{ConnectionState, Inbound, Multiplexer};

mod common;

fn multiplexer() -> Multiplexer {
    let listener = ListenerConfig {
        bind_address: "127.0.0.1:0".into(),
    };
    Multiplexer::bind(&listener, &ConnectionConfig::default()).unwrap()
}

fn capped_multiplexer(max_request_bytes: usize) -> Multiplexer {
    let listener = ListenerConfig {
        bind_address: "127.0.0.1:0".into(),
    };
    let connections = ConnectionConfig {
        max_request_bytes,
        ..ConnectionConfig::default()
    };
    Multiplexer::bind(&listener, &connections).unwrap()
}

/// A GET request padded to exactly `len` bytes.
fn get_of_len(len: usize) -> Vec<u8> {
    let frame = "GET / HTTP/1.1\r\n\r\n".len();
    let path = "p".repeat(len - frame);
    format!("GET /{} HTTP/1.1\r\n\r\n", path).into_bytes()
}

fn next_request(mux: &mut Multiplexer) -> Inbound {
    common::eventually(Duration::from_secs(5), || mux.poll().pop())
}

#[test]
fn test_echo_round_trip() {
    let mut mux = multiplexer();
    let mut client = common::send_raw(mux.local_addr(), b"GET /hello?who=a%2Bb HTTP/1.1\r\nHost: x\r\n\r\n");

    let inbound = next_request(&mut mux);
    assert_eq!(inbound.request.method, Method::Get);
    assert_eq!(inbound.request.query_value("who"), Some("a+b"));

    mux.send(inbound.connection, b"hello", "X-Test: 1").unwrap();
    mux.poll();
    assert_eq!(
        common::read_all(&mut client),
        b"HTTP/1.1 200 OK\r\nX-Test: 1\r\nContent-Length:5\r\n\r\nhello"
    );
}

#[test]
fn test_post_body_is_delivered() {
    let mut mux = multiplexer();
    let _client = common::send_raw(
        mux.local_addr(),
        b"POST /submit HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello",
    );

    let inbound = next_request(&mut mux);
    assert_eq!(inbound.request.method, Method::Post);
    assert_eq!(inbound.request.path, "submit");
    assert_eq!(inbound.request.body.as_deref(), Some(&b"hello"[..]));
}

#[test]
fn test_split_request_is_dispatched_once() {
    let mut mux = multiplexer();
    let mut client = common::send_raw(mux.local_addr(), b"GET /split HTTP/1.1\r\nHo");

    for _ in 0..2 {
        assert!(mux.poll().is_empty());
        thread::sleep(Duration::from_millis(2));
    }

    client.write_all(b"st: x\r\n\r\n").unwrap();
    let inbound = next_request(&mut mux);
    assert_eq!(inbound.request.path, "split");

    for _ in 0..5 {
        assert!(mux.poll().is_empty());
    }
    assert_eq!(mux.state(inbound.connection), Some(ConnectionState::Dispatched));
}

#[test]
fn test_incomplete_request_is_closed_without_dispatch() {
    let mut mux = multiplexer();
    let mut client = common::send_raw(mux.local_addr(), b"GET /never HTTP/1.1\r\nHost: x\r\n");

    // Accept plus the bounded number of idle passes.
    for _ in 0..20 {
        assert!(mux.poll().is_empty());
        thread::sleep(Duration::from_millis(2));
    }

    assert!(mux.is_empty());
    assert!(common::read_all(&mut client).is_empty());
}

#[test]
fn test_malformed_query_is_closed() {
    let mut mux = multiplexer();
    let mut client = common::send_raw(mux.local_addr(), b"GET /q?novalue HTTP/1.1\r\n\r\n");

    for _ in 0..10 {
        assert!(mux.poll().is_empty());
        thread::sleep(Duration::from_millis(2));
    }
    assert!(mux.is_empty());
    assert!(common::read_all(&mut client).is_empty());
}

#[test]
fn test_empty_file_sends_zero_length() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.txt");
    std::fs::write(&path, b"").unwrap();

    let mut mux = multiplexer();
    let mut client = common::send_raw(mux.local_addr(), b"GET /empty.txt HTTP/1.1\r\n\r\n");

    let inbound = next_request(&mut mux);
    mux.send_file(inbound.connection, &path, "").unwrap();
    assert_eq!(mux.state(inbound.connection), Some(ConnectionState::Closed));

    mux.poll();
    assert_eq!(
        common::read_all(&mut client),
        b"HTTP/1.1 200 OK\r\nContent-Length:0\r\n\r\n"
    );
}

#[test]
fn test_large_file_is_streamed_across_ticks() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("big.bin");
    let content: Vec<u8> = (0..3 * 1024 * 1024).map(|i| (i % 251) as u8).collect();
    std::fs::write(&path, &content).unwrap();

    let mut mux = multiplexer();
    let client = common::send_raw(mux.local_addr(), b"GET /big.bin HTTP/1.1\r\n\r\n");
    let inbound = next_request(&mut mux);

    mux.send_file(inbound.connection, &path, "Content-Type: application/octet-stream\r\n")
        .unwrap();

    let reader = thread::spawn(move || {
        let mut client = client;
        thread::sleep(Duration::from_millis(20));
        common::read_all(&mut client)
    });

    common::eventually(Duration::from_secs(10), || {
        mux.poll();
        mux.state(inbound.connection).is_none().then_some(())
    });

    let received = reader.join().unwrap();
    let head = b"HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length:3145728\r\n\r\n";
    assert_eq!(&received[..head.len()], &head[..]);
    assert_eq!(&received[head.len()..], &content[..]);
}

#[test]
fn test_large_body_is_re_driven_while_client_is_slow() {
    let mut mux = multiplexer();
    let client = common::send_raw(mux.local_addr(), b"GET /blob HTTP/1.1\r\n\r\n");
    let inbound = next_request(&mut mux);

    let body = vec![b'z'; 32 * 1024 * 1024];
    mux.send(inbound.connection, &body, "").unwrap();
    assert_eq!(mux.state(inbound.connection), Some(ConnectionState::Sending));

    let reader = thread::spawn(move || {
        let mut client = client;
        let mut total = 0;
        let mut buf = [0u8; 65536];
        loop {
            match client.read(&mut buf) {
                Ok(0) => break total,
                Ok(n) => total += n,
                Err(e) => panic!("read failed: {e}"),
            }
        }
    });

    common::eventually(Duration::from_secs(10), || {
        mux.poll();
        mux.state(inbound.connection).is_none().then_some(())
    });

    let head_len = "HTTP/1.1 200 OK\r\nContent-Length:33554432\r\n\r\n".len();
    assert_eq!(reader.join().unwrap(), head_len + body.len());
}

#[test]
fn test_close_without_response() {
    let mut mux = multiplexer();
    let mut client = common::send_raw(mux.local_addr(), b"GET /reject HTTP/1.1\r\n\r\n");
    let inbound = next_request(&mut mux);

    mux.close(inbound.connection).unwrap();
    mux.poll();
    assert!(mux.is_empty());
    assert!(common::read_all(&mut client).is_empty());
}

#[test]
fn test_request_of_exactly_the_cap_is_dispatched() {
    let mut mux = capped_multiplexer(64);
    let raw = get_of_len(64);
    assert_eq!(raw.len(), 64);
    let _client = common::send_raw(mux.local_addr(), &raw);

    let inbound = next_request(&mut mux);
    assert_eq!(inbound.request.path.len(), 46);
    assert_eq!(mux.state(inbound.connection), Some(ConnectionState::Dispatched));
}

#[test]
fn test_request_over_the_cap_is_closed() {
    let mut mux = capped_multiplexer(64);
    let _client = common::send_raw(mux.local_addr(), &get_of_len(65));

    for _ in 0..10 {
        assert!(mux.poll().is_empty());
        thread::sleep(Duration::from_millis(2));
    }
    assert!(mux.is_empty());
}

#[test]
fn test_huge_content_length_closes_only_that_connection() {
    let mut mux = multiplexer();
    let mut hostile = common::send_raw(
        mux.local_addr(),
        b"POST /p HTTP/1.1\r\nContent-Length: 18446744073709551615\r\n\r\nabc",
    );
    let _polite = common::send_raw(mux.local_addr(), b"GET /fine HTTP/1.1\r\n\r\n");

    let inbound = next_request(&mut mux);
    assert_eq!(inbound.request.path, "fine");

    for _ in 0..5 {
        mux.poll();
    }
    assert_eq!(mux.len(), 1);
    assert!(common::read_all(&mut hostile).is_empty());
}
