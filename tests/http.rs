use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use ffwd_client::MetricRelay;
use serde_json::Value;

/// Accepts `requests` connections, captures each request body, and answers
/// with `status_line`.
fn spawn_agent(status_line: &'static str, requests: usize) -> (u16, mpsc::Receiver<Value>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind listener");
    let port = listener.local_addr().expect("local addr").port();
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        for _ in 0..requests {
            let Ok((mut stream, _)) = listener.accept() else { return };
            let body = read_request_body(&mut stream);
            let response = format!("{status_line}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
            let _ = stream.write_all(response.as_bytes());
            let _ = tx.send(body);
        }
    });

    (port, rx)
}

fn read_request_body(stream: &mut TcpStream) -> Value {
    stream.set_read_timeout(Some(Duration::from_secs(5))).expect("set read timeout");

    let mut raw = Vec::new();
    let mut buf = [0u8; 4096];
    let header_end = loop {
        let read = stream.read(&mut buf).expect("read request");
        assert!(read > 0, "connection closed before headers completed");
        raw.extend_from_slice(&buf[..read]);
        if let Some(pos) = raw.windows(4).position(|window| window == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let headers = String::from_utf8_lossy(&raw[..header_end]).to_ascii_lowercase();
    let content_length: usize = headers
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .expect("content-length header")
        .trim()
        .parse()
        .expect("parse content-length");

    while raw.len() < header_end + content_length {
        let read = stream.read(&mut buf).expect("read body");
        assert!(read > 0, "connection closed before body completed");
        raw.extend_from_slice(&buf[..read]);
    }

    serde_json::from_slice(&raw[header_end..header_end + content_length]).expect("parse body")
}

#[test]
fn flush_posts_all_points_in_one_request() {
    let (port, bodies) = spawn_agent("HTTP/1.1 200 OK", 1);
    let mut relay = MetricRelay::builder("http-test")
        .with_agent_port(port)
        .with_http_path("/v1/metrics")
        .build()
        .expect("build relay");

    relay.incr("requests");
    relay.incr_by("bytes-in", 64.0);
    relay.timer("latency");

    relay.flush();

    let body = bodies.recv_timeout(Duration::from_secs(5)).expect("request body");
    let points = body["points"].as_array().expect("points array");
    assert_eq!(points.len(), 3);

    for point in points {
        assert_eq!(point["key"], "http-test");
        assert!(point["tags"]["what"].is_string());
        assert!(point["timestamp"].as_u64().expect("timestamp") > 0);
        assert!(point["resource"].is_object());
    }
}

#[test]
fn emit_posts_a_single_point() {
    let (port, bodies) = spawn_agent("HTTP/1.1 200 OK", 1);
    let relay = MetricRelay::builder("http-test")
        .with_agent_port(port)
        .with_http_transport()
        .build()
        .expect("build relay");

    relay.emit("deploy-finished", 1.0);

    let body = bodies.recv_timeout(Duration::from_secs(5)).expect("request body");
    let points = body["points"].as_array().expect("points array");
    assert_eq!(points.len(), 1);
    assert_eq!(points[0]["tags"]["what"], "deploy-finished");
    assert_eq!(points[0]["value"], 1.0);
    assert!(!relay.contains("deploy-finished"));
}

#[test]
fn server_errors_do_not_escape_flush() {
    let (port, bodies) = spawn_agent("HTTP/1.1 500 Internal Server Error", 1);
    let mut relay = MetricRelay::builder("http-test")
        .with_agent_port(port)
        .with_http_transport()
        .build()
        .expect("build relay");

    relay.incr("requests");
    relay.flush();

    // The request was made and answered with a 500; the failure stays inside
    // the transport.
    let body = bodies.recv_timeout(Duration::from_secs(5)).expect("request body");
    assert_eq!(body["points"].as_array().expect("points array").len(), 1);
}

#[test]
fn connection_failures_do_not_escape_flush() {
    // Bind a port, then free it so connections are refused.
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind probe listener");
        listener.local_addr().expect("local addr").port()
    };

    let mut relay = MetricRelay::builder("http-test")
        .with_agent_port(port)
        .with_http_transport()
        .with_http_timeout(Duration::from_millis(500))
        .build()
        .expect("build relay");

    relay.incr("requests");
    relay.flush();
    relay.emit("still-alive", 1.0);
}
