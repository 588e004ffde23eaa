//! Shared helpers for the integration tests in this directory. Each test
//! file in `tests/` is its own process, so nothing here needs to worry about
//! interference between tests started in parallel within the same binary.
#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{IpAddr, Ipv4Addr, TcpStream};
use std::thread;
use std::time::Duration;

use framed::{Request, RequestHandler, Server, ServerEvents};

/// Answers every request with its own bytes, the same as the `echo_server`
/// example.
pub struct EchoHandler;

impl RequestHandler for EchoHandler {
    fn on_request(&self, request: &Request) -> bool {
        let body = request.bytes().to_vec();
        request.clone_response(&body);
        request.end_response();
        true
    }
}

/// Starts `server` on a background thread and waits until it accepts
/// connections on `port`, retrying a plain TCP connect for a short window
/// rather than sleeping a fixed guess at bind time.
pub fn spawn_server<H, E>(handler: H, port: u16, events: E) -> thread::JoinHandle<i32>
where
    H: RequestHandler + 'static,
    E: ServerEvents + 'static,
{
    let join = thread::spawn(move || {
        let mut server = Server::new(handler);
        server.set_listen_address(IpAddr::V4(Ipv4Addr::LOCALHOST));
        server.start(port, events)
    });
    wait_for_accept(port);
    join
}

fn wait_for_accept(port: u16) {
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    loop {
        if TcpStream::connect((Ipv4Addr::LOCALHOST, port)).is_ok() {
            return;
        }
        if std::time::Instant::now() > deadline {
            panic!("server on port {port} never started accepting connections");
        }
        thread::sleep(Duration::from_millis(10));
    }
}

pub fn write_frame(stream: &mut TcpStream, body: &[u8]) -> std::io::Result<()> {
    let len = u32::try_from(body.len()).expect("frame body too large to encode a length prefix");
    stream.write_all(&len.to_be_bytes())?;
    stream.write_all(body)
}

pub fn read_frame(stream: &mut TcpStream) -> std::io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body)?;
    Ok(body)
}

pub fn connect(port: u16) -> TcpStream {
    let stream = TcpStream::connect((Ipv4Addr::LOCALHOST, port)).expect("failed to connect to test server");
    stream.set_nodelay(true).expect("failed to set TCP_NODELAY");
    stream
}
