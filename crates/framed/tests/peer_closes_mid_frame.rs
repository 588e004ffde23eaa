//! Spec round-trip test 5: a peer that closes mid-frame after sending only
//! the length prefix and a partial body gets torn down via `on_peer_closed`,
//! no response is ever written, and the server keeps running afterward.

mod common;

use std::io::Write;
use std::sync::{Arc, Mutex};

use framed::{ConnectionId, NoEvents, ServerEvents};

#[derive(Default)]
struct Observed {
    closed: Vec<ConnectionId>,
    reset: Vec<ConnectionId>,
}

struct Observer(Arc<Mutex<Observed>>);

impl ServerEvents for Observer {
    fn on_peer_closed(&self, conn: ConnectionId) {
        self.0.lock().unwrap().closed.push(conn);
    }
    fn on_peer_reset(&self, conn: ConnectionId) {
        self.0.lock().unwrap().reset.push(conn);
    }
}

#[test]
fn partial_frame_on_orderly_close_leaves_no_response() {
    let observed = Arc::new(Mutex::new(Observed::default()));
    common::spawn_server(common::EchoHandler, 18104, Observer(Arc::clone(&observed)));

    {
        let mut stream = common::connect(18104);
        // Declare a 100-byte body, but only ever send 50 bytes of it.
        stream.write_all(&100u32.to_be_bytes()).unwrap();
        stream.write_all(&[0x11u8; 50]).unwrap();
        // Dropping `stream` here closes the socket: an orderly EOF from the
        // server's perspective, not a reset.
    }

    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    loop {
        if !observed.lock().unwrap().closed.is_empty() {
            break;
        }
        assert!(std::time::Instant::now() < deadline, "on_peer_closed never fired for the half-sent frame");
        std::thread::sleep(std::time::Duration::from_millis(10));
    }
    assert!(observed.lock().unwrap().reset.is_empty(), "a clean close shouldn't be reported as a reset");

    // The server is still alive and answers a fresh, complete request
    // normally.
    let mut stream = common::connect(18104);
    common::write_frame(&mut stream, b"still alive").unwrap();
    assert_eq!(common::read_frame(&mut stream).unwrap(), b"still alive");
}
