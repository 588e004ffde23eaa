use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token, Waker, event::Event};
use tracing::{debug, warn};

use crate::error::ServerError;
use crate::frame::{LEN_HEADER_SIZE, encode_len};
use crate::queues::{MatureList, PendingQueue};
use crate::recv::RecvState;
use crate::request::{ConnectionId, Request};
use crate::server::ServerEvents;

const LISTENER: Token = Token(0);
const WAKER: Token = Token(1);
const FIRST_CONN_TOKEN: usize = 2;

/// Matches the original epoll_wait timeout: the reactor still needs to wake
/// periodically to notice the shutdown flag even with no socket activity.
const POLL_TIMEOUT: Duration = Duration::from_millis(300);
const READ_BUF_SIZE: usize = 64 * 1024;

/// A response in the middle of being written: the request it came from (kept
/// alive only so its `Arc` doesn't drop mid-write), the framed bytes
/// (length prefix + body), and how much of them has gone out so far.
struct InFlight {
    _request: Arc<Request>,
    framed: Vec<u8>,
    offset: usize,
}

struct Connection {
    stream: TcpStream,
    recv: RecvState,
    current: Option<InFlight>,
}

enum IngressOutcome {
    Alive,
    ClosedByPeer,
    Errored,
}

/// Single-threaded, edge-triggered I/O core: accepts connections, assembles
/// frames, hands complete requests to the pending queue, and drains
/// matured responses back out in per-connection order.
pub(crate) struct Reactor {
    poll: Poll,
    listener: TcpListener,
    waker: Arc<Waker>,
    conns: HashMap<Token, Connection>,
    next_token: usize,
    max_frame_len: u32,
}

impl Reactor {
    pub fn new(addr: SocketAddr, max_frame_len: u32) -> Result<Self, ServerError> {
        let mut listener =
            TcpListener::bind(addr).map_err(|source| ServerError::Bind { addr: addr.to_string(), source })?;
        let poll = Poll::new().map_err(ServerError::Poll)?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)
            .map_err(ServerError::Poll)?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER).map_err(ServerError::Poll)?);
        Ok(Self { poll, listener, waker, conns: HashMap::new(), next_token: FIRST_CONN_TOKEN, max_frame_len })
    }

    pub fn waker(&self) -> Arc<Waker> {
        Arc::clone(&self.waker)
    }

    /// Drives the reactor until `shutdown` is observed true. Each iteration
    /// polls with a bounded timeout, dispatches whatever events came in, and
    /// — if any of them was the cross-thread waker — sweeps every open
    /// connection's egress once, since the waker alone doesn't say which
    /// connection's response just matured.
    pub fn run(
        &mut self,
        shutdown: &AtomicBool,
        events_hooks: &dyn ServerEvents,
        pending: &PendingQueue,
        mature: &MatureList,
    ) -> Result<(), ServerError> {
        let mut events = Events::with_capacity(1024);
        while !shutdown.load(Ordering::Acquire) {
            match self.poll.poll(&mut events, Some(POLL_TIMEOUT)) {
                Ok(()) => {}
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ServerError::Poll(e)),
            }

            let mut woke = false;
            for event in events.iter() {
                match event.token() {
                    LISTENER => self.accept_all(events_hooks),
                    WAKER => woke = true,
                    token => self.service(token, event, events_hooks, pending, mature),
                }
            }

            if woke {
                let tokens: Vec<Token> = self.conns.keys().copied().collect();
                for token in tokens {
                    if !self.drive_egress(token, mature) {
                        self.teardown(token, events_hooks, pending, mature, true);
                    }
                }
            }
        }
        Ok(())
    }

    fn accept_all(&mut self, hooks: &dyn ServerEvents) {
        loop {
            match self.listener.accept() {
                Ok((mut stream, peer_addr)) => {
                    if let Err(err) = stream.set_nodelay(true) {
                        warn!(?err, "couldn't set TCP_NODELAY");
                    }

                    let token = Token(self.next_token);
                    self.next_token += 1;
                    let conn_id = ConnectionId(token);
                    if !hooks.on_connected(conn_id, peer_addr) {
                        let _ = stream.shutdown(std::net::Shutdown::Both);
                        continue;
                    }

                    if let Err(err) =
                        self.poll.registry().register(&mut stream, token, Interest::READABLE | Interest::WRITABLE)
                    {
                        warn!(?err, "couldn't register accepted connection");
                        continue;
                    }
                    debug!(?token, %peer_addr, "accepted connection");
                    self.conns.insert(
                        token,
                        Connection { stream, recv: RecvState::new(self.max_frame_len), current: None },
                    );
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!(?err, "accept failed");
                    break;
                }
            }
        }
    }

    fn service(
        &mut self,
        token: Token,
        event: &Event,
        hooks: &dyn ServerEvents,
        pending: &PendingQueue,
        mature: &MatureList,
    ) {
        if event.is_error() {
            self.teardown(token, hooks, pending, mature, true);
            return;
        }

        if event.is_readable() {
            match self.drive_ingress(token, pending) {
                IngressOutcome::Alive => {}
                IngressOutcome::ClosedByPeer => {
                    self.teardown(token, hooks, pending, mature, false);
                    return;
                }
                IngressOutcome::Errored => {
                    self.teardown(token, hooks, pending, mature, true);
                    return;
                }
            }
        }

        if event.is_writable() && !self.drive_egress(token, mature) {
            self.teardown(token, hooks, pending, mature, true);
        }
    }

    /// Reads until the kernel would block, feeding every byte through the
    /// connection's frame assembler and enqueueing each completed request.
    fn drive_ingress(&mut self, token: Token, pending: &PendingQueue) -> IngressOutcome {
        let mut buf = [0u8; READ_BUF_SIZE];
        loop {
            let Some(conn) = self.conns.get_mut(&token) else { return IngressOutcome::Alive };
            match conn.stream.read(&mut buf) {
                Ok(0) => return IngressOutcome::ClosedByPeer,
                Ok(n) => {
                    let conn_id = ConnectionId(token);
                    let waker = Arc::clone(&self.waker);
                    let mut completed = Vec::new();
                    let result = conn.recv.feed(&buf[..n], |body| completed.push(body));
                    for body in completed {
                        pending.push(Request::new(conn_id, body, Arc::clone(&waker)));
                    }
                    if let Err(err) = result {
                        debug!(?token, %err, "framing error, dropping connection");
                        return IngressOutcome::Errored;
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return IngressOutcome::Alive,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    debug!(?token, %err, "read error");
                    return IngressOutcome::Errored;
                }
            }
        }
    }

    /// Writes out whatever matured responses are ready for `token`, one
    /// after another, until none are left or the kernel would block.
    /// Returns `false` once the connection should be torn down.
    fn drive_egress(&mut self, token: Token, mature: &MatureList) -> bool {
        loop {
            let Some(conn) = self.conns.get_mut(&token) else { return true };

            if conn.current.is_none() {
                match mature.take_ready(ConnectionId(token)) {
                    Some(request) => {
                        let body = request.take_response();
                        let mut framed = Vec::with_capacity(LEN_HEADER_SIZE + body.len());
                        framed.extend_from_slice(&encode_len(body.len() as u32));
                        framed.extend_from_slice(&body);
                        conn.current = Some(InFlight { _request: request, framed, offset: 0 });
                    }
                    None => return true,
                }
            }

            let in_flight = conn.current.as_mut().unwrap();
            while in_flight.offset < in_flight.framed.len() {
                match conn.stream.write(&in_flight.framed[in_flight.offset..]) {
                    Ok(0) => return false,
                    Ok(n) => in_flight.offset += n,
                    Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return true,
                    Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(err) => {
                        debug!(?token, %err, "write error");
                        return false;
                    }
                }
            }
            conn.current = None;
        }
    }

    /// Tears down a connection: deregisters it, drops its table entry, and
    /// purges any trace of it from the pending/mature lists. `reset` selects
    /// which hook fires: `true` for an abrupt/erroring close (peer reset,
    /// local I/O error, malformed frame), `false` for an orderly EOF.
    fn teardown(
        &mut self,
        token: Token,
        hooks: &dyn ServerEvents,
        pending: &PendingQueue,
        mature: &MatureList,
        reset: bool,
    ) {
        let Some(mut conn) = self.conns.remove(&token) else { return };
        let _ = self.poll.registry().deregister(&mut conn.stream);

        let conn_id = ConnectionId(token);
        pending.discard_handle(conn_id);
        mature.discard_handle(conn_id);

        if reset {
            hooks.on_peer_reset(conn_id);
        } else {
            hooks.on_peer_closed(conn_id);
        }
    }
}
