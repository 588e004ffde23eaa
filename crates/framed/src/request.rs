use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use mio::{Token, Waker};

/// Opaque identifier for an accepted connection, stable for its lifetime.
///
/// Deliberately not a raw fd or socket handle: presence of a connection is
/// always tracked by whether its entry still exists in the reactor's
/// connection table, never by testing this value against a sentinel.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ConnectionId(pub(crate) Token);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn#{}", self.0.0)
    }
}

struct RequestInner {
    /// `None` once [`Request::release_request_data`] has been called.
    input: Option<Vec<u8>>,
    response: Vec<u8>,
    discard: bool,
}

/// A single complete, immutable-input frame handed from the reactor to the
/// worker pool.
///
/// Shared by `Arc` between whichever queue currently holds it and, once a
/// handler starts working on it, the worker thread itself. `matured` is the
/// one field read from the reactor thread without holding `inner`'s lock;
/// every other field is behind it.
pub struct Request {
    handle: ConnectionId,
    size: usize,
    matured: AtomicBool,
    inner: Mutex<RequestInner>,
    waker: Arc<Waker>,
}

/// Borrowed view of a request's input bytes.
pub struct RequestBytes<'a>(MutexGuard<'a, RequestInner>);

impl Deref for RequestBytes<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.0.input.as_deref().unwrap_or(&[])
    }
}

impl Request {
    pub(crate) fn new(handle: ConnectionId, body: Vec<u8>, waker: Arc<Waker>) -> Arc<Self> {
        let size = body.len();
        Arc::new(Self {
            handle,
            size,
            matured: AtomicBool::new(false),
            inner: Mutex::new(RequestInner { input: Some(body), response: Vec::new(), discard: false }),
            waker,
        })
    }

    /// Size in bytes of the original request body. Stays valid even after
    /// [`Request::release_request_data`] drops the bytes themselves.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Borrows the request's input bytes. Empty once the data has been
    /// released via [`Request::release_request_data`].
    pub fn bytes(&self) -> RequestBytes<'_> {
        RequestBytes(self.inner.lock().unwrap())
    }

    /// Copies `buf` into this request's response buffer, replacing any
    /// previous contents.
    pub fn clone_response(&self, buf: &[u8]) {
        let mut inner = self.inner.lock().unwrap();
        inner.response.clear();
        inner.response.extend_from_slice(buf);
    }

    /// Drops the input buffer early, once the handler no longer needs it.
    /// Only meaningful before the handler returns; harmless to call more
    /// than once.
    pub fn release_request_data(&self) {
        self.inner.lock().unwrap().input = None;
    }

    /// Marks the response ready to send and wakes the reactor so it can
    /// start (or resume) writing it out on this request's connection.
    ///
    /// Must be called exactly once per request that the handler intends to
    /// answer; a handler that instead returns `false` from `on_request`
    /// should not call this (the pool marks the request dropped instead).
    pub fn end_response(&self) {
        self.matured.store(true, Ordering::Release);
        let discard = self.inner.lock().unwrap().discard;
        if !discard {
            let _ = self.waker.wake();
        }
    }

    pub(crate) fn handle(&self) -> ConnectionId {
        self.handle
    }

    pub(crate) fn is_matured(&self) -> bool {
        self.matured.load(Ordering::Acquire)
    }

    pub(crate) fn is_discard(&self) -> bool {
        self.inner.lock().unwrap().discard
    }

    /// Marks a request as droppable without ever answering the peer: used
    /// both when a handler declines to respond and when the owning
    /// connection goes away before the response matured.
    pub(crate) fn mark_dropped(&self) {
        self.inner.lock().unwrap().discard = true;
        self.matured.store(true, Ordering::Release);
    }

    /// Takes the assembled response bytes. Only safe to call once the
    /// request has matured and is no longer reachable from the pending or
    /// mature lists (i.e. after the egress scan has claimed it).
    pub(crate) fn take_response(&self) -> Vec<u8> {
        core::mem::take(&mut self.inner.lock().unwrap().response)
    }
}

/// Business logic plugged into a [`crate::Server`].
///
/// Implementors run on worker threads; `on_request` may block (e.g. on
/// downstream I/O) without stalling the reactor.
pub trait RequestHandler: Send + Sync {
    /// Return `false` to drop the request without ever writing a response
    /// to the peer. Return `true` after calling
    /// [`Request::clone_response`]/[`Request::end_response`] to send one.
    fn on_request(&self, request: &Request) -> bool;
}

/// Handler used when a [`crate::Server`] is built without one: answers
/// every request with a single zero byte.
#[derive(Default)]
pub struct DefaultHandler;

impl RequestHandler for DefaultHandler {
    fn on_request(&self, request: &Request) -> bool {
        request.clone_response(&[0u8]);
        request.end_response();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mio::{Poll, Token};

    fn fixture() -> Arc<Request> {
        let poll = Poll::new().unwrap();
        let waker = Arc::new(Waker::new(poll.registry(), Token(0)).unwrap());
        Request::new(ConnectionId(Token(1)), b"hello".to_vec(), waker)
    }

    #[test]
    fn size_survives_release() {
        let req = fixture();
        assert_eq!(req.size(), 5);
        req.release_request_data();
        assert_eq!(req.size(), 5);
        assert!(req.bytes().is_empty());
    }

    #[test]
    fn end_response_publishes_matured() {
        let req = fixture();
        assert!(!req.is_matured());
        req.clone_response(b"ok");
        req.end_response();
        assert!(req.is_matured());
        assert_eq!(req.take_response(), b"ok".to_vec());
    }

    #[test]
    fn mark_dropped_sets_discard_and_matured() {
        let req = fixture();
        req.mark_dropped();
        assert!(req.is_matured());
        assert!(req.is_discard());
    }
}
