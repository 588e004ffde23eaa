use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use crate::request::{ConnectionId, Request};

/// Requests that have been fully received but not yet picked up by a worker.
///
/// FIFO across all connections: workers don't care which connection a
/// request came from, only that they get the next one available.
#[derive(Default)]
pub struct PendingQueue {
    queue: Mutex<VecDeque<Arc<Request>>>,
    cond: Condvar,
}

impl PendingQueue {
    pub fn push(&self, request: Arc<Request>) {
        self.queue.lock().unwrap().push_back(request);
        self.cond.notify_one();
    }

    /// Blocks until a request is available or `shutdown` becomes true, then
    /// moves it straight into `mature` before releasing the pending queue's
    /// lock. Returns `None` only on shutdown with an empty queue.
    ///
    /// The pop and the mature-list append must be one atomic step: if a
    /// worker popped here and only then raced to lock `mature`, two workers
    /// could pop in order but append out of order (pop req1, pop req2,
    /// append req2, append req1), which would let the egress scan — which
    /// gates on the first mature-list entry for a connection — write req2's
    /// response before req1's on the same connection. Holding the pending
    /// lock across the append (mirroring `original_source/neusc_server.cc`'s
    /// `thread_process`, which keeps `pending_list`'s mutex locked across its
    /// own `mature_list.push_back`) makes pop-order and append-order the
    /// same order, which is what §8's per-connection ordering invariant
    /// requires.
    pub fn pop_into(&self, shutdown: &AtomicBool, mature: &MatureList) -> Option<Arc<Request>> {
        let mut queue = self.queue.lock().unwrap();
        loop {
            if let Some(request) = queue.pop_front() {
                mature.push(Arc::clone(&request));
                return Some(request);
            }
            if shutdown.load(Ordering::Acquire) {
                return None;
            }
            queue = self.cond.wait(queue).unwrap();
        }
    }

    /// Wakes every worker blocked in [`PendingQueue::pop`] so they can
    /// observe the shutdown flag.
    pub fn notify_all(&self) {
        self.cond.notify_all();
    }

    /// Drains whatever is left, for use during final teardown.
    pub fn drain(&self) -> Vec<Arc<Request>> {
        self.queue.lock().unwrap().drain(..).collect()
    }

    /// Drops every request belonging to `handle` that hasn't been picked up
    /// by a worker yet — there's no response ordering to preserve for
    /// requests no worker has touched, so they're removed outright rather
    /// than marked discard.
    pub fn discard_handle(&self, handle: ConnectionId) {
        self.queue.lock().unwrap().retain(|r| r.handle() != handle);
    }
}

/// Requests that a worker has started on: either still being worked on, or
/// matured and waiting for the reactor to notice and start sending.
///
/// The egress scan (`take_ready`) is "the critical design choice" this
/// framework makes: it walks the whole list looking for the first matured,
/// non-discarded entry belonging to a given connection, preserving
/// per-connection response ordering even though workers finish requests out
/// of order relative to when they were enqueued.
#[derive(Default)]
pub struct MatureList {
    list: Mutex<VecDeque<Arc<Request>>>,
}

impl MatureList {
    pub fn push(&self, request: Arc<Request>) {
        self.list.lock().unwrap().push_back(request);
    }

    /// Scans for a response ready to send on `handle`.
    ///
    /// While scanning, drops any matured-and-discarded entries it passes
    /// over regardless of which connection they belong to (mirroring the
    /// handle-agnostic cleanup the original does on every egress attempt).
    /// The first entry belonging to `handle` it meets gates the scan: if
    /// that entry hasn't matured yet, the scan stops and returns `None` even
    /// if a later entry for the same connection already has, since that
    /// later entry's request arrived after this one and must wait its turn.
    /// Only once the oldest entry for `handle` is matured does the scan
    /// return (and remove) it.
    pub fn take_ready(&self, handle: ConnectionId) -> Option<Arc<Request>> {
        let mut list = self.list.lock().unwrap();
        let mut i = 0;
        while i < list.len() {
            if list[i].is_matured() && list[i].is_discard() {
                list.remove(i);
                continue;
            }
            if list[i].handle() != handle {
                i += 1;
                continue;
            }
            if !list[i].is_matured() {
                return None;
            }
            return list.remove(i);
        }
        None
    }

    /// Marks every entry belonging to `handle` as discardable; matured
    /// entries are dropped from the list immediately, unmatured ones are
    /// left for a worker (or a later scan) to clean up.
    pub fn discard_handle(&self, handle: ConnectionId) {
        let mut list = self.list.lock().unwrap();
        let mut i = 0;
        while i < list.len() {
            if list[i].handle() != handle {
                i += 1;
                continue;
            }
            if list[i].is_matured() {
                list.remove(i);
            } else {
                list[i].mark_dropped();
                i += 1;
            }
        }
    }

    pub fn drain(&self) -> Vec<Arc<Request>> {
        self.list.lock().unwrap().drain(..).collect()
    }
}
