use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use framed_utils::ThreadPriority;
use signal_hook::consts::{SIGINT, SIGQUIT, SIGTERM};
use tracing::{error, info};

use crate::error::ServerError;
use crate::frame::DEFAULT_MAX_FRAME_LEN;
use crate::queues::{MatureList, PendingQueue};
use crate::reactor::Reactor;
use crate::request::{ConnectionId, RequestHandler};
use crate::worker::WorkerPool;

/// Lifecycle hooks a caller can plug into a [`Server`].
///
/// Every method is defaulted to a no-op (or `true`, for the two that gate
/// startup/accept), the same way the original leaves its event struct's
/// function pointers unset by default.
pub trait ServerEvents: Send + Sync {
    /// Return `false` to abort [`Server::start`] before it binds anything.
    fn on_init(&self) -> bool {
        true
    }
    /// Called once the reactor loop has returned and every worker has
    /// joined.
    fn on_end(&self) {}
    /// Return `false` to immediately close a freshly accepted connection
    /// without ever receiving data from it.
    ///
    /// `conn` is already valid at this point — it's assigned before this
    /// hook fires — so it can be stashed and later matched against the
    /// `conn` delivered to [`ServerEvents::on_peer_reset`]/
    /// [`ServerEvents::on_peer_closed`].
    fn on_connected(&self, conn: ConnectionId, peer_addr: SocketAddr) -> bool {
        let _ = (conn, peer_addr);
        true
    }
    fn on_peer_reset(&self, conn: ConnectionId) {
        let _ = conn;
    }
    fn on_peer_closed(&self, conn: ConnectionId) {
        let _ = conn;
    }
}

/// Hooks used when a [`Server`] is started without supplying any.
pub struct NoEvents;
impl ServerEvents for NoEvents {}

fn shutdown_flag() -> &'static Arc<AtomicBool> {
    static SHUTDOWN: OnceLock<Arc<AtomicBool>> = OnceLock::new();
    SHUTDOWN.get_or_init(|| Arc::new(AtomicBool::new(false)))
}

fn default_work_thread_count() -> usize {
    std::thread::available_parallelism().map(|n| n.get() * 2).unwrap_or(4)
}

/// Embeddable length-prefixed TCP server: a single-threaded reactor handing
/// complete frames to a pool of worker threads, which answer through the
/// supplied [`RequestHandler`] while per-connection response order is
/// preserved regardless of the order workers finish in.
///
/// Not generic over the handler type: it's stored as `Arc<dyn RequestHandler>`
/// so that [`Server::request_shutdown`], a process-wide operation with no
/// per-instance state, doesn't need a handler type to name at every call
/// site.
pub struct Server {
    handler: Arc<dyn RequestHandler>,
    listen_address: IpAddr,
    work_thread_count: usize,
    max_frame_len: u32,
    worker_priority: ThreadPriority,
    pin_worker_cores: bool,
}

impl Server {
    pub fn new<H: RequestHandler + 'static>(handler: H) -> Self {
        Self {
            handler: Arc::new(handler),
            listen_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            work_thread_count: default_work_thread_count(),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            worker_priority: ThreadPriority::OSDefault,
            pin_worker_cores: false,
        }
    }

    pub fn set_listen_address(&mut self, addr: IpAddr) -> &mut Self {
        self.listen_address = addr;
        self
    }

    pub fn set_work_thread_count(&mut self, count: usize) -> &mut Self {
        self.work_thread_count = count;
        self
    }

    /// Sets the ceiling on a declared frame body length; frames declaring
    /// more are rejected before any allocation. Defaults to
    /// [`DEFAULT_MAX_FRAME_LEN`](crate::frame::DEFAULT_MAX_FRAME_LEN).
    pub fn set_max_frame_len(&mut self, max: u32) -> &mut Self {
        self.max_frame_len = max;
        self
    }

    pub fn set_worker_thread_priority(&mut self, priority: ThreadPriority) -> &mut Self {
        self.worker_priority = priority;
        self
    }

    /// Pins each worker thread to a distinct CPU core, round-robin over
    /// whatever `core_affinity` reports available. Off by default.
    pub fn set_pin_worker_cores(&mut self, pin: bool) -> &mut Self {
        self.pin_worker_cores = pin;
        self
    }

    /// Sets the process-wide shutdown flag, same as a caller-delivered
    /// SIGINT/SIGTERM/SIGQUIT. A running [`Server::start`] notices on its
    /// next reactor wakeup (at most one poll timeout later) and begins
    /// draining.
    pub fn request_shutdown() {
        shutdown_flag().store(true, Ordering::Release);
    }

    /// Binds `port` on the configured listen address and runs the reactor
    /// and worker pool until shutdown is requested. Returns a process exit
    /// code: 0 on a clean run, nonzero if startup or the reactor failed.
    pub fn start(&self, port: u16, events: impl ServerEvents + 'static) -> i32 {
        match self.run(port, events) {
            Ok(()) => 0,
            Err(err) => {
                error!(%err, "server exited with an error");
                err.exit_code()
            }
        }
    }

    fn run(&self, port: u16, events: impl ServerEvents + 'static) -> Result<(), ServerError> {
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_IGN);
        }
        let shutdown = shutdown_flag();
        shutdown.store(false, Ordering::Release);
        for sig in [SIGINT, SIGTERM, SIGQUIT] {
            signal_hook::flag::register(sig, Arc::clone(shutdown)).map_err(ServerError::Signal)?;
        }

        let events: Arc<dyn ServerEvents> = Arc::new(events);
        if !events.on_init() {
            return Err(ServerError::InitRejected);
        }

        let addr = SocketAddr::new(self.listen_address, port);
        let mut reactor = Reactor::new(addr, self.max_frame_len)?;

        let pending = Arc::new(PendingQueue::default());
        let mature = Arc::new(MatureList::default());

        info!(%addr, threads = self.work_thread_count, "starting server");
        let pool = WorkerPool::spawn(
            self.work_thread_count,
            Arc::clone(&self.handler),
            Arc::clone(&pending),
            Arc::clone(&mature),
            shutdown,
            self.worker_priority,
            self.pin_worker_cores,
        );

        let result = reactor.run(shutdown, events.as_ref(), &pending, &mature);

        pending.notify_all();
        pool.join();
        for request in pending.drain().into_iter().chain(mature.drain()) {
            request.mark_dropped();
        }

        events.on_end();
        info!("server stopped");
        result
    }
}
