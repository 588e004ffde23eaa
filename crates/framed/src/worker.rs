use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::thread::{self, JoinHandle};

use framed_utils::{ThreadPriority, thread_boot};
use tracing::warn;

use crate::queues::{MatureList, PendingQueue};
use crate::request::RequestHandler;

/// Runs `count` worker threads, each pulling requests off `pending`,
/// publishing them to `mature` before handing them to `handler`, and
/// relying on the handler to mature the response itself.
///
/// Threads exit once [`PendingQueue::pop_into`] returns `None`, i.e. once
/// `shutdown` is set and the queue has been drained.
pub(crate) struct WorkerPool {
    threads: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn(
        count: usize,
        handler: Arc<dyn RequestHandler>,
        pending: Arc<PendingQueue>,
        mature: Arc<MatureList>,
        shutdown: &'static AtomicBool,
        priority: ThreadPriority,
        pin_cores: bool,
    ) -> Self {
        let core_ids = pin_cores.then(core_affinity::get_core_ids).flatten();

        let mut threads = Vec::with_capacity(count);
        for i in 0..count {
            let handler = Arc::clone(&handler);
            let pending = Arc::clone(&pending);
            let mature = Arc::clone(&mature);
            let core = core_ids.as_ref().map(|ids| ids[i % ids.len()].id);

            let spawned = thread::Builder::new()
                .name(format!("framed-worker-{i}"))
                .spawn(move || {
                    thread_boot(core, priority);
                    worker_loop(handler.as_ref(), &pending, &mature, shutdown);
                })
                .expect("failed to spawn worker thread");
            threads.push(spawned);
        }
        Self { threads }
    }

    pub fn join(self) {
        for handle in self.threads {
            if handle.join().is_err() {
                warn!("worker thread panicked");
            }
        }
    }
}

fn worker_loop(
    handler: &dyn RequestHandler,
    pending: &PendingQueue,
    mature: &MatureList,
    shutdown: &AtomicBool,
) {
    while let Some(request) = pending.pop_into(shutdown, mature) {
        if !handler.on_request(&request) {
            request.mark_dropped();
        }
    }
}
